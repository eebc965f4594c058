//! Loading reader configuration from files on disk.

use std::io::Write;

use usbquad_core::{Axis, LogFormat, ReaderConfig};

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[acquisition]
sample_rate_hz = 2000.0
samples_per_channel = 20000

[reconciliation]
disagreement_limit = 1000

[logging]
level = "debug"
format = "compact"
"#
    )
    .unwrap();

    let config = ReaderConfig::load_from(file.path()).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.acquisition.sample_rate_hz, 2000.0);
    assert_eq!(config.acquisition.sample_interval_us(), 500.0);
    assert_eq!(config.reconciliation.disagreement_limit, 1000);
    assert_eq!(config.logging.format, LogFormat::Compact);
    assert_eq!(config.axes.get(Axis::Y).wrap_guard, 200.0);
}

#[test]
fn test_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = ReaderConfig::load_from(dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.acquisition.samples_per_channel, 10_000);
    assert_eq!(config.layout.x, 3);
}

#[test]
fn test_invalid_calibration_in_file_fails_validation() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[axes.x]
scale = 0.0
wrap_threshold = 254.8
wrap_guard = 200.0
"#
    )
    .unwrap();

    let config = ReaderConfig::load_from(file.path()).unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("axis x"));
}

#[test]
fn test_shipped_config_matches_defaults() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/usbquad.toml");
    let config = ReaderConfig::from_toml_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert!(config.validate().is_ok());

    let defaults = ReaderConfig::default();
    assert_eq!(config.layout, defaults.layout);
    assert_eq!(config.acquisition, defaults.acquisition);
    assert_eq!(config.reconciliation, defaults.reconciliation);
    for axis in Axis::ALL {
        let (shipped, default) = (config.axes.get(axis), defaults.axes.get(axis));
        assert!((shipped.scale - default.scale).abs() < 1e-15);
        assert_eq!(shipped.wrap_threshold, default.wrap_threshold);
        assert_eq!(shipped.wrap_guard, default.wrap_guard);
        assert_eq!(shipped.seed, default.seed);
    }
}
