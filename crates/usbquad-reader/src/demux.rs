//! Channel demultiplexing.
//!
//! The counter bank writes one value per channel per scan, so a window is a
//! flat run `[scan0_ch0, scan0_ch1, ..., scan1_ch0, ...]`. Channel `c`'s
//! `k`-th value is `flat[k * stride + c]`. This stage is pure index
//! arithmetic in the raw integer domain.

use usbquad_core::{ChannelLayout, RawCount, ReaderError, Result};

/// Per-axis raw sequences of one window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemuxedWindow {
    /// First Z channel.
    pub z1: Vec<RawCount>,
    /// Y channel.
    pub y: Vec<RawCount>,
    /// Second Z channel.
    pub z2: Vec<RawCount>,
    /// X channel.
    pub x: Vec<RawCount>,
    /// Extruder channel; empty when the layout has none.
    pub extruder: Vec<RawCount>,
}

impl DemuxedWindow {
    /// Number of complete scans in the window.
    pub fn n_scans(&self) -> usize {
        self.x.len()
    }
}

/// Ensure `len` is a whole number of scans.
pub fn check_alignment(len: usize, stride: usize) -> Result<usize> {
    if stride == 0 || len % stride != 0 {
        return Err(ReaderError::MisalignedWindow { len, stride });
    }
    Ok(len / stride)
}

/// Values of one channel, in scan order.
pub fn channel(flat: &[RawCount], stride: usize, offset: usize) -> Vec<RawCount> {
    flat.iter().skip(offset).step_by(stride.max(1)).copied().collect()
}

/// Reshape an interleaved window into per-channel vectors.
pub fn deinterleave(flat: &[RawCount], stride: usize) -> Result<Vec<Vec<RawCount>>> {
    let n_scans = check_alignment(flat.len(), stride)?;
    let mut channels = vec![Vec::with_capacity(n_scans); stride];

    for (i, &v) in flat.iter().enumerate() {
        channels[i % stride].push(v);
    }

    Ok(channels)
}

/// Split a window into the axis channels named by `layout`.
///
/// A window that is not a whole number of scans is an alignment error; all
/// returned sequences then have exactly the same length.
pub fn demux(flat: &[RawCount], layout: &ChannelLayout) -> Result<DemuxedWindow> {
    check_alignment(flat.len(), layout.stride)?;

    let stride = layout.stride;
    Ok(DemuxedWindow {
        z1: channel(flat, stride, layout.z1),
        y: channel(flat, stride, layout.y),
        z2: channel(flat, stride, layout.z2),
        x: channel(flat, stride, layout.x),
        extruder: layout
            .extruder
            .map(|offset| channel(flat, stride, offset))
            .unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demux_default_layout() {
        // Two scans: z1, y, z2, x, extruder
        let flat = vec![10, 11, 12, 13, 14, 20, 21, 22, 23, 24];
        let window = demux(&flat, &ChannelLayout::default()).unwrap();

        assert_eq!(window.z1, vec![10, 20]);
        assert_eq!(window.y, vec![11, 21]);
        assert_eq!(window.z2, vec![12, 22]);
        assert_eq!(window.x, vec![13, 23]);
        assert_eq!(window.extruder, vec![14, 24]);
        assert_eq!(window.n_scans(), 2);
    }

    #[test]
    fn test_demux_empty_window() {
        let window = demux(&[], &ChannelLayout::default()).unwrap();
        assert_eq!(window.n_scans(), 0);
        assert!(window.z1.is_empty());
    }

    #[test]
    fn test_demux_rejects_partial_scan() {
        let err = demux(&[1, 2, 3, 4], &ChannelLayout::default()).unwrap_err();
        assert!(matches!(
            err,
            ReaderError::MisalignedWindow { len: 4, stride: 5 }
        ));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_demux_without_extruder() {
        let layout = ChannelLayout {
            stride: 4,
            extruder: None,
            ..ChannelLayout::default()
        };
        let window = demux(&[1, 2, 3, 4, 5, 6, 7, 8], &layout).unwrap();
        assert_eq!(window.x, vec![4, 8]);
        assert!(window.extruder.is_empty());
    }

    #[test]
    fn test_deinterleave() {
        let channels = deinterleave(&[1, 2, 3, 4, 5, 6], 2).unwrap();
        assert_eq!(channels, vec![vec![1, 3, 5], vec![2, 4, 6]]);
        assert!(deinterleave(&[1, 2, 3], 2).is_err());
        assert!(deinterleave(&[1, 2, 3], 0).is_err());
    }

    #[test]
    fn test_channel_matches_index_arithmetic() {
        let flat: Vec<RawCount> = (0..30).collect();
        for c in 0..5 {
            let values = channel(&flat, 5, c);
            for (k, v) in values.iter().enumerate() {
                assert_eq!(*v, flat[k * 5 + c]);
            }
        }
    }
}
