//! Redundant dual-channel reconciliation for the Z axis.
//!
//! Z is read by two counter channels. Sample-wise they must agree; when they
//! disagree by more than the policy limit the sample is replaced by `0.0`
//! (an invalid marker that keeps the window aligned) and reported as a
//! disagreement event.

use tracing::warn;

use usbquad_core::{RawCount, ReaderError, ReconciliationPolicy, Result};

/// Merged raw stream of a dual-channel axis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciled {
    /// Merged raw values, same length as each input channel.
    pub values: Vec<f64>,
    /// Number of samples replaced by the invalid marker.
    pub disagreements: u64,
}

/// Merge two redundant channels.
///
/// Each output value is the real-valued mean of the pair, or `0.0` when
/// `|raw1[i] - raw2[i]| > limit`.
pub fn reconcile(raw1: &[RawCount], raw2: &[RawCount], limit: u32) -> Result<Reconciled> {
    if raw1.len() != raw2.len() {
        return Err(ReaderError::ChannelLengthMismatch {
            expected: raw1.len(),
            actual: raw2.len(),
        });
    }

    let mut disagreements = 0;
    let values = raw1
        .iter()
        .zip(raw2)
        .enumerate()
        .map(|(i, (&a, &b))| {
            if a.abs_diff(b) > limit {
                disagreements += 1;
                warn!(
                    index = i,
                    channel1 = a,
                    channel2 = b,
                    limit,
                    "Z channels disagree, sample marked invalid"
                );
                0.0
            } else {
                (f64::from(a) + f64::from(b)) / 2.0
            }
        })
        .collect();

    Ok(Reconciled {
        values,
        disagreements,
    })
}

/// Reconciler bound to a policy.
#[derive(Debug, Clone, Default)]
pub struct DualChannelReconciler {
    policy: ReconciliationPolicy,
}

impl DualChannelReconciler {
    /// Create a reconciler.
    pub fn new(policy: ReconciliationPolicy) -> Self {
        Self { policy }
    }

    /// Active policy.
    pub fn policy(&self) -> ReconciliationPolicy {
        self.policy
    }

    /// Merge two channels under the bound policy.
    pub fn reconcile(&self, raw1: &[RawCount], raw2: &[RawCount]) -> Result<Reconciled> {
        reconcile(raw1, raw2, self.policy.disagreement_limit)
    }
}
