//! "Zero here" commands.
//!
//! Zeroing never touches unwrapper state directly. A [`ZeroHandle`] sends a
//! command to the acquisition loop, which drains pending commands at the
//! start of each cycle, captures the current accumulated position as the
//! new baseline and replies with it. Emitted positions are reported
//! relative to the baseline.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use usbquad_core::{Axis, PerAxis, ReaderError, Result};

/// Default depth of the zeroing command queue.
pub const DEFAULT_ZERO_QUEUE: usize = 16;

/// Which axes a zeroing command rebases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroTarget {
    /// A single axis.
    Axis(Axis),
    /// X, Y and Z together.
    All,
}

impl ZeroTarget {
    fn includes(self, axis: Axis) -> bool {
        match self {
            ZeroTarget::Axis(target) => target == axis,
            ZeroTarget::All => true,
        }
    }
}

#[derive(Debug)]
struct ZeroCommand {
    target: ZeroTarget,
    reply: oneshot::Sender<PerAxis<f64>>,
}

/// Sending side of the zeroing channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ZeroHandle {
    tx: mpsc::Sender<ZeroCommand>,
}

/// Receiving side, owned by the acquisition loop.
#[derive(Debug)]
pub struct ZeroReceiver {
    rx: mpsc::Receiver<ZeroCommand>,
}

/// Create a zeroing channel with room for `capacity` pending commands.
pub fn zero_channel(capacity: usize) -> (ZeroHandle, ZeroReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ZeroHandle { tx }, ZeroReceiver { rx })
}

impl ZeroHandle {
    /// Rebase one axis at its current position.
    ///
    /// Resolves once the loop has applied the command, with the captured
    /// baseline in accumulated (unzeroed) units.
    pub async fn zero(&self, axis: Axis) -> Result<f64> {
        let baseline = self.request(ZeroTarget::Axis(axis)).await?;
        Ok(baseline.get(axis))
    }

    /// Rebase every axis at its current position.
    pub async fn zero_all(&self) -> Result<PerAxis<f64>> {
        self.request(ZeroTarget::All).await
    }

    async fn request(&self, target: ZeroTarget) -> Result<PerAxis<f64>> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(ZeroCommand { target, reply })
            .await
            .map_err(|_| ReaderError::NotRunning)?;
        response.await.map_err(|_| ReaderError::NotRunning)
    }
}

/// Per-axis baselines subtracted from accumulated positions.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ZeroOffsets {
    baseline: PerAxis<f64>,
}

impl ZeroOffsets {
    /// Current baselines.
    pub fn baseline(&self) -> PerAxis<f64> {
        self.baseline
    }

    /// Capture `positions` as the baseline of every axis in `target`.
    pub fn rebase(&mut self, target: ZeroTarget, positions: PerAxis<f64>) -> PerAxis<f64> {
        for axis in Axis::ALL {
            if target.includes(axis) {
                *self.baseline.get_mut(axis) = positions.get(axis);
            }
        }
        self.baseline
    }

    /// Position of `axis` relative to its baseline.
    pub fn apply(&self, axis: Axis, accumulated: f64) -> f64 {
        accumulated - self.baseline.get(axis)
    }
}

impl ZeroReceiver {
    /// Apply every pending command against `positions`.
    ///
    /// Returns the number of commands applied. Commands whose requester has
    /// gone away are still applied.
    pub fn drain(&mut self, offsets: &mut ZeroOffsets, positions: PerAxis<f64>) -> usize {
        let mut applied = 0;
        while let Ok(command) = self.rx.try_recv() {
            let baseline = offsets.rebase(command.target, positions);
            info!(
                target_axes = ?command.target,
                x = baseline.x,
                y = baseline.y,
                z = baseline.z,
                "Axis zeroed"
            );
            if command.reply.send(baseline).is_err() {
                debug!("Zero requester dropped before reply");
            }
            applied += 1;
        }
        applied
    }
}
