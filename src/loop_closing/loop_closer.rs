//! LoopCloser - simulated global correction thread.
//!
//! Receives keyframe ids from local mapping. Each one stands for a detected
//! loop: a small random yaw is applied to the whole map under the atlas write
//! lock, the accumulated drift correction is updated, and the
//! correction-finished signal is raised.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use nalgebra::{UnitQuaternion, Vector3};
use parking_lot::Mutex;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::atlas::map::KeyFrameId;
use crate::config::SimulationConfig;
use crate::geometry::SE3;
use crate::system::SharedState;

/// Timeout for receiving keyframes from the channel.
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Transform accumulated over all corrections so far.
///
/// Local mapping applies it to keyframes and map points it inserts after a
/// correction, keeping them in the corrected frame.
#[derive(Debug, Default)]
pub struct DriftCorrection {
    total: Mutex<SE3>,
}

impl DriftCorrection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn current(&self) -> SE3 {
        *self.total.lock()
    }

    /// Left-compose `correction` onto the accumulated transform.
    pub fn accumulate(&self, correction: &SE3) {
        let mut total = self.total.lock();
        *total = correction.compose(&total);
    }
}

/// Statistics for the loop closer.
#[derive(Debug, Default, Clone)]
pub struct LoopCloserStats {
    /// Number of keyframes received.
    pub keyframes_processed: usize,

    /// Number of corrections applied to the map.
    pub loops_corrected: usize,
}

/// The LoopCloser thread handler.
pub struct LoopCloser {
    shared: Arc<SharedState>,
    drift: Arc<DriftCorrection>,
    rng: StdRng,

    /// Maximum yaw (rad) of one correction.
    max_yaw: f64,

    pub stats: LoopCloserStats,
}

impl LoopCloser {
    pub fn new(
        shared: Arc<SharedState>,
        drift: Arc<DriftCorrection>,
        config: &SimulationConfig,
    ) -> Self {
        Self {
            shared,
            drift,
            rng: StdRng::seed_from_u64(config.seed.wrapping_add(3)),
            max_yaw: config.correction_magnitude_rad.abs(),
            stats: LoopCloserStats::default(),
        }
    }

    /// Main loop. Returns on shutdown or when the sender is dropped.
    pub fn run(&mut self, kf_receiver: Receiver<KeyFrameId>) {
        tracing::info!("LoopCloser thread started");

        while !self.shared.is_shutdown_requested() {
            match kf_receiver.recv_timeout(RECV_TIMEOUT) {
                Ok(kf_id) => self.process_keyframe(kf_id),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::info!("LoopCloser channel disconnected");
                    break;
                }
            }
        }

        tracing::info!(
            "LoopCloser thread stopped. Stats: {} keyframes, {} corrections",
            self.stats.keyframes_processed,
            self.stats.loops_corrected
        );
    }

    /// Correct the map for a loop detected at `kf_id`.
    pub fn process_keyframe(&mut self, kf_id: KeyFrameId) {
        self.stats.keyframes_processed += 1;

        let yaw = self.rng.random_range(-self.max_yaw..=self.max_yaw);
        let correction = SE3::new(
            UnitQuaternion::from_euler_angles(0.0, 0.0, yaw),
            Vector3::zeros(),
        );

        {
            let mut atlas = self.shared.atlas.write();
            atlas.active_map_mut().apply_correction(&correction);
            self.drift.accumulate(&correction);
        }

        self.stats.loops_corrected += 1;
        tracing::info!("Loop at {}: map corrected by {:.4} rad yaw", kf_id, yaw);
        self.shared.signal_correction_finished();
    }
}
