//! The interface the bridge needs from a SLAM engine.

use std::sync::Arc;

use anyhow::Result;

use crate::bridge::frame_store::RawImage;

use super::shared_state::SharedState;

/// A monocular SLAM engine whose map state can be observed through
/// [`SharedState`].
///
/// Implementations mutate the atlas and raise the map-change signals from
/// their own worker threads; the bridge only reads the atlas and consumes
/// the signals.
pub trait SlamEngine: Send + Sync {
    /// Ingest one image and update internal state.
    fn track_monocular(&self, image: &RawImage) -> Result<()>;

    /// Map state shared with the engine's workers.
    fn shared_state(&self) -> &Arc<SharedState>;

    /// Stop and join the engine's worker threads. Must be idempotent.
    fn shutdown(&self);
}
