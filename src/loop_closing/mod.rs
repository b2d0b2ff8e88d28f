//! Loop closing for the simulated engine.
//!
//! The LoopCloser runs in its own thread, receiving keyframes from local
//! mapping via a channel. Every keyframe it receives is treated as a closed
//! loop and triggers a global map correction.

pub mod loop_closer;

pub use loop_closer::{DriftCorrection, LoopCloser, LoopCloserStats};
