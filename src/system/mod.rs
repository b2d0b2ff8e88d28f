//! SLAM engine interface and the simulated engine.
//!
//! This module contains the [`SlamEngine`] trait the bridge observes, the
//! shared state through which map changes become visible, the message types
//! passed between threads, and [`SimulatedSlam`], which spawns and
//! coordinates the Local Mapping and Loop Closing threads.

pub mod engine;
pub mod messages;
pub mod shared_state;
mod slam_system;

pub use engine::SlamEngine;
pub use messages::NewKeyFrameMsg;
pub use shared_state::{MapEvents, SharedState};
pub use slam_system::SimulatedSlam;
