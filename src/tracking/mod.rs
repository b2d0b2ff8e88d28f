//! Simulated tracking front end.
//!
//! Stands in for a feature-based tracker: the camera follows a known
//! trajectory through a synthetic landmark field, and keyframes carry
//! projected keypoints with their landmark associations.

pub mod tracker;
pub mod world;

pub use tracker::{PinholeCamera, Tracker};
pub use world::World;
