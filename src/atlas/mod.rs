//! Atlas module - SLAM map data structures.
//!
//! - [`map::KeyFrame`] - KeyFrames with poses, keypoints and landmark matches
//! - [`map::MapPoint`] - 3D landmarks with observation tracking
//! - [`map::Map`] - Container with association, culling and correction
//! - [`atlas::Atlas`] - Owner of the active map

pub mod atlas;
pub mod map;

pub use atlas::Atlas;
pub use map::{KeyFrame, KeyFrameId, KeyPoint, Map, MapPoint, MapPointId};
