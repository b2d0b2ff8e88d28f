//! Map module - Core SLAM map data structures.
//!
//! This module contains:
//! - [`KeyFrame`] - Selected frames with poses and keypoint observations
//! - [`MapPoint`] - 3D landmarks observed by KeyFrames
//! - [`Map`] - Container managing KeyFrames, MapPoints, and their associations
//!
//! KeyFrames observe MapPoints (KF → MP via `map_point_ids`, parallel to the
//! keypoint list) and MapPoints track their observers (MP → KF via
//! `observations`).

pub mod keyframe;
pub mod map;
pub mod map_point;
pub mod types;

pub use keyframe::KeyFrame;
pub use map::Map;
pub use map_point::MapPoint;
pub use types::{KeyFrameId, KeyPoint, MapPointId};
