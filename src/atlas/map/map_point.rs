//! MapPoint - A 3D landmark observed by KeyFrames.

use std::collections::HashMap;

use nalgebra::Vector3;

use super::types::{KeyFrameId, MapPointId};

/// A 3D map point (landmark) observed by one or more KeyFrames.
#[derive(Debug, Clone)]
pub struct MapPoint {
    /// Unique identifier for this MapPoint.
    pub id: MapPointId,

    /// 3D position in world frame. Corrected in place by global optimization.
    pub position: Vector3<f64>,

    /// KeyFrames observing this point, mapped to feature index in that KeyFrame.
    pub observations: HashMap<KeyFrameId, usize>,

    /// KeyFrame that first created this MapPoint (reference frame).
    pub first_kf_id: KeyFrameId,

    /// Whether this point has been culled.
    pub is_bad: bool,
}

impl MapPoint {
    pub fn new(id: MapPointId, position: Vector3<f64>, first_kf_id: KeyFrameId) -> Self {
        Self {
            id,
            position,
            observations: HashMap::new(),
            first_kf_id,
            is_bad: false,
        }
    }

    pub fn add_observation(&mut self, kf_id: KeyFrameId, feature_idx: usize) {
        self.observations.insert(kf_id, feature_idx);
    }

    /// Remove an observation.
    ///
    /// Returns true if the observation existed and was removed.
    pub fn erase_observation(&mut self, kf_id: KeyFrameId) -> bool {
        self.observations.remove(&kf_id).is_some()
    }

    pub fn num_observations(&self) -> usize {
        self.observations.len()
    }

    pub fn set_bad(&mut self) {
        self.is_bad = true;
    }
}
