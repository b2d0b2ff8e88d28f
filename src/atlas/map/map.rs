//! Map - Container for KeyFrames and MapPoints.
//!
//! The Map is the central data structure that holds the SLAM graph:
//! - KeyFrames with their poses and keypoints
//! - MapPoints (3D landmarks) with their observations
//!
//! Culled KeyFrames and MapPoints are flagged bad rather than removed, so that
//! readers holding an id can always tell "gone" apart from "never existed".

use std::collections::HashMap;

use nalgebra::Vector3;

use crate::geometry::SE3;

use super::keyframe::KeyFrame;
use super::map_point::MapPoint;
use super::types::{KeyFrameId, KeyPoint, MapPointId};

/// The SLAM map containing KeyFrames and MapPoints.
#[derive(Debug, Default)]
pub struct Map {
    keyframes: HashMap<KeyFrameId, KeyFrame>,

    map_points: HashMap<MapPointId, MapPoint>,

    next_kf_id: u64,

    next_mp_id: u64,

    /// Most recently created KeyFrame.
    last_keyframe_id: Option<KeyFrameId>,
}

impl Map {
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // KeyFrame Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create and add a new KeyFrame to the map.
    ///
    /// Returns the ID of the created KeyFrame.
    pub fn create_keyframe(
        &mut self,
        timestamp_ns: u64,
        pose: SE3,
        keypoints: Vec<KeyPoint>,
    ) -> KeyFrameId {
        let id = KeyFrameId::new(self.next_kf_id);
        self.next_kf_id += 1;

        self.keyframes
            .insert(id, KeyFrame::new(id, timestamp_ns, pose, keypoints));
        self.last_keyframe_id = Some(id);
        id
    }

    /// Add an existing KeyFrame to the map.
    pub fn add_keyframe(&mut self, kf: KeyFrame) {
        if kf.id.0 >= self.next_kf_id {
            self.next_kf_id = kf.id.0 + 1;
        }
        if self.last_keyframe_id.is_none_or(|last| kf.id > last) {
            self.last_keyframe_id = Some(kf.id);
        }
        self.keyframes.insert(kf.id, kf);
    }

    pub fn last_keyframe_id(&self) -> Option<KeyFrameId> {
        self.last_keyframe_id
    }

    pub fn get_keyframe(&self, id: KeyFrameId) -> Option<&KeyFrame> {
        self.keyframes.get(&id)
    }

    pub fn get_keyframe_mut(&mut self, id: KeyFrameId) -> Option<&mut KeyFrame> {
        self.keyframes.get_mut(&id)
    }

    /// All KeyFrames, including culled ones, in no particular order.
    pub fn keyframes(&self) -> impl Iterator<Item = &KeyFrame> {
        self.keyframes.values()
    }

    pub fn num_keyframes(&self) -> usize {
        self.keyframes.len()
    }

    /// Cull a KeyFrame: flag it bad and drop its observations from MapPoints.
    ///
    /// Returns false if the KeyFrame does not exist or was already bad.
    pub fn set_keyframe_bad(&mut self, id: KeyFrameId) -> bool {
        let Some(kf) = self.keyframes.get_mut(&id) else {
            return false;
        };
        if kf.is_bad {
            return false;
        }
        kf.set_bad();

        let observed: Vec<MapPointId> = kf.matched_map_points().map(|(_, mp)| mp).collect();
        for mp_id in observed {
            if let Some(mp) = self.map_points.get_mut(&mp_id) {
                mp.erase_observation(id);
            }
        }
        true
    }

    // ─────────────────────────────────────────────────────────────────────────
    // MapPoint Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create and add a new MapPoint to the map.
    pub fn create_map_point(
        &mut self,
        position: Vector3<f64>,
        first_kf_id: KeyFrameId,
    ) -> MapPointId {
        let id = MapPointId::new(self.next_mp_id);
        self.next_mp_id += 1;

        self.map_points
            .insert(id, MapPoint::new(id, position, first_kf_id));
        id
    }

    pub fn get_map_point(&self, id: MapPointId) -> Option<&MapPoint> {
        self.map_points.get(&id)
    }

    pub fn get_map_point_mut(&mut self, id: MapPointId) -> Option<&mut MapPoint> {
        self.map_points.get_mut(&id)
    }

    pub fn map_points(&self) -> impl Iterator<Item = &MapPoint> {
        self.map_points.values()
    }

    pub fn num_map_points(&self) -> usize {
        self.map_points.len()
    }

    /// Cull a MapPoint: flag it bad and erase it from every observing KeyFrame.
    pub fn set_map_point_bad(&mut self, id: MapPointId) -> bool {
        let Some(mp) = self.map_points.get_mut(&id) else {
            return false;
        };
        if mp.is_bad {
            return false;
        }
        mp.set_bad();

        let observations: Vec<(KeyFrameId, usize)> = mp.observations.drain().collect();
        for (kf_id, feature_idx) in observations {
            if let Some(kf) = self.keyframes.get_mut(&kf_id) {
                kf.erase_map_point(feature_idx);
            }
        }
        true
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Associations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a bidirectional KeyFrame feature ↔ MapPoint association.
    ///
    /// Returns true if the association was created successfully.
    pub fn associate(&mut self, kf_id: KeyFrameId, feature_idx: usize, mp_id: MapPointId) -> bool {
        if !self.keyframes.contains_key(&kf_id) {
            return false;
        }
        let Some(mp) = self.map_points.get_mut(&mp_id) else {
            return false;
        };
        mp.add_observation(kf_id, feature_idx);

        if let Some(kf) = self.keyframes.get_mut(&kf_id) {
            kf.set_map_point(feature_idx, mp_id);
        }
        true
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Global correction
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply a world-frame rigid correction to every KeyFrame pose and every
    /// MapPoint position: T_wc' = C * T_wc, p' = C * p.
    pub fn apply_correction(&mut self, correction: &SE3) {
        for kf in self.keyframes.values_mut() {
            kf.pose = correction.compose(&kf.pose);
        }
        for mp in self.map_points.values_mut() {
            mp.position = correction.transform_point(&mp.position);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::UnitQuaternion;

    fn keypoints(n: usize) -> Vec<KeyPoint> {
        (0..n).map(|i| KeyPoint::new(i as f32, 0.0)).collect()
    }

    #[test]
    fn test_create_keyframe() {
        let mut map = Map::new();

        let kf_id = map.create_keyframe(1_000_000, SE3::identity(), keypoints(3));

        assert_eq!(kf_id, KeyFrameId::new(0));
        assert_eq!(map.num_keyframes(), 1);
        assert_eq!(map.last_keyframe_id(), Some(kf_id));
        assert_eq!(map.get_keyframe(kf_id).unwrap().timestamp_ns, 1_000_000);
    }

    #[test]
    fn test_ids_are_monotonic() {
        let mut map = Map::new();
        let a = map.create_keyframe(0, SE3::identity(), vec![]);
        let b = map.create_keyframe(1, SE3::identity(), vec![]);
        let p = map.create_map_point(Vector3::zeros(), a);
        let q = map.create_map_point(Vector3::zeros(), b);

        assert!(b > a);
        assert!(q > p);
    }

    #[test]
    fn test_associate() {
        let mut map = Map::new();
        let kf_id = map.create_keyframe(0, SE3::identity(), keypoints(4));
        let mp_id = map.create_map_point(Vector3::new(1.0, 2.0, 3.0), kf_id);

        assert!(map.associate(kf_id, 2, mp_id));
        assert_eq!(map.get_keyframe(kf_id).unwrap().get_map_point(2), Some(mp_id));
        assert_eq!(map.get_map_point(mp_id).unwrap().observations.get(&kf_id), Some(&2));

        assert!(!map.associate(KeyFrameId::new(99), 0, mp_id));
        assert!(!map.associate(kf_id, 0, MapPointId::new(99)));
    }

    #[test]
    fn test_set_keyframe_bad_drops_observations() {
        let mut map = Map::new();
        let kf_id = map.create_keyframe(0, SE3::identity(), keypoints(2));
        let mp_id = map.create_map_point(Vector3::zeros(), kf_id);
        map.associate(kf_id, 0, mp_id);

        assert!(map.set_keyframe_bad(kf_id));
        assert!(!map.set_keyframe_bad(kf_id));
        assert!(map.get_keyframe(kf_id).unwrap().is_bad);
        assert_eq!(map.get_map_point(mp_id).unwrap().num_observations(), 0);
    }

    #[test]
    fn test_set_map_point_bad_erases_from_keyframes() {
        let mut map = Map::new();
        let kf1 = map.create_keyframe(0, SE3::identity(), keypoints(2));
        let kf2 = map.create_keyframe(1, SE3::identity(), keypoints(2));
        let mp_id = map.create_map_point(Vector3::zeros(), kf1);
        map.associate(kf1, 0, mp_id);
        map.associate(kf2, 1, mp_id);

        assert!(map.set_map_point_bad(mp_id));
        assert!(map.get_map_point(mp_id).unwrap().is_bad);
        assert_eq!(map.get_keyframe(kf1).unwrap().get_map_point(0), None);
        assert_eq!(map.get_keyframe(kf2).unwrap().get_map_point(1), None);
    }

    #[test]
    fn test_apply_correction_moves_poses_and_points() {
        let mut map = Map::new();
        let pose = SE3::new(UnitQuaternion::identity(), Vector3::new(1.0, 0.0, 0.0));
        let kf_id = map.create_keyframe(0, pose, vec![]);
        let mp_id = map.create_map_point(Vector3::new(0.0, 1.0, 0.0), kf_id);

        let shift = SE3::new(UnitQuaternion::identity(), Vector3::new(0.0, 0.0, 2.0));
        map.apply_correction(&shift);

        assert_eq!(map.get_keyframe(kf_id).unwrap().pose.translation, Vector3::new(1.0, 0.0, 2.0));
        assert_eq!(map.get_map_point(mp_id).unwrap().position, Vector3::new(0.0, 1.0, 2.0));
    }
}
