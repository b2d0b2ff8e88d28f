//! KeyFrame - A selected frame anchoring part of the map.
//!
//! A KeyFrame stores its pose estimate, its undistorted keypoints and, per
//! keypoint, the MapPoint it was matched to. The pose is corrected in place by
//! global optimization; only the id is stable.

use crate::geometry::SE3;

use super::types::{KeyFrameId, KeyPoint, MapPointId};

/// A KeyFrame in the SLAM map.
#[derive(Debug, Clone)]
pub struct KeyFrame {
    /// Unique identifier for this KeyFrame.
    pub id: KeyFrameId,

    /// Capture timestamp in nanoseconds.
    pub timestamp_ns: u64,

    /// Pose: transform from camera to world (T_wc).
    pub pose: SE3,

    /// Undistorted keypoints, in detection order.
    pub keypoints: Vec<KeyPoint>,

    /// Feature index → MapPoint association.
    /// `map_point_ids[i] = Some(mp_id)` means keypoint i observes MapPoint mp_id.
    pub map_point_ids: Vec<Option<MapPointId>>,

    /// Whether this KeyFrame has been culled.
    pub is_bad: bool,
}

impl KeyFrame {
    /// Create a new KeyFrame with no MapPoint associations.
    pub fn new(id: KeyFrameId, timestamp_ns: u64, pose: SE3, keypoints: Vec<KeyPoint>) -> Self {
        let num_features = keypoints.len();
        Self {
            id,
            timestamp_ns,
            pose,
            keypoints,
            map_point_ids: vec![None; num_features],
            is_bad: false,
        }
    }

    /// Capture timestamp in seconds.
    pub fn timestamp_secs(&self) -> f64 {
        self.timestamp_ns as f64 / 1e9
    }

    /// Associate keypoint `feature_idx` with a MapPoint.
    ///
    /// Grows the association list if the keypoint list was shorter.
    pub fn set_map_point(&mut self, feature_idx: usize, mp_id: MapPointId) {
        if feature_idx >= self.map_point_ids.len() {
            self.map_point_ids.resize(feature_idx + 1, None);
        }
        self.map_point_ids[feature_idx] = Some(mp_id);
    }

    pub fn get_map_point(&self, feature_idx: usize) -> Option<MapPointId> {
        self.map_point_ids.get(feature_idx).copied().flatten()
    }

    /// Remove the association at `feature_idx`, returning the old MapPoint.
    pub fn erase_map_point(&mut self, feature_idx: usize) -> Option<MapPointId> {
        self.map_point_ids.get_mut(feature_idx).and_then(Option::take)
    }

    /// Iterate `(feature_idx, mp_id)` over matched keypoints.
    pub fn matched_map_points(&self) -> impl Iterator<Item = (usize, MapPointId)> + '_ {
        self.map_point_ids
            .iter()
            .enumerate()
            .filter_map(|(idx, mp)| mp.map(|id| (idx, id)))
    }

    pub fn num_matched(&self) -> usize {
        self.map_point_ids.iter().filter(|mp| mp.is_some()).count()
    }

    /// Mark this KeyFrame as culled. Culled KeyFrames stay in the map so their
    /// id is never reused, but they are never published again.
    pub fn set_bad(&mut self) {
        self.is_bad = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyframe_with_features(n: usize) -> KeyFrame {
        let keypoints = (0..n).map(|i| KeyPoint::new(i as f32, i as f32)).collect();
        KeyFrame::new(KeyFrameId::new(0), 1_000, SE3::identity(), keypoints)
    }

    #[test]
    fn test_new_keyframe_has_no_matches() {
        let kf = keyframe_with_features(5);
        assert_eq!(kf.map_point_ids.len(), 5);
        assert_eq!(kf.num_matched(), 0);
        assert!(!kf.is_bad);
    }

    #[test]
    fn test_set_and_erase_map_point() {
        let mut kf = keyframe_with_features(3);
        kf.set_map_point(1, MapPointId::new(7));

        assert_eq!(kf.get_map_point(1), Some(MapPointId::new(7)));
        assert_eq!(
            kf.matched_map_points().collect::<Vec<_>>(),
            vec![(1, MapPointId::new(7))]
        );

        assert_eq!(kf.erase_map_point(1), Some(MapPointId::new(7)));
        assert_eq!(kf.get_map_point(1), None);
    }

    #[test]
    fn test_set_map_point_grows_associations() {
        let mut kf = keyframe_with_features(1);
        kf.set_map_point(4, MapPointId::new(2));
        assert_eq!(kf.map_point_ids.len(), 5);
        assert_eq!(kf.get_map_point(4), Some(MapPointId::new(2)));
    }
}
