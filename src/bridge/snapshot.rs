//! Copy-out views of map state.
//!
//! Everything the scheduler publishes is first copied out of the atlas while
//! holding its read lock; the lock is released before any publish call.

use nalgebra::Vector3;

use crate::atlas::map::{KeyFrame, KeyFrameId, KeyPoint, Map, MapPointId};
use crate::geometry::SE3;
use crate::system::SharedState;

/// A matched landmark as seen from one keyframe.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkObservation {
    pub map_point_id: MapPointId,
    pub position: Vector3<f64>,
    pub is_bad: bool,

    /// Keypoint at the same feature index, if the keyframe has one.
    pub keypoint: Option<KeyPoint>,
}

/// Owned copy of a keyframe and, optionally, its matched landmarks.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyFrameSnapshot {
    pub id: KeyFrameId,
    pub timestamp_ns: u64,
    pub pose: SE3,
    pub is_bad: bool,
    pub observations: Vec<LandmarkObservation>,
}

impl KeyFrameSnapshot {
    /// Copy pose and validity only.
    pub fn pose_only(kf: &KeyFrame) -> Self {
        Self {
            id: kf.id,
            timestamp_ns: kf.timestamp_ns,
            pose: kf.pose,
            is_bad: kf.is_bad,
            observations: Vec::new(),
        }
    }

    /// Copy the keyframe together with every matched landmark, in feature
    /// order. Matches to landmarks missing from the map are dropped.
    pub fn with_landmarks(kf: &KeyFrame, map: &Map) -> Self {
        let observations = kf
            .matched_map_points()
            .filter_map(|(feature_idx, mp_id)| {
                let mp = map.get_map_point(mp_id)?;
                Some(LandmarkObservation {
                    map_point_id: mp_id,
                    position: mp.position,
                    is_bad: mp.is_bad,
                    keypoint: kf.keypoints.get(feature_idx).copied(),
                })
            })
            .collect();

        Self {
            observations,
            ..Self::pose_only(kf)
        }
    }
}

/// Snapshot one keyframe with its landmarks.
pub fn capture_keyframe(shared: &SharedState, id: KeyFrameId) -> Option<KeyFrameSnapshot> {
    let atlas = shared.atlas.read();
    let map = atlas.active_map();
    map.get_keyframe(id)
        .map(|kf| KeyFrameSnapshot::with_landmarks(kf, map))
}

/// Snapshot the poses of every valid keyframe, ascending by id.
pub fn capture_valid_poses(shared: &SharedState) -> Vec<KeyFrameSnapshot> {
    let mut snapshots: Vec<KeyFrameSnapshot> = {
        let atlas = shared.atlas.read();
        atlas
            .all_keyframes()
            .into_iter()
            .filter(|kf| !kf.is_bad)
            .map(KeyFrameSnapshot::pose_only)
            .collect()
    };
    snapshots.sort_by_key(|s| s.id);
    snapshots
}
