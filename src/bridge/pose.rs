//! Pose serializer and last-published-pose change filter.

use crate::config::PoseTolerance;
use crate::system::messages::PoseRecord;

use super::snapshot::KeyFrameSnapshot;

/// Convert a keyframe pose into an external pose record.
///
/// The stamp is the keyframe's capture time and the frame id is the decimal
/// keyframe id, so consumers can match later corrections to earlier records.
pub fn serialize_pose(kf: &KeyFrameSnapshot) -> PoseRecord {
    let t = &kf.pose.translation;
    let q = &kf.pose.rotation;
    PoseRecord {
        stamp_ns: kf.timestamp_ns,
        frame_id: kf.id.frame_id(),
        position: [t.x, t.y, t.z],
        orientation: [q.w, q.i, q.j, q.k],
    }
}

/// Suppresses re-sending a pose that has not moved.
///
/// Two records count as unchanged when they carry the same frame id and
/// differ by at most the configured translation and rotation tolerance.
#[derive(Debug, Clone, Default)]
pub struct PoseChangeFilter {
    tolerance: Option<PoseTolerance>,
    last: Option<PoseRecord>,
}

impl PoseChangeFilter {
    pub fn new(tolerance: Option<PoseTolerance>) -> Self {
        Self {
            tolerance,
            last: None,
        }
    }

    /// Returns true if `record` should be published, and if so remembers it
    /// as the last published pose.
    pub fn should_publish(&mut self, record: &PoseRecord) -> bool {
        if let (Some(tol), Some(last)) = (&self.tolerance, &self.last) {
            if is_unchanged(last, record, tol) {
                return false;
            }
        }
        self.record_published(record);
        true
    }

    /// Remember a pose published without consulting the filter.
    pub fn record_published(&mut self, record: &PoseRecord) {
        self.last = Some(record.clone());
    }

    pub fn last_published(&self) -> Option<&PoseRecord> {
        self.last.as_ref()
    }
}

fn is_unchanged(a: &PoseRecord, b: &PoseRecord, tol: &PoseTolerance) -> bool {
    if a.frame_id != b.frame_id {
        return false;
    }
    let (pa, pb) = (a.to_se3(), b.to_se3());
    pa.translation_distance(&pb) <= tol.translation_m
        && pa.rotation_distance(&pb) <= tol.rotation_rad
}
