//! Message types exchanged between threads and with the publish sink.
//!
//! Inbound: [`NewKeyFrameMsg`] travels from tracking to local mapping inside
//! the simulated engine. Outbound: [`OutboundRecord`] is what the bridge hands
//! to a [`PublishSink`](crate::bridge::sink::PublishSink), one record per
//! channel publication.

use std::fmt;
use std::sync::Arc;

use crate::atlas::map::{KeyFrameId, KeyPoint};
use crate::bridge::frame_store::RawImage;
use crate::geometry::SE3;

/// Message sent from Tracking to Local Mapping when a new keyframe is created.
pub struct NewKeyFrameMsg {
    /// Capture timestamp in nanoseconds.
    pub timestamp_ns: u64,

    /// Pose estimate from Tracking (T_wc: camera to world).
    pub pose: SE3,

    /// Undistorted keypoints.
    pub keypoints: Vec<KeyPoint>,

    /// Landmark association per keypoint: `landmark_matches[i] = Some(j)` if
    /// keypoint i was matched to world landmark j during tracking.
    pub landmark_matches: Vec<Option<usize>>,
}

/// Output channel of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Pose,
    Image,
    PointCloud,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Pose, Channel::Image, Channel::PointCloud];

    /// Topic used when the configuration does not name one.
    pub fn default_topic(self) -> &'static str {
        match self {
            Channel::Pose => "/slam/keyframe_pose",
            Channel::Image => "/slam/keyframe_image",
            Channel::PointCloud => "/slam/keyframe_point3d",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Pose => "pose",
            Channel::Image => "image",
            Channel::PointCloud => "point_cloud",
        };
        f.write_str(name)
    }
}

/// Stamped keyframe pose.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseRecord {
    /// Keyframe capture time, never wall-clock time.
    pub stamp_ns: u64,

    /// Decimal keyframe id.
    pub frame_id: String,

    /// Translation (x, y, z).
    pub position: [f64; 3],

    /// Unit quaternion (w, x, y, z).
    pub orientation: [f64; 4],
}

impl PoseRecord {
    /// The record as a rigid-body transform.
    pub fn to_se3(&self) -> SE3 {
        let [w, x, y, z] = self.orientation;
        let [tx, ty, tz] = self.position;
        SE3::new(
            nalgebra::UnitQuaternion::new_unchecked(nalgebra::Quaternion::new(w, x, y, z)),
            nalgebra::Vector3::new(tx, ty, tz),
        )
    }
}

/// Raw image re-published alongside the keyframe it was paired with.
#[derive(Debug, Clone)]
pub struct ImageRecord {
    /// Decimal id of the keyframe the image was paired with.
    pub keyframe_id: String,

    pub image: Arc<RawImage>,
}

/// A landmark position with the color sampled from the paired image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColoredPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,

    /// RGB sampled at the landmark's keypoint. `None` when the keypoint fell
    /// outside the image.
    pub color: Option<[u8; 3]>,
}

impl ColoredPoint {
    /// Color with the undefined case mapped to black.
    pub fn rgb(&self) -> [u8; 3] {
        self.color.unwrap_or_default()
    }

    /// Color packed as 0x00RRGGBB, the layout point-cloud consumers expect.
    pub fn packed_rgb(&self) -> u32 {
        let [r, g, b] = self.rgb();
        (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
    }
}

/// Unorganized point cloud of newly observed landmarks.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloudRecord {
    /// Decimal id of the keyframe the landmarks were extracted from.
    pub frame_id: String,

    /// Capture time of that keyframe.
    pub stamp_ns: u64,

    pub points: Vec<ColoredPoint>,

    /// Number of points (unorganized cloud).
    pub width: u32,

    /// Always 1 (unorganized cloud).
    pub height: u32,

    /// Always false: colorless points carry undefined color fields.
    pub is_dense: bool,
}

impl PointCloudRecord {
    pub fn new(frame_id: String, stamp_ns: u64, points: Vec<ColoredPoint>) -> Self {
        Self {
            frame_id,
            stamp_ns,
            width: points.len() as u32,
            height: 1,
            is_dense: false,
            points,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// One publication on one channel.
#[derive(Debug, Clone)]
pub enum OutboundRecord {
    Pose(PoseRecord),
    Image(ImageRecord),
    PointCloud(PointCloudRecord),
}

impl OutboundRecord {
    pub fn channel(&self) -> Channel {
        match self {
            OutboundRecord::Pose(_) => Channel::Pose,
            OutboundRecord::Image(_) => Channel::Image,
            OutboundRecord::PointCloud(_) => Channel::PointCloud,
        }
    }
}

/// Everything an incremental pass emits for one keyframe.
#[derive(Debug, Clone)]
pub struct KeyframeUpdate {
    pub keyframe_id: KeyFrameId,

    /// `None` when the pose was suppressed as unchanged.
    pub pose: Option<PoseRecord>,

    /// `None` when no raw image was buffered.
    pub image: Option<ImageRecord>,

    /// Newly observed landmarks; may be empty.
    pub cloud: PointCloudRecord,
}

impl KeyframeUpdate {
    /// Records in publication order: pose, image, then the point cloud if it
    /// holds any point.
    pub fn into_records(self) -> Vec<OutboundRecord> {
        let mut records = Vec::with_capacity(3);
        if let Some(pose) = self.pose {
            records.push(OutboundRecord::Pose(pose));
        }
        if let Some(image) = self.image {
            records.push(OutboundRecord::Image(image));
        }
        if !self.cloud.is_empty() {
            records.push(OutboundRecord::PointCloud(self.cloud));
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose_record() -> PoseRecord {
        PoseRecord {
            stamp_ns: 5,
            frame_id: "3".to_string(),
            position: [1.0, 2.0, 3.0],
            orientation: [1.0, 0.0, 0.0, 0.0],
        }
    }

    #[test]
    fn test_point_cloud_layout() {
        let cloud = PointCloudRecord::new(
            "7".to_string(),
            0,
            vec![
                ColoredPoint { x: 0.0, y: 0.0, z: 1.0, color: Some([1, 2, 3]) },
                ColoredPoint { x: 0.0, y: 1.0, z: 1.0, color: None },
            ],
        );
        assert_eq!(cloud.width, 2);
        assert_eq!(cloud.height, 1);
        assert!(!cloud.is_dense);
        assert_eq!(cloud.points[1].rgb(), [0, 0, 0]);
        assert_eq!(cloud.points[0].packed_rgb(), 0x010203);
    }

    #[test]
    fn test_update_skips_empty_cloud() {
        let update = KeyframeUpdate {
            keyframe_id: KeyFrameId::new(3),
            pose: Some(pose_record()),
            image: None,
            cloud: PointCloudRecord::new("3".to_string(), 5, vec![]),
        };
        let channels: Vec<Channel> = update.into_records().iter().map(|r| r.channel()).collect();
        assert_eq!(channels, vec![Channel::Pose]);
    }

    #[test]
    fn test_pose_record_to_se3() {
        let se3 = pose_record().to_se3();
        assert_eq!(se3.translation, nalgebra::Vector3::new(1.0, 2.0, 3.0));
        assert!(se3.rotation.angle() < 1e-12);
    }

    #[test]
    fn test_default_topics() {
        assert_eq!(Channel::Pose.default_topic(), "/slam/keyframe_pose");
        assert_eq!(Channel::Image.default_topic(), "/slam/keyframe_image");
        assert_eq!(Channel::PointCloud.default_topic(), "/slam/keyframe_point3d");
    }
}
