//! Rerun sink: streams published records to a Rerun viewer.
//!
//! Entity hierarchy:
//!     camera/
//!         image            - Raw image of the latest keyframe
//!     world/
//!         keyframes/<id>   - Keyframe pose (re-logged on every republish)
//!         landmarks/<id>   - Colored landmarks first seen in keyframe <id>

use anyhow::{Context, Result};
use rerun::{RecordingStream, external::glam};
use tracing::debug;

use crate::bridge::sink::PublishSink;
use crate::system::messages::{Channel, ImageRecord, OutboundRecord, PointCloudRecord, PoseRecord};

pub struct RerunSink {
    rec: RecordingStream,
    start_timestamp_ns: Option<u64>,
}

impl RerunSink {
    /// Spawn a viewer process and connect to it.
    pub fn spawn(app_name: &str) -> Result<Self> {
        let rec = rerun::RecordingStreamBuilder::new(app_name)
            .spawn()
            .context("Failed to spawn rerun viewer")?;
        Ok(Self::new(rec))
    }

    pub fn new(rec: RecordingStream) -> Self {
        // Right-Forward-Up, matching the simulated world frame.
        rec.log_static("world", &rerun::ViewCoordinates::RFU()).ok();
        Self {
            rec,
            start_timestamp_ns: None,
        }
    }

    /// Set the timeline to the record's stamp, relative to the first one seen.
    fn set_time(&mut self, timestamp_ns: u64) {
        let start_ns = *self.start_timestamp_ns.get_or_insert(timestamp_ns);
        let relative_sec = timestamp_ns.saturating_sub(start_ns) as f64 / 1e9;
        self.rec.set_duration_secs("time", relative_sec);
    }

    fn log_pose(&mut self, pose: &PoseRecord) -> rerun::RecordingStreamResult<()> {
        self.set_time(pose.stamp_ns);
        let [x, y, z] = pose.position;
        let [qw, qx, qy, qz] = pose.orientation;
        let translation = glam::Vec3::new(x as f32, y as f32, z as f32);
        let rotation = glam::Quat::from_xyzw(qx as f32, qy as f32, qz as f32, qw as f32);

        self.rec.log(
            format!("world/keyframes/{}", pose.frame_id),
            &rerun::Transform3D::from_translation_rotation(translation, rotation),
        )?;
        self.rec.log(
            format!("world/keyframes/{}/box", pose.frame_id),
            &rerun::Boxes3D::from_centers_and_sizes([(0.0, 0.0, 0.0)], [(0.1, 0.1, 0.05)])
                .with_colors([[70u8, 130, 220]]),
        )
    }

    fn log_image(&mut self, record: &ImageRecord) -> rerun::RecordingStreamResult<()> {
        let image = &record.image;
        self.set_time(image.timestamp_ns);
        self.rec.log(
            "camera/image",
            &rerun::Image::from_rgb24(image.data().to_vec(), [image.width, image.height]),
        )
    }

    fn log_cloud(&mut self, cloud: &PointCloudRecord) -> rerun::RecordingStreamResult<()> {
        self.set_time(cloud.stamp_ns);
        let positions: Vec<[f32; 3]> = cloud.points.iter().map(|p| [p.x, p.y, p.z]).collect();
        let colors: Vec<[u8; 3]> = cloud.points.iter().map(|p| p.rgb()).collect();
        self.rec.log(
            format!("world/landmarks/{}", cloud.frame_id),
            &rerun::Points3D::new(positions)
                .with_colors(colors)
                .with_radii([0.02f32]),
        )
    }
}

impl PublishSink for RerunSink {
    fn publish(&mut self, channel: Channel, record: OutboundRecord) {
        let result = match &record {
            OutboundRecord::Pose(pose) => self.log_pose(pose),
            OutboundRecord::Image(image) => self.log_image(image),
            OutboundRecord::PointCloud(cloud) => self.log_cloud(cloud),
        };
        if let Err(e) = result {
            debug!("Rerun log on {} failed: {}", channel, e);
        }
    }
}
