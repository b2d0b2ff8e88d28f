//! Runtime configuration loaded from the settings file.
//!
//! The settings file is YAML. Every section and field is optional; missing
//! values fall back to the defaults below. A leading OpenCV-style
//! `%YAML:1.0` directive is tolerated so that engine settings files can carry
//! a bridge section directly.
//!
//! ```yaml
//! bridge:
//!   publish_rate_hz: 25.0
//!   image_queue_depth: 100
//!   frame_buffer_capacity: 4
//!   pose_change_tolerance:
//!     translation_m: 1.0e-6
//!     rotation_rad: 1.0e-6
//!   topics:
//!     pose: /slam/keyframe_pose
//! dataset:
//!   path: data/euroc/MH_01_easy/mav0
//!   playback_rate_hz: 20.0
//! export:
//!   enabled: true
//!   output_root: ./dataset
//! sinks:
//!   log: true
//!   point_log: point_cloud_data.txt
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{BridgeError, Result};
use crate::system::messages::Channel;

/// Top-level settings file layout.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bridge: BridgeConfig,
    pub simulation: SimulationConfig,
    pub dataset: DatasetConfig,
    pub export: ExportConfig,
    pub sinks: SinkConfig,
}

impl Settings {
    /// Load and validate settings from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| BridgeError::SettingsRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parse and validate settings from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let body = strip_yaml_directive(text);
        let settings: Settings = if body.trim().is_empty() {
            Settings::default()
        } else {
            serde_yaml::from_str(body)?
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.bridge.validate()?;
        self.simulation.validate()?;
        if self.dataset.playback_rate_hz < 0.0 || !self.dataset.playback_rate_hz.is_finite() {
            return Err(BridgeError::InvalidConfig(format!(
                "dataset.playback_rate_hz must be >= 0, got {}",
                self.dataset.playback_rate_hz
            )));
        }
        self.dataset.playback_period()?;
        Ok(())
    }
}

/// OpenCV FileStorage writes `%YAML:1.0`, which is not a valid YAML directive.
fn strip_yaml_directive(text: &str) -> &str {
    match text.strip_prefix("%YAML:") {
        Some(rest) => rest.split_once('\n').map_or("", |(_, body)| body),
        None => text,
    }
}

/// Period of a rate in Hz; fails when the period is not representable.
fn period_of(rate_hz: f64, field: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(1.0 / rate_hz).map_err(|_| {
        BridgeError::InvalidConfig(format!("{field} of {rate_hz} Hz has no usable period"))
    })
}

/// Publication scheduler and ingestion settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Scheduler cadence. Trades publication latency against polling cost.
    pub publish_rate_hz: f64,

    /// Capacity of the inbound image queue. A full queue blocks the producer.
    pub image_queue_depth: usize,

    /// Number of recent raw frames kept for keyframe pairing.
    pub frame_buffer_capacity: usize,

    /// Incremental poses within this tolerance of the last published pose of
    /// the same keyframe are not re-sent. `None` always sends.
    pub pose_change_tolerance: Option<PoseTolerance>,

    pub topics: TopicConfig,
}

impl BridgeConfig {
    /// Interval between scheduler passes.
    pub fn publish_period(&self) -> Result<Duration> {
        period_of(self.publish_rate_hz, "bridge.publish_rate_hz")
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.publish_rate_hz.is_finite() && self.publish_rate_hz > 0.0) {
            return Err(BridgeError::InvalidConfig(format!(
                "bridge.publish_rate_hz must be > 0, got {}",
                self.publish_rate_hz
            )));
        }
        self.publish_period()?;
        if self.image_queue_depth == 0 {
            return Err(BridgeError::InvalidConfig(
                "bridge.image_queue_depth must be at least 1".into(),
            ));
        }
        if self.frame_buffer_capacity == 0 {
            return Err(BridgeError::InvalidConfig(
                "bridge.frame_buffer_capacity must be at least 1".into(),
            ));
        }
        if let Some(tol) = &self.pose_change_tolerance {
            if tol.translation_m < 0.0 || tol.rotation_rad < 0.0 {
                return Err(BridgeError::InvalidConfig(
                    "bridge.pose_change_tolerance values must be >= 0".into(),
                ));
            }
        }
        Ok(())
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            publish_rate_hz: 25.0,
            image_queue_depth: 100,
            frame_buffer_capacity: 4,
            pose_change_tolerance: Some(PoseTolerance::default()),
            topics: TopicConfig::default(),
        }
    }
}

/// Tolerance for treating two poses of one keyframe as unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PoseTolerance {
    pub translation_m: f64,
    pub rotation_rad: f64,
}

impl Default for PoseTolerance {
    fn default() -> Self {
        Self {
            translation_m: 1e-6,
            rotation_rad: 1e-6,
        }
    }
}

/// Topic names of the three output channels.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    pub pose: String,
    pub image: String,
    pub point_cloud: String,
}

impl TopicConfig {
    pub fn topic(&self, channel: Channel) -> &str {
        match channel {
            Channel::Pose => &self.pose,
            Channel::Image => &self.image,
            Channel::PointCloud => &self.point_cloud,
        }
    }
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            pose: Channel::Pose.default_topic().to_string(),
            image: Channel::Image.default_topic().to_string(),
            point_cloud: Channel::PointCloud.default_topic().to_string(),
        }
    }
}

/// Simulated engine parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seed for landmark layout, keypoint noise and culling decisions.
    pub seed: u64,

    /// Number of landmarks scattered on the surrounding cylinder.
    pub num_landmarks: usize,

    /// Radius (m) of the landmark cylinder.
    pub world_radius: f64,

    /// Radius (m) of the circle the camera travels on.
    pub camera_radius: f64,

    /// Frames per full revolution of the camera.
    pub frames_per_revolution: usize,

    /// Every n-th frame becomes a keyframe.
    pub keyframe_interval: usize,

    /// Cap on keypoints per keyframe.
    pub max_features: usize,

    /// Standard deviation-like amplitude (px) of keypoint noise.
    pub keypoint_noise_px: f64,

    /// Probability per new keyframe that an older keyframe is culled.
    pub keyframe_cull_probability: f64,

    /// Probability per new keyframe that one of its landmarks is culled.
    pub landmark_cull_probability: f64,

    /// Every n-th keyframe triggers a global correction. 0 disables it.
    pub correction_interval: usize,

    /// Maximum yaw (rad) of a simulated global correction.
    pub correction_magnitude_rad: f64,
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.keyframe_interval == 0 || self.frames_per_revolution == 0 {
            return Err(BridgeError::InvalidConfig(
                "simulation.keyframe_interval and frames_per_revolution must be at least 1".into(),
            ));
        }
        for (name, p) in [
            ("keyframe_cull_probability", self.keyframe_cull_probability),
            ("landmark_cull_probability", self.landmark_cull_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(BridgeError::InvalidConfig(format!(
                    "simulation.{name} must be within [0, 1], got {p}"
                )));
            }
        }
        if !(self.keypoint_noise_px >= 0.0) {
            return Err(BridgeError::InvalidConfig(format!(
                "simulation.keypoint_noise_px must be >= 0, got {}",
                self.keypoint_noise_px
            )));
        }
        if self.camera_radius >= self.world_radius {
            return Err(BridgeError::InvalidConfig(
                "simulation.camera_radius must be smaller than world_radius".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_landmarks: 600,
            world_radius: 5.0,
            camera_radius: 1.0,
            frames_per_revolution: 600,
            keyframe_interval: 5,
            max_features: 300,
            keypoint_noise_px: 0.5,
            keyframe_cull_probability: 0.05,
            landmark_cull_probability: 0.1,
            correction_interval: 20,
            correction_magnitude_rad: 0.01,
        }
    }
}

/// Frame source for the binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// EuRoC `mav0` directory. Only `cam0` is read.
    pub path: Option<PathBuf>,

    /// Frames pushed per second. 0 pushes as fast as the queue accepts.
    pub playback_rate_hz: f64,
}

impl DatasetConfig {
    /// Interval between pushed frames, or `None` when unpaced.
    pub fn playback_period(&self) -> Result<Option<Duration>> {
        if self.playback_rate_hz > 0.0 {
            period_of(self.playback_rate_hz, "dataset.playback_rate_hz").map(Some)
        } else {
            Ok(None)
        }
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: None,
            playback_rate_hz: 20.0,
        }
    }
}

/// Shutdown export of trajectory, image table and points.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub enabled: bool,

    /// A timestamped directory is created below this root.
    pub output_root: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_root: PathBuf::from("./dataset"),
        }
    }
}

/// Which publish sinks the binary wires up.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Log a one-line summary of every publication.
    pub log: bool,

    /// Append every published point to this text file.
    pub point_log: Option<PathBuf>,

    /// Stream to a Rerun viewer (requires the `rerun` feature).
    pub rerun: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            log: true,
            point_log: None,
            rerun: false,
        }
    }
}
