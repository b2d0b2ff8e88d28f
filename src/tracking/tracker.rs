//! Simulated monocular tracker.
//!
//! Each incoming image advances the camera one step along its circular
//! trajectory. Landmarks in view are projected with a pinhole model to
//! produce keypoints, and every n-th frame is sent to local mapping as a
//! keyframe.

use std::sync::Arc;

use anyhow::{Result, bail};
use crossbeam_channel::Sender;
use nalgebra::Vector3;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, trace};

use crate::atlas::map::KeyPoint;
use crate::bridge::frame_store::RawImage;
use crate::config::SimulationConfig;
use crate::geometry::SE3;
use crate::system::messages::NewKeyFrameMsg;

use super::world::World;

/// Pinhole intrinsics derived from the image size (90 degree horizontal FOV).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinholeCamera {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub width: u32,
    pub height: u32,
}

impl PinholeCamera {
    pub fn for_image(width: u32, height: u32) -> Self {
        let f = width as f64 / 2.0;
        Self {
            fx: f,
            fy: f,
            cx: width as f64 / 2.0,
            cy: height as f64 / 2.0,
            width,
            height,
        }
    }

    /// Project a camera-frame point to pixel coordinates.
    pub fn project(&self, p: &Vector3<f64>) -> (f64, f64) {
        (self.fx * p.x / p.z + self.cx, self.fy * p.y / p.z + self.cy)
    }

    pub fn contains(&self, u: f64, v: f64) -> bool {
        u >= 0.0 && v >= 0.0 && u < self.width as f64 && v < self.height as f64
    }
}

/// Front end of the simulated engine.
pub struct Tracker {
    world: Arc<World>,
    rng: StdRng,
    keyframe_interval: u64,
    max_features: usize,
    keypoint_noise_px: f64,

    /// Pose of the last tracked frame (T_wc).
    pub pose: SE3,

    /// Frames tracked so far.
    frame_count: u64,

    /// Keyframes handed to local mapping.
    keyframes_sent: usize,

    kf_sender: Sender<NewKeyFrameMsg>,
}

impl Tracker {
    pub fn new(
        world: Arc<World>,
        config: &SimulationConfig,
        kf_sender: Sender<NewKeyFrameMsg>,
    ) -> Self {
        Self {
            world,
            // Separate stream from the landmark layout.
            rng: StdRng::seed_from_u64(config.seed.wrapping_add(1)),
            keyframe_interval: config.keyframe_interval.max(1) as u64,
            max_features: config.max_features,
            keypoint_noise_px: config.keypoint_noise_px,
            pose: SE3::identity(),
            frame_count: 0,
            keyframes_sent: 0,
            kf_sender,
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn keyframes_sent(&self) -> usize {
        self.keyframes_sent
    }

    /// Track one frame. Returns true if it became a keyframe.
    pub fn track(&mut self, image: &RawImage) -> Result<bool> {
        if image.width == 0 || image.height == 0 {
            bail!("empty image at {} ns", image.timestamp_ns);
        }

        let frame_index = self.frame_count;
        self.frame_count += 1;
        self.pose = self.world.camera_pose(frame_index);
        trace!("Frame {} pose t={:?}", frame_index, self.pose.translation);

        if frame_index % self.keyframe_interval != 0 {
            return Ok(false);
        }

        let camera = PinholeCamera::for_image(image.width, image.height);
        let (keypoints, landmark_matches) = self.observe(&camera);
        debug!(
            "New keyframe from frame {} with {} keypoints",
            frame_index,
            keypoints.len()
        );

        let msg = NewKeyFrameMsg {
            timestamp_ns: image.timestamp_ns,
            pose: self.pose,
            keypoints,
            landmark_matches,
        };
        if self.kf_sender.send(msg).is_err() {
            bail!("local mapping has stopped");
        }
        self.keyframes_sent += 1;
        Ok(true)
    }

    /// Noisy keypoints for landmarks in view, capped at `max_features`.
    fn observe(&mut self, camera: &PinholeCamera) -> (Vec<KeyPoint>, Vec<Option<usize>>) {
        let noise = self.keypoint_noise_px;
        let mut keypoints = Vec::new();
        let mut matches = Vec::new();

        for (idx, p_c) in self.world.visible_from(&self.pose) {
            if keypoints.len() >= self.max_features {
                break;
            }
            let (u, v) = camera.project(&p_c);
            let u = u + self.rng.random_range(-noise..=noise);
            let v = v + self.rng.random_range(-noise..=noise);
            if !camera.contains(u, v) {
                continue;
            }
            keypoints.push(KeyPoint::new(u as f32, v as f32));
            matches.push(Some(idx));
        }

        (keypoints, matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    fn image(ts: u64) -> RawImage {
        RawImage::from_gray8(ts, 64, 48, &[0; 64 * 48]).unwrap()
    }

    #[test]
    fn test_every_nth_frame_is_a_keyframe() {
        let config = SimulationConfig {
            keyframe_interval: 3,
            ..Default::default()
        };
        let (tx, rx) = bounded(16);
        let mut tracker = Tracker::new(Arc::new(World::generate(&config)), &config, tx);

        let flags: Vec<bool> = (0..7).map(|i| tracker.track(&image(i)).unwrap()).collect();
        assert_eq!(flags, vec![true, false, false, true, false, false, true]);
        assert_eq!(tracker.keyframes_sent(), 3);
        assert_eq!(tracker.frame_count(), 7);

        let stamps: Vec<u64> = rx.try_iter().map(|m| m.timestamp_ns).collect();
        assert_eq!(stamps, vec![0, 3, 6]);
    }

    #[test]
    fn test_keypoints_inside_image_and_capped() {
        let config = SimulationConfig {
            max_features: 10,
            ..Default::default()
        };
        let (tx, rx) = bounded(1);
        let mut tracker = Tracker::new(Arc::new(World::generate(&config)), &config, tx);
        tracker.track(&image(0)).unwrap();

        let msg = rx.try_recv().unwrap();
        assert!(!msg.keypoints.is_empty());
        assert!(msg.keypoints.len() <= 10);
        assert_eq!(msg.keypoints.len(), msg.landmark_matches.len());
        for kp in &msg.keypoints {
            assert!(kp.pixel_in(64, 48).is_some());
        }
    }

    #[test]
    fn test_fails_once_mapping_is_gone() {
        let config = SimulationConfig::default();
        let (tx, rx) = bounded(1);
        let mut tracker = Tracker::new(Arc::new(World::generate(&config)), &config, tx);
        drop(rx);
        assert!(tracker.track(&image(0)).is_err());
    }
}
