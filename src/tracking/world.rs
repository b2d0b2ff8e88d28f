//! Synthetic scene observed by the simulated tracker.

use std::f64::consts::TAU;

use nalgebra::{Matrix3, Vector3};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::SimulationConfig;
use crate::geometry::SE3;

/// Minimum depth (m) for a landmark to be considered in front of the camera.
const MIN_DEPTH: f64 = 0.1;

/// Ground-truth landmarks on a vertical cylinder around the origin.
#[derive(Debug, Clone)]
pub struct World {
    landmarks: Vec<Vector3<f64>>,
    camera_radius: f64,
    frames_per_revolution: usize,
}

impl World {
    pub fn generate(config: &SimulationConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let half_height = 0.3 * config.world_radius;
        let landmarks = (0..config.num_landmarks)
            .map(|_| {
                let phi = rng.random_range(0.0..TAU);
                let z = rng.random_range(-half_height..=half_height);
                Vector3::new(
                    config.world_radius * phi.cos(),
                    config.world_radius * phi.sin(),
                    z,
                )
            })
            .collect();

        Self {
            landmarks,
            camera_radius: config.camera_radius,
            frames_per_revolution: config.frames_per_revolution,
        }
    }

    pub fn landmark(&self, idx: usize) -> Option<&Vector3<f64>> {
        self.landmarks.get(idx)
    }

    pub fn num_landmarks(&self) -> usize {
        self.landmarks.len()
    }

    /// Camera pose (T_wc) for the given frame index.
    ///
    /// The camera moves counter-clockwise on a circle in the z = 0 plane,
    /// looking radially outward with image rows pointing down.
    pub fn camera_pose(&self, frame_index: u64) -> SE3 {
        let n = self.frames_per_revolution as u64;
        let theta = TAU * (frame_index % n) as f64 / n as f64;
        let (s, c) = theta.sin_cos();

        let right = Vector3::new(s, -c, 0.0);
        let down = Vector3::new(0.0, 0.0, -1.0);
        let forward = Vector3::new(c, s, 0.0);
        let r_wc = Matrix3::from_columns(&[right, down, forward]);

        SE3::from_rt(r_wc, self.camera_radius * forward)
    }

    /// Landmarks in front of a camera at `pose`, as (index, camera-frame point).
    pub fn visible_from<'a>(
        &'a self,
        pose: &SE3,
    ) -> impl Iterator<Item = (usize, Vector3<f64>)> + 'a {
        let t_cw = pose.inverse();
        self.landmarks
            .iter()
            .enumerate()
            .map(move |(idx, p_w)| (idx, t_cw.transform_point(p_w)))
            .filter(|(_, p_c)| p_c.z > MIN_DEPTH)
    }
}
