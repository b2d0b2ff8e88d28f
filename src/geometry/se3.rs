//! SE3: rigid-body transformation (rotation + translation).
//!
//! Keyframe poses are stored as T_wc (camera to world) and are mutated in place
//! whenever the map is re-optimized, so every consumer works on copies.

use nalgebra::{Matrix3, Point3, Rotation3, UnitQuaternion, Vector3};

/// Rigid-body transformation: p' = R * p + t.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SE3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl SE3 {
    /// Identity transformation.
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    pub fn new(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Construct from a rotation matrix and translation.
    ///
    /// The matrix is assumed orthonormal; no re-orthogonalization is done.
    pub fn from_rt(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        let rot3 = Rotation3::from_matrix_unchecked(rotation);
        Self {
            rotation: UnitQuaternion::from_rotation_matrix(&rot3),
            translation,
        }
    }

    /// Inverse transformation: T^-1 = [R^T | -R^T t].
    pub fn inverse(&self) -> Self {
        let rot_inv = self.rotation.inverse();
        Self {
            rotation: rot_inv,
            translation: -(rot_inv * self.translation),
        }
    }

    /// Composition: (self * other)(p) = self(other(p)).
    pub fn compose(&self, other: &SE3) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    /// Apply the transformation to a point.
    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        (self.rotation * Point3::from(*p)).coords + self.translation
    }

    /// Rotation angle (radians) between this pose and `other`.
    pub fn rotation_distance(&self, other: &SE3) -> f64 {
        self.rotation.angle_to(&other.rotation)
    }

    /// Euclidean distance between the translations of the two poses.
    pub fn translation_distance(&self, other: &SE3) -> f64 {
        (self.translation - other.translation).norm()
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_inverse_roundtrip() {
        let pose = SE3::new(
            UnitQuaternion::from_euler_angles(0.1, -0.2, 0.3),
            Vector3::new(1.0, 2.0, 3.0),
        );
        let p = Vector3::new(0.5, -1.0, 4.0);

        let back = pose.inverse().transform_point(&pose.transform_point(&p));
        assert!((back - p).norm() < 1e-12);
    }

    #[test]
    fn test_compose_applies_right_first() {
        let rot = SE3::new(
            UnitQuaternion::from_euler_angles(0.0, 0.0, FRAC_PI_2),
            Vector3::zeros(),
        );
        let shift = SE3::new(UnitQuaternion::identity(), Vector3::new(1.0, 0.0, 0.0));

        let p = rot.compose(&shift).transform_point(&Vector3::zeros());
        assert!((p - Vector3::new(0.0, 1.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_distances() {
        let a = SE3::identity();
        let b = SE3::new(
            UnitQuaternion::from_euler_angles(0.0, 0.0, 0.25),
            Vector3::new(3.0, 4.0, 0.0),
        );
        assert!((a.translation_distance(&b) - 5.0).abs() < 1e-12);
        assert!((a.rotation_distance(&b) - 0.25).abs() < 1e-12);
    }
}
