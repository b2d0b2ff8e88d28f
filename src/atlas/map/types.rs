//! Core ID and feature types for the Atlas map structures.

/// Unique identifier for a KeyFrame within a Map.
///
/// KeyFrameIds are assigned sequentially when KeyFrames are created and never
/// reused, so they are the only stable key for a keyframe whose pose keeps
/// changing under re-optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyFrameId(pub u64);

impl KeyFrameId {
    /// Create a new KeyFrameId with the given value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// External frame identifier: the decimal form of the id.
    pub fn frame_id(&self) -> String {
        self.0.to_string()
    }
}

impl std::fmt::Display for KeyFrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KF{}", self.0)
    }
}

/// Unique identifier for a MapPoint within a Map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MapPointId(pub u64);

impl MapPointId {
    /// Create a new MapPointId with the given value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for MapPointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MP{}", self.0)
    }
}

/// Undistorted 2D keypoint location in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct KeyPoint {
    pub x: f32,
    pub y: f32,
}

impl KeyPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Integer pixel of this keypoint, if it lies inside a
    /// `width` x `height` image.
    pub fn pixel_in(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        if !(self.x.is_finite() && self.y.is_finite()) {
            return None;
        }
        // Truncation toward zero, as in integer pixel casts.
        let u = self.x as i64;
        let v = self.y as i64;
        if (0..width as i64).contains(&u) && (0..height as i64).contains(&v) {
            Some((u as u32, v as u32))
        } else {
            None
        }
    }
}
