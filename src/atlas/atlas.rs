//! Atlas - the engine's top-level map container.
//!
//! The Atlas owns the active `Map` where mapping and loop closing operate.
//! Readers go through `SharedState::atlas` and must copy out whatever they
//! need before releasing the lock.

use crate::atlas::map::{KeyFrame, KeyFrameId, Map};

/// Top-level map container.
#[derive(Debug, Default)]
pub struct Atlas {
    active_map: Map,
}

impl Atlas {
    /// Create a new Atlas with an empty active map.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_map(&self) -> &Map {
        &self.active_map
    }

    pub fn active_map_mut(&mut self) -> &mut Map {
        &mut self.active_map
    }

    /// Every KeyFrame of the active map, culled ones included, in no
    /// particular order.
    pub fn all_keyframes(&self) -> Vec<&KeyFrame> {
        self.active_map.keyframes().collect()
    }

    /// The most recently created KeyFrame, whether or not it is still valid.
    pub fn last_keyframe(&self) -> Option<&KeyFrame> {
        self.active_map
            .last_keyframe_id()
            .and_then(|id| self.active_map.get_keyframe(id))
    }

    pub fn get_keyframe(&self, id: KeyFrameId) -> Option<&KeyFrame> {
        self.active_map.get_keyframe(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SE3;

    #[test]
    fn test_last_keyframe_tracks_creation_order() {
        let mut atlas = Atlas::new();
        assert!(atlas.last_keyframe().is_none());

        atlas.active_map_mut().create_keyframe(10, SE3::identity(), vec![]);
        let second = atlas.active_map_mut().create_keyframe(20, SE3::identity(), vec![]);

        assert_eq!(atlas.last_keyframe().map(|kf| kf.id), Some(second));
        assert_eq!(atlas.all_keyframes().len(), 2);
    }
}
