//! Landmark deduplicator.
//!
//! Each landmark id is emitted at most once over the lifetime of the bridge.
//! For every keyframe the deduplicator keeps only matched landmarks that are
//! still valid and have not been published, colors them from the paired raw
//! image, and records them as published.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::atlas::map::MapPointId;
use crate::system::messages::{ColoredPoint, PointCloudRecord};

use super::frame_store::RawImage;
use super::snapshot::KeyFrameSnapshot;

/// Tracks every landmark already emitted.
#[derive(Debug, Default)]
pub struct LandmarkDeduplicator {
    /// Published landmark ids with the color they were published with.
    /// Only ever grows.
    published: HashMap<MapPointId, Option<[u8; 3]>>,
}

impl LandmarkDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the point cloud of landmarks first seen in `kf`.
    ///
    /// Points whose keypoint falls outside `image` are emitted without color.
    /// Without an image the cloud is empty and nothing is marked published,
    /// so those landmarks are picked up by a later keyframe that sees them.
    pub fn extract(&mut self, kf: &KeyFrameSnapshot, image: Option<&RawImage>) -> PointCloudRecord {
        let frame_id = kf.id.frame_id();
        let Some(image) = image else {
            warn!("No raw image buffered for {}; publishing empty point cloud", kf.id);
            return PointCloudRecord::new(frame_id, kf.timestamp_ns, Vec::new());
        };

        let mut points = Vec::new();
        let mut colorless = 0usize;
        for obs in &kf.observations {
            if obs.is_bad || self.published.contains_key(&obs.map_point_id) {
                continue;
            }

            let color = obs
                .keypoint
                .and_then(|kp| kp.pixel_in(image.width, image.height))
                .and_then(|(u, v)| image.pixel(u, v));
            if color.is_none() {
                colorless += 1;
            }

            points.push(ColoredPoint {
                x: obs.position.x as f32,
                y: obs.position.y as f32,
                z: obs.position.z as f32,
                color,
            });
            self.published.insert(obs.map_point_id, color);
        }

        debug!(
            "{}: {} new landmarks ({} without color), {} published in total",
            kf.id,
            points.len(),
            colorless,
            self.published.len()
        );

        PointCloudRecord::new(frame_id, kf.timestamp_ns, points)
    }

    pub fn is_published(&self, id: MapPointId) -> bool {
        self.published.contains_key(&id)
    }

    pub fn num_published(&self) -> usize {
        self.published.len()
    }

    /// Color a landmark was published with. `Some(None)` means published
    /// without color; `None` means never published.
    pub fn published_color(&self, id: MapPointId) -> Option<Option<[u8; 3]>> {
        self.published.get(&id).copied()
    }

    /// Every published landmark and its color.
    pub fn published(&self) -> &HashMap<MapPointId, Option<[u8; 3]>> {
        &self.published
    }
}
