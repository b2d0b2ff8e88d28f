//! Raw frame store: recent camera images awaiting pairing with a keyframe.
//!
//! The ingestion path stores every decoded frame; the scheduler later looks up
//! the one captured nearest to a keyframe's timestamp to re-publish it and to
//! color that keyframe's landmarks. The store is bounded, so frames that are
//! never paired are simply superseded.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{BridgeError, Result};

/// A decoded camera frame, stored as packed RGB8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    /// Capture timestamp in nanoseconds.
    pub timestamp_ns: u64,
    pub width: u32,
    pub height: u32,
    data: Vec<u8>,
}

impl RawImage {
    /// Wrap a packed RGB8 buffer.
    pub fn from_rgb8(timestamp_ns: u64, width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(BridgeError::InvalidImage(format!(
                "{}x{} RGB8 needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            timestamp_ns,
            width,
            height,
            data,
        })
    }

    /// Wrap a single-channel buffer, replicating it into RGB.
    pub fn from_gray8(timestamp_ns: u64, width: u32, height: u32, data: &[u8]) -> Result<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(BridgeError::InvalidImage(format!(
                "{}x{} mono8 needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        let rgb = data.iter().flat_map(|&l| [l, l, l]).collect();
        Self::from_rgb8(timestamp_ns, width, height, rgb)
    }

    /// Decode an encoded image (PNG or JPEG) into RGB8.
    pub fn decode(timestamp_ns: u64, bytes: &[u8]) -> Result<Self> {
        let rgb = image::load_from_memory(bytes)?.to_rgb8();
        let (width, height) = rgb.dimensions();
        Self::from_rgb8(timestamp_ns, width, height, rgb.into_raw())
    }

    /// RGB value at pixel (u, v), or `None` outside the image.
    pub fn pixel(&self, u: u32, v: u32) -> Option<[u8; 3]> {
        if u >= self.width || v >= self.height {
            return None;
        }
        let offset = (v as usize * self.width as usize + u as usize) * 3;
        Some([self.data[offset], self.data[offset + 1], self.data[offset + 2]])
    }

    /// Packed RGB8 pixel buffer, row-major.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Bounded buffer of the most recent frames.
pub struct RawFrameStore {
    capacity: usize,
    frames: Mutex<VecDeque<Arc<RawImage>>>,
}

impl RawFrameStore {
    /// Create a store holding at most `capacity` frames (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Buffer a frame, evicting the oldest one when full.
    pub fn store(&self, image: Arc<RawImage>) {
        let mut frames = self.frames.lock();
        if frames.len() == self.capacity {
            frames.pop_front();
        }
        frames.push_back(image);
    }

    /// Most recently stored frame.
    pub fn latest(&self) -> Option<Arc<RawImage>> {
        self.frames.lock().back().cloned()
    }

    /// Frame captured nearest to `timestamp_ns`.
    ///
    /// Ties go to the later frame. The chosen frame stays buffered; frames
    /// older than it are discarded.
    pub fn nearest_and_prune(&self, timestamp_ns: u64) -> Option<Arc<RawImage>> {
        let mut frames = self.frames.lock();
        let (idx, _) = frames
            .iter()
            .enumerate()
            .min_by_key(|(idx, frame)| {
                (frame.timestamp_ns.abs_diff(timestamp_ns), usize::MAX - idx)
            })?;
        let chosen = frames[idx].clone();
        frames.drain(..idx);
        Some(chosen)
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(ts: u64) -> Arc<RawImage> {
        Arc::new(RawImage::from_rgb8(ts, 1, 1, vec![0, 0, 0]).unwrap())
    }

    #[test]
    fn test_rgb_buffer_size_checked() {
        assert!(RawImage::from_rgb8(0, 2, 2, vec![0; 12]).is_ok());
        assert!(matches!(
            RawImage::from_rgb8(0, 2, 2, vec![0; 11]),
            Err(BridgeError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_pixel_lookup() {
        let img = RawImage::from_rgb8(0, 2, 1, vec![1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(img.pixel(0, 0), Some([1, 2, 3]));
        assert_eq!(img.pixel(1, 0), Some([4, 5, 6]));
        assert_eq!(img.pixel(2, 0), None);
        assert_eq!(img.pixel(0, 1), None);
    }

    #[test]
    fn test_gray_is_replicated() {
        let img = RawImage::from_gray8(0, 2, 1, &[9, 200]).unwrap();
        assert_eq!(img.pixel(1, 0), Some([200, 200, 200]));
    }

    #[test]
    fn test_decode_png() {
        let mut buf = image::RgbImage::new(3, 2);
        buf.put_pixel(2, 1, image::Rgb([10, 20, 30]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(buf)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let img = RawImage::decode(77, &bytes).unwrap();
        assert_eq!((img.width, img.height, img.timestamp_ns), (3, 2, 77));
        assert_eq!(img.pixel(2, 1), Some([10, 20, 30]));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(
            RawImage::decode(0, b"not an image"),
            Err(BridgeError::Decode(_))
        ));
    }

    #[test]
    fn test_store_is_bounded() {
        let store = RawFrameStore::new(2);
        store.store(frame(1));
        store.store(frame(2));
        store.store(frame(3));
        assert_eq!(store.len(), 2);
        assert_eq!(store.latest().unwrap().timestamp_ns, 3);
    }

    #[test]
    fn test_nearest_and_prune_discards_older_frames() {
        let store = RawFrameStore::new(4);
        for ts in [100, 200, 300, 400] {
            store.store(frame(ts));
        }

        let chosen = store.nearest_and_prune(290).unwrap();
        assert_eq!(chosen.timestamp_ns, 300);
        assert_eq!(store.len(), 2);

        // The chosen frame is kept for a keyframe at the same instant.
        assert_eq!(store.nearest_and_prune(300).unwrap().timestamp_ns, 300);
        assert_eq!(store.len(), 2);

        // Equidistant: the later frame wins.
        assert_eq!(store.nearest_and_prune(350).unwrap().timestamp_ns, 400);
    }

    #[test]
    fn test_nearest_and_prune_on_empty_store() {
        assert!(RawFrameStore::new(3).nearest_and_prune(0).is_none());
    }
}
