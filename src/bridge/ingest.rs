//! Image ingestion.
//!
//! Camera frames arrive on a bounded queue. A worker thread decodes each one,
//! buffers it for later keyframe pairing and hands it to the engine for
//! tracking. Decode failures drop the frame; tracking failures are logged.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};
use crate::system::SlamEngine;

use super::frame_store::{RawFrameStore, RawImage};

/// How long the worker waits for a frame before re-checking shutdown.
const RECV_TIMEOUT: Duration = Duration::from_millis(50);

/// Pixel payload of an incoming frame.
#[derive(Debug, Clone)]
pub enum FramePayload {
    /// Compressed image bytes (PNG or JPEG).
    Encoded(Vec<u8>),

    /// Already-decoded pixels.
    Decoded(RawImage),
}

/// One camera frame as submitted to the bridge.
#[derive(Debug, Clone)]
pub struct IncomingFrame {
    pub timestamp_ns: u64,
    pub payload: FramePayload,
}

impl IncomingFrame {
    pub fn encoded(timestamp_ns: u64, bytes: Vec<u8>) -> Self {
        Self {
            timestamp_ns,
            payload: FramePayload::Encoded(bytes),
        }
    }

    pub fn decoded(image: RawImage) -> Self {
        Self {
            timestamp_ns: image.timestamp_ns,
            payload: FramePayload::Decoded(image),
        }
    }

    fn into_image(self) -> Result<RawImage> {
        match self.payload {
            FramePayload::Encoded(bytes) => RawImage::decode(self.timestamp_ns, &bytes),
            FramePayload::Decoded(image) => Ok(image),
        }
    }
}

/// Producer end of the ingestion queue.
#[derive(Clone)]
pub struct FrameSender {
    tx: Sender<IncomingFrame>,
}

impl FrameSender {
    /// Queue a frame, blocking while the queue is full.
    pub fn send(&self, frame: IncomingFrame) -> Result<()> {
        self.tx.send(frame).map_err(|_| BridgeError::ShuttingDown)
    }

    /// Frames queued but not yet picked up by the worker.
    pub fn pending(&self) -> usize {
        self.tx.len()
    }

    /// Queue a frame without blocking. Returns `Ok(false)` if the queue is
    /// full and the frame was dropped.
    pub fn try_send(&self, frame: IncomingFrame) -> Result<bool> {
        match self.tx.try_send(frame) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Disconnected(_)) => Err(BridgeError::ShuttingDown),
        }
    }
}

/// Running ingestion worker.
pub struct IngestWorker {
    handle: JoinHandle<usize>,
}

impl IngestWorker {
    /// Spawn the worker and return it with the producer end of its queue.
    pub fn spawn(
        engine: Arc<dyn SlamEngine>,
        frames: Arc<RawFrameStore>,
        queue_depth: usize,
    ) -> Result<(Self, FrameSender)> {
        let (tx, rx) = bounded(queue_depth.max(1));
        let handle = thread::Builder::new()
            .name("ingest".into())
            .spawn(move || ingest_loop(engine.as_ref(), &frames, rx))?;
        Ok((Self { handle }, FrameSender { tx }))
    }

    /// Wait for the worker to exit. Returns the number of frames tracked.
    pub fn join(self) -> Result<usize> {
        self.handle
            .join()
            .map_err(|_| BridgeError::ThreadPanicked("ingest"))
    }
}

/// Process frames until every sender is gone or the engine is shutting down.
fn ingest_loop(
    engine: &dyn SlamEngine,
    frames: &RawFrameStore,
    rx: Receiver<IncomingFrame>,
) -> usize {
    info!("Ingest thread started");
    let shared = engine.shared_state().clone();
    let mut tracked = 0usize;

    while !shared.is_shutdown_requested() {
        let frame = match rx.recv_timeout(RECV_TIMEOUT) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let timestamp_ns = frame.timestamp_ns;
        let image = match frame.into_image() {
            Ok(image) => Arc::new(image),
            Err(e) => {
                warn!("Dropping frame at {} ns: {}", timestamp_ns, e);
                continue;
            }
        };

        frames.store(image.clone());
        if let Err(e) = engine.track_monocular(&image) {
            warn!("Tracking failed for frame at {} ns: {:#}", timestamp_ns, e);
            continue;
        }
        tracked += 1;
        debug!("Tracked frame at {} ns", timestamp_ns);
    }

    info!("Ingest thread stopped after {} frames", tracked);
    tracked
}
