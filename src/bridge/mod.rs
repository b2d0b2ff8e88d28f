//! Map-state bridge.
//!
//! Observes a running SLAM engine and republishes its keyframe poses,
//! keyframe images and newly observed landmarks to a [`PublishSink`].
//!
//! Three threads are involved:
//! - the caller, submitting camera frames through a [`FrameSender`];
//! - the ingest worker, decoding frames and driving the engine;
//! - the publisher, running the [`Scheduler`] at a fixed cadence.

pub mod frame_store;
pub mod ingest;
pub mod landmarks;
pub mod monitor;
pub mod pose;
pub mod scheduler;
pub mod sink;
pub mod snapshot;

pub use frame_store::{RawFrameStore, RawImage};
pub use ingest::{FramePayload, FrameSender, IncomingFrame};
pub use landmarks::LandmarkDeduplicator;
pub use scheduler::{PassOutcome, Scheduler, SchedulerReport, SchedulerState, SchedulerStats};
pub use sink::{ChannelSink, FanoutSink, LogSink, PublishSink, Publication};

use std::sync::Arc;

use tracing::info;

use crate::config::BridgeConfig;
use crate::error::Result;
use crate::system::{SharedState, SlamEngine};

use ingest::IngestWorker;
use scheduler::SchedulerHandle;

/// Summary returned by [`Bridge::shutdown`].
#[derive(Debug)]
pub struct BridgeReport {
    /// Frames the engine tracked successfully.
    pub frames_tracked: usize,
    pub scheduler: SchedulerReport,
}

/// A running bridge attached to one engine.
pub struct Bridge {
    engine: Arc<dyn SlamEngine>,
    frames: Arc<RawFrameStore>,
    sender: FrameSender,
    ingest: IngestWorker,
    scheduler: SchedulerHandle,
}

impl Bridge {
    /// Start the ingest and publisher threads.
    pub fn start(
        engine: Arc<dyn SlamEngine>,
        sink: Box<dyn PublishSink>,
        config: &BridgeConfig,
    ) -> Result<Self> {
        config.validate()?;

        let frames = Arc::new(RawFrameStore::new(config.frame_buffer_capacity));
        let scheduler = Scheduler::new(
            engine.shared_state().clone(),
            frames.clone(),
            sink,
            config,
        )
        .spawn(config.publish_period()?)?;
        let (ingest, sender) =
            IngestWorker::spawn(engine.clone(), frames.clone(), config.image_queue_depth)?;

        info!(
            "Bridge started: {:.1} Hz, queue depth {}, frame buffer {}",
            config.publish_rate_hz, config.image_queue_depth, config.frame_buffer_capacity
        );

        Ok(Self {
            engine,
            frames,
            sender,
            ingest,
            scheduler,
        })
    }

    /// A cloneable handle for submitting camera frames.
    pub fn frame_sender(&self) -> FrameSender {
        self.sender.clone()
    }

    /// Submit one frame, blocking while the ingest queue is full.
    pub fn submit(&self, frame: IncomingFrame) -> Result<()> {
        self.sender.send(frame)
    }

    pub fn shared_state(&self) -> &Arc<SharedState> {
        self.engine.shared_state()
    }

    /// Frames currently buffered for keyframe pairing.
    pub fn buffered_frames(&self) -> usize {
        self.frames.len()
    }

    /// Stop ingestion, let the publisher finish its in-flight pass, and
    /// stop the engine. Frames still queued are discarded.
    pub fn shutdown(self) -> Result<BridgeReport> {
        info!("Shutting down bridge");
        let Self {
            engine,
            sender,
            ingest,
            scheduler,
            ..
        } = self;

        drop(sender);
        engine.shared_state().request_shutdown();
        let ingest_result = ingest.join();
        let scheduler_result = scheduler.shutdown();
        engine.shutdown();

        let report = BridgeReport {
            frames_tracked: ingest_result?,
            scheduler: scheduler_result?,
        };
        info!(
            "Bridge stopped: {} frames tracked, {} landmarks published",
            report.frames_tracked,
            report.scheduler.landmarks.num_published()
        );
        Ok(report)
    }
}
