//! SimulatedSlam - a self-contained engine for driving the bridge.
//!
//! Owns the shared state, runs the tracker on the caller's thread, and spawns
//! the Local Mapping and Loop Closing threads.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, bail};
use crossbeam_channel::{Receiver, bounded};
use parking_lot::Mutex;
use tracing::info;

use crate::atlas::map::KeyFrameId;
use crate::bridge::frame_store::RawImage;
use crate::config::SimulationConfig;
use crate::local_mapping::LocalMapper;
use crate::loop_closing::{DriftCorrection, LoopCloser};
use crate::tracking::{Tracker, World};

use super::engine::SlamEngine;
use super::messages::NewKeyFrameMsg;
use super::shared_state::SharedState;

/// Capacity of the keyframe channel between Tracking and Local Mapping.
/// When the channel is full, Tracking blocks briefly.
const KEYFRAME_CHANNEL_CAPACITY: usize = 5;

/// Capacity of the channel between Local Mapping and Loop Closing.
const LOOP_CHANNEL_CAPACITY: usize = 2;

/// Simulated monocular SLAM engine.
pub struct SimulatedSlam {
    /// Shared state (Atlas, signals) accessible by all threads.
    shared: Arc<SharedState>,

    tracker: Mutex<Tracker>,

    /// Local Mapping and Loop Closing threads.
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl SimulatedSlam {
    /// Create the engine and spawn its worker threads.
    pub fn new(config: &SimulationConfig) -> Result<Self> {
        config.validate()?;

        let shared = SharedState::new();
        let world = Arc::new(World::generate(config));
        let drift = DriftCorrection::new();
        info!(
            "Simulated world: {} landmarks, keyframe every {} frames",
            world.num_landmarks(),
            config.keyframe_interval
        );

        let (kf_sender, kf_receiver) = bounded::<NewKeyFrameMsg>(KEYFRAME_CHANNEL_CAPACITY);
        let (lc_sender, lc_receiver) = bounded::<KeyFrameId>(LOOP_CHANNEL_CAPACITY);

        let tracker = Tracker::new(world.clone(), config, kf_sender);
        let local_mapper = LocalMapper::new(world, drift.clone(), config, Some(lc_sender));
        let loop_closer = LoopCloser::new(shared.clone(), drift, config);

        let workers = vec![
            Self::spawn_local_mapping(shared.clone(), local_mapper, kf_receiver)?,
            Self::spawn_loop_closing(loop_closer, lc_receiver)?,
        ];

        Ok(Self {
            shared,
            tracker: Mutex::new(tracker),
            workers: Mutex::new(workers),
        })
    }

    /// Spawn the Local Mapping thread.
    fn spawn_local_mapping(
        shared: Arc<SharedState>,
        mut local_mapper: LocalMapper,
        kf_receiver: Receiver<NewKeyFrameMsg>,
    ) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("local-mapping".into())
            .spawn(move || local_mapper.run(kf_receiver, shared))
            .context("failed to spawn local mapping thread")
    }

    /// Spawn the Loop Closing thread.
    fn spawn_loop_closing(
        mut loop_closer: LoopCloser,
        lc_receiver: Receiver<KeyFrameId>,
    ) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("loop-closing".into())
            .spawn(move || loop_closer.run(lc_receiver))
            .context("failed to spawn loop closing thread")
    }

    /// Frames tracked so far.
    pub fn frames_tracked(&self) -> u64 {
        self.tracker.lock().frame_count()
    }
}

impl SlamEngine for SimulatedSlam {
    fn track_monocular(&self, image: &RawImage) -> Result<()> {
        if self.shared.is_shutdown_requested() {
            bail!("engine is shutting down");
        }
        self.tracker.lock().track(image)?;
        Ok(())
    }

    fn shared_state(&self) -> &Arc<SharedState> {
        &self.shared
    }

    /// Signal shutdown and join the worker threads.
    fn shutdown(&self) {
        self.shared.request_shutdown();

        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for handle in workers {
            if handle.join().is_err() {
                tracing::error!("SLAM worker thread panicked");
            }
        }
    }
}

impl Drop for SimulatedSlam {
    fn drop(&mut self) {
        self.shutdown();
    }
}
