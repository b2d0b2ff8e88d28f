//! Publication scheduler.
//!
//! A single background thread wakes at a fixed cadence, consumes at most one
//! map-change signal and runs the matching pass:
//!
//! ```text
//!            correction finished              one pass
//!   Idle ─────────────────────────▶ FullRepublish ───────▶ Idle
//!    │       new keyframe                 one pass
//!    ├────────────────────────────▶ Incremental ─────────▶ Idle
//!    │       shutdown
//!    └────────────────────────────▶ Stopped
//! ```
//!
//! A shutdown requested while a pass is running lets that pass finish
//! (Draining) and then stops; no further pass is started. The wait between
//! passes is a ticker selected against a shutdown channel, so the thread
//! sleeps instead of spinning and wakes at once on shutdown.
//!
//! All map state is copied out under the atlas lock before any publish call.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded, select, tick};
use tracing::{debug, info, trace};

use crate::atlas::map::KeyFrameId;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::system::SharedState;
use crate::system::messages::{ImageRecord, KeyframeUpdate, OutboundRecord};

use super::frame_store::RawFrameStore;
use super::landmarks::LandmarkDeduplicator;
use super::monitor::{EventMonitor, MapEvent};
use super::pose::{PoseChangeFilter, serialize_pose};
use super::sink::PublishSink;
use super::snapshot::{KeyFrameSnapshot, capture_keyframe, capture_valid_poses};

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Incremental,
    FullRepublish,
    /// Shutdown was requested during a pass; the pass has completed.
    Draining,
    Stopped,
}

/// What one call to [`Scheduler::run_once`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// No signal was pending.
    Idle,

    /// Published data for one new keyframe.
    Incremental {
        keyframe_id: KeyFrameId,
        pose_published: bool,
        image_published: bool,
        new_landmarks: usize,
    },

    /// The signalled keyframe was missing or bad; nothing was published.
    Skipped(KeyFrameId),

    /// Republished every valid keyframe pose.
    FullRepublish { poses: usize },

    /// The scheduler is stopping and starts no new pass.
    Stopped,
}

/// Counters over the scheduler's lifetime.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SchedulerStats {
    pub incremental_passes: usize,
    pub full_republishes: usize,
    pub skipped_keyframes: usize,
    pub poses_published: usize,
    pub images_published: usize,
    pub clouds_published: usize,
    pub landmarks_published: usize,
}

/// Returned when the scheduler thread stops.
#[derive(Debug)]
pub struct SchedulerReport {
    pub stats: SchedulerStats,

    /// Final dedup state, including the color of every published landmark.
    pub landmarks: LandmarkDeduplicator,
}

/// Decides between incremental publication and full republish.
pub struct Scheduler {
    shared: Arc<SharedState>,
    monitor: EventMonitor,
    frames: Arc<RawFrameStore>,
    landmarks: LandmarkDeduplicator,
    pose_filter: PoseChangeFilter,
    sink: Box<dyn PublishSink>,
    state: SchedulerState,
    stats: SchedulerStats,
    stop: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(
        shared: Arc<SharedState>,
        frames: Arc<RawFrameStore>,
        sink: Box<dyn PublishSink>,
        config: &BridgeConfig,
    ) -> Self {
        Self {
            monitor: EventMonitor::new(shared.clone()),
            shared,
            frames,
            landmarks: LandmarkDeduplicator::new(),
            pose_filter: PoseChangeFilter::new(config.pose_change_tolerance),
            sink,
            state: SchedulerState::Idle,
            stats: SchedulerStats::default(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn landmarks(&self) -> &LandmarkDeduplicator {
        &self.landmarks
    }

    /// Flag checked at the end of each pass; setting it stops the scheduler.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Run at most one publication pass.
    pub fn run_once(&mut self) -> PassOutcome {
        if matches!(self.state, SchedulerState::Draining | SchedulerState::Stopped) {
            return PassOutcome::Stopped;
        }
        if self.stop.load(Ordering::SeqCst) {
            self.transition(SchedulerState::Stopped);
            return PassOutcome::Stopped;
        }

        match self.monitor.poll() {
            Some(MapEvent::CorrectionFinished) => self.full_republish_pass(),
            Some(MapEvent::NewKeyFrame(kf_id)) => self.incremental_pass(kf_id),
            None => PassOutcome::Idle,
        }
    }

    /// Publish the latest keyframe: pose, paired image, new landmarks.
    fn incremental_pass(&mut self, kf_id: KeyFrameId) -> PassOutcome {
        self.transition(SchedulerState::Incremental);

        let outcome = match capture_keyframe(&self.shared, kf_id) {
            Some(snapshot) if !snapshot.is_bad => {
                let update = self.build_update(&snapshot);
                let outcome = PassOutcome::Incremental {
                    keyframe_id: kf_id,
                    pose_published: update.pose.is_some(),
                    image_published: update.image.is_some(),
                    new_landmarks: update.cloud.points.len(),
                };
                for record in update.into_records() {
                    self.publish(record);
                }
                self.stats.incremental_passes += 1;
                outcome
            }
            Some(_) => {
                debug!("{} was culled before publication; skipping", kf_id);
                self.stats.skipped_keyframes += 1;
                PassOutcome::Skipped(kf_id)
            }
            None => {
                debug!("{} not found in the map; skipping", kf_id);
                self.stats.skipped_keyframes += 1;
                PassOutcome::Skipped(kf_id)
            }
        };

        self.finish_pass();
        outcome
    }

    /// Assemble everything an incremental pass emits for `snapshot`.
    ///
    /// Prunes frames older than the paired one and marks the emitted
    /// landmarks as published.
    pub fn build_update(&mut self, snapshot: &KeyFrameSnapshot) -> KeyframeUpdate {
        let pose = serialize_pose(snapshot);
        let pose = self.pose_filter.should_publish(&pose).then_some(pose);

        let image = self.frames.nearest_and_prune(snapshot.timestamp_ns);
        let cloud = self.landmarks.extract(snapshot, image.as_deref());

        KeyframeUpdate {
            keyframe_id: snapshot.id,
            pose,
            image: image.map(|image| ImageRecord {
                keyframe_id: snapshot.id.frame_id(),
                image,
            }),
            cloud,
        }
    }

    /// Republish the pose of every valid keyframe, ascending by id.
    fn full_republish_pass(&mut self) -> PassOutcome {
        self.transition(SchedulerState::FullRepublish);

        let snapshots = capture_valid_poses(&self.shared);
        for snapshot in &snapshots {
            let record = serialize_pose(snapshot);
            self.pose_filter.record_published(&record);
            self.publish(OutboundRecord::Pose(record));
        }
        self.stats.full_republishes += 1;
        info!("Map corrected: republished {} keyframe poses", snapshots.len());

        self.finish_pass();
        PassOutcome::FullRepublish {
            poses: snapshots.len(),
        }
    }

    fn publish(&mut self, record: OutboundRecord) {
        match &record {
            OutboundRecord::Pose(_) => self.stats.poses_published += 1,
            OutboundRecord::Image(_) => self.stats.images_published += 1,
            OutboundRecord::PointCloud(cloud) => {
                self.stats.clouds_published += 1;
                self.stats.landmarks_published += cloud.points.len();
            }
        }
        self.sink.publish(record.channel(), record);
    }

    fn finish_pass(&mut self) {
        if self.stop.load(Ordering::SeqCst) {
            self.transition(SchedulerState::Draining);
        } else {
            self.transition(SchedulerState::Idle);
        }
    }

    fn transition(&mut self, next: SchedulerState) {
        if self.state != next {
            trace!("Scheduler {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    /// Loop at `period` until shutdown.
    fn run(mut self, period: Duration, shutdown: Receiver<()>) -> SchedulerReport {
        info!(
            "Publication scheduler started ({:.1} Hz)",
            1.0 / period.as_secs_f64()
        );
        let ticker = tick(period);

        loop {
            select! {
                recv(ticker) -> _ => {
                    if self.run_once() == PassOutcome::Stopped
                        || self.stop.load(Ordering::SeqCst)
                    {
                        break;
                    }
                }
                recv(shutdown) -> _ => break,
            }
        }

        self.transition(SchedulerState::Stopped);
        info!(
            "Publication scheduler stopped. Stats: incremental={}, full={}, skipped={}, \
             poses={}, images={}, landmarks={}",
            self.stats.incremental_passes,
            self.stats.full_republishes,
            self.stats.skipped_keyframes,
            self.stats.poses_published,
            self.stats.images_published,
            self.stats.landmarks_published
        );

        SchedulerReport {
            stats: self.stats,
            landmarks: self.landmarks,
        }
    }

    /// Move the scheduler onto its own thread.
    pub fn spawn(self, period: Duration) -> Result<SchedulerHandle> {
        let stop = self.stop.clone();
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let handle = thread::Builder::new()
            .name("publisher".into())
            .spawn(move || self.run(period, shutdown_rx))?;

        Ok(SchedulerHandle {
            handle,
            stop,
            shutdown_tx: Some(shutdown_tx),
        })
    }
}

/// Owner of the running scheduler thread.
pub struct SchedulerHandle {
    handle: JoinHandle<SchedulerReport>,
    stop: Arc<AtomicBool>,
    shutdown_tx: Option<Sender<()>>,
}

impl SchedulerHandle {
    /// Stop after the in-flight pass, if any, and wait for the thread.
    pub fn shutdown(mut self) -> Result<SchedulerReport> {
        self.stop.store(true, Ordering::SeqCst);
        // Disconnecting the channel wakes the thread out of its wait.
        drop(self.shutdown_tx.take());
        self.handle
            .join()
            .map_err(|_| BridgeError::ThreadPanicked("publisher"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::map::{KeyFrame, KeyPoint, MapPointId};
    use crate::bridge::frame_store::RawImage;
    use crate::bridge::sink::{ChannelSink, Publication};
    use crate::geometry::SE3;
    use crate::system::messages::Channel;
    use nalgebra::{UnitQuaternion, Vector3};
    use std::sync::OnceLock;
    use std::time::Instant;

    struct Fixture {
        shared: Arc<SharedState>,
        frames: Arc<RawFrameStore>,
        scheduler: Scheduler,
        rx: Receiver<Publication>,
    }

    fn fixture() -> Fixture {
        let shared = SharedState::new();
        let frames = Arc::new(RawFrameStore::new(4));
        let (sink, rx) = ChannelSink::new();
        let scheduler = Scheduler::new(
            shared.clone(),
            frames.clone(),
            Box::new(sink),
            &BridgeConfig::default(),
        );
        Fixture {
            shared,
            frames,
            scheduler,
            rx,
        }
    }

    /// Insert a keyframe at `ts` observing `landmarks` (created if missing),
    /// keypoint i at pixel (i, 0).
    fn add_keyframe(shared: &SharedState, ts: u64, landmarks: &[u64]) -> KeyFrameId {
        let mut atlas = shared.atlas.write();
        let map = atlas.active_map_mut();
        let keypoints = (0..landmarks.len())
            .map(|i| KeyPoint::new(i as f32, 0.0))
            .collect();
        let kf_id = map.create_keyframe(ts, SE3::identity(), keypoints);
        for (idx, &lm) in landmarks.iter().enumerate() {
            let mp_id = MapPointId(lm);
            while map.get_map_point(mp_id).is_none() {
                map.create_map_point(Vector3::new(lm as f64, 0.0, 1.0), kf_id);
            }
            map.associate(kf_id, idx, mp_id);
        }
        kf_id
    }

    fn gray_frame(ts: u64) -> Arc<RawImage> {
        Arc::new(RawImage::from_gray8(ts, 8, 8, &[128; 64]).unwrap())
    }

    fn drain(rx: &Receiver<Publication>) -> Vec<Publication> {
        rx.try_iter().collect()
    }

    #[test]
    fn test_idle_without_signals() {
        let mut f = fixture();
        assert_eq!(f.scheduler.run_once(), PassOutcome::Idle);
        assert_eq!(f.scheduler.state(), SchedulerState::Idle);
        assert!(drain(&f.rx).is_empty());
    }

    #[test]
    fn test_incremental_pass_publishes_pose_image_cloud_in_order() {
        let mut f = fixture();
        f.frames.store(gray_frame(1_000));
        let kf_id = add_keyframe(&f.shared, 1_000, &[0, 1, 2]);
        f.shared.signal_new_keyframe(kf_id);

        let outcome = f.scheduler.run_once();
        assert_eq!(
            outcome,
            PassOutcome::Incremental {
                keyframe_id: kf_id,
                pose_published: true,
                image_published: true,
                new_landmarks: 3,
            }
        );

        let published = drain(&f.rx);
        let channels: Vec<Channel> = published.iter().map(|p| p.channel).collect();
        assert_eq!(channels, vec![Channel::Pose, Channel::Image, Channel::PointCloud]);
        match &published[2].record {
            OutboundRecord::PointCloud(cloud) => {
                assert_eq!(cloud.frame_id, kf_id.frame_id());
                assert!(cloud.points.iter().all(|p| p.color == Some([128, 128, 128])));
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_signal_triggers_exactly_one_pass() {
        let mut f = fixture();
        f.frames.store(gray_frame(0));
        let kf_id = add_keyframe(&f.shared, 0, &[0]);
        f.shared.signal_new_keyframe(kf_id);

        assert!(matches!(f.scheduler.run_once(), PassOutcome::Incremental { .. }));
        for _ in 0..5 {
            assert_eq!(f.scheduler.run_once(), PassOutcome::Idle);
        }
        assert_eq!(f.scheduler.stats().incremental_passes, 1);
        assert_eq!(f.scheduler.stats().poses_published, 1);
    }

    #[test]
    fn test_keyframe_culled_before_pass_produces_nothing() {
        let mut f = fixture();
        f.frames.store(gray_frame(0));
        let kf_id = add_keyframe(&f.shared, 0, &[0, 1]);
        f.shared.signal_new_keyframe(kf_id);
        f.shared.atlas.write().active_map_mut().set_keyframe_bad(kf_id);

        assert_eq!(f.scheduler.run_once(), PassOutcome::Skipped(kf_id));
        assert!(drain(&f.rx).is_empty());

        // Nor does it reappear in a later full republish.
        f.shared.signal_correction_finished();
        assert_eq!(f.scheduler.run_once(), PassOutcome::FullRepublish { poses: 0 });
        assert!(drain(&f.rx).is_empty());
    }

    #[test]
    fn test_full_republish_orders_valid_keyframes() {
        let mut f = fixture();
        {
            let mut atlas = f.shared.atlas.write();
            let map = atlas.active_map_mut();
            for id in [3u64, 1, 2] {
                let pose = SE3::new(UnitQuaternion::identity(), Vector3::new(id as f64, 0.0, 0.0));
                map.add_keyframe(KeyFrame::new(KeyFrameId(id), id, pose, vec![]));
            }
            map.set_keyframe_bad(KeyFrameId(2));
        }
        f.frames.store(gray_frame(0));
        f.shared.signal_correction_finished();

        assert_eq!(f.scheduler.run_once(), PassOutcome::FullRepublish { poses: 2 });

        let frames: Vec<String> = drain(&f.rx)
            .into_iter()
            .map(|p| match p.record {
                OutboundRecord::Pose(pose) => pose.frame_id,
                other => panic!("full republish emitted {:?}", other),
            })
            .collect();
        assert_eq!(frames, vec!["1", "3"]);
    }

    #[test]
    fn test_correction_preempts_pending_keyframe() {
        let mut f = fixture();
        f.frames.store(gray_frame(0));
        let kf_id = add_keyframe(&f.shared, 0, &[5]);
        f.shared.signal_new_keyframe(kf_id);
        f.shared.signal_correction_finished();

        assert_eq!(f.scheduler.run_once(), PassOutcome::FullRepublish { poses: 1 });
        assert!(matches!(
            f.scheduler.run_once(),
            PassOutcome::Incremental { new_landmarks: 1, .. }
        ));
        assert_eq!(f.scheduler.run_once(), PassOutcome::Idle);
    }

    #[test]
    fn test_overlapping_keyframes_emit_each_landmark_once() {
        let mut f = fixture();
        let mut emitted = Vec::new();
        for (ts, set) in [(10u64, [0u64, 1]), (20, [1, 2]), (30, [2, 3])] {
            f.frames.store(gray_frame(ts));
            let kf_id = add_keyframe(&f.shared, ts, &set);
            f.shared.signal_new_keyframe(kf_id);
            f.scheduler.run_once();
            for p in drain(&f.rx) {
                if let OutboundRecord::PointCloud(cloud) = p.record {
                    emitted.extend(cloud.points.iter().map(|pt| pt.x as u64));
                }
            }
        }
        assert_eq!(emitted, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_reprocessing_same_keyframe_is_idempotent() {
        let mut f = fixture();
        f.frames.store(gray_frame(0));
        let kf_id = add_keyframe(&f.shared, 0, &[0, 1]);
        let snapshot = capture_keyframe(&f.shared, kf_id).unwrap();

        let first = f.scheduler.build_update(&snapshot);
        f.frames.store(gray_frame(0));
        let second = f.scheduler.build_update(&snapshot);

        assert_eq!(first.cloud.points.len(), 2);
        assert!(second.cloud.is_empty());
        // Same keyframe, same pose: suppressed by the change filter.
        assert!(second.pose.is_none());
    }

    #[test]
    fn test_missing_image_still_publishes_pose() {
        let mut f = fixture();
        let kf_id = add_keyframe(&f.shared, 0, &[0]);
        f.shared.signal_new_keyframe(kf_id);

        assert_eq!(
            f.scheduler.run_once(),
            PassOutcome::Incremental {
                keyframe_id: kf_id,
                pose_published: true,
                image_published: false,
                new_landmarks: 0,
            }
        );
        let channels: Vec<Channel> = drain(&f.rx).iter().map(|p| p.channel).collect();
        assert_eq!(channels, vec![Channel::Pose]);
        assert!(!f.scheduler.landmarks().is_published(MapPointId(0)));
    }

    #[test]
    fn test_stop_flag_prevents_new_passes() {
        let mut f = fixture();
        let kf_id = add_keyframe(&f.shared, 0, &[]);
        f.shared.signal_new_keyframe(kf_id);
        f.scheduler.stop_flag().store(true, Ordering::SeqCst);

        assert_eq!(f.scheduler.run_once(), PassOutcome::Stopped);
        assert_eq!(f.scheduler.state(), SchedulerState::Stopped);
        assert!(drain(&f.rx).is_empty());
    }

    /// Forwards to a channel and raises the stop flag on the first record.
    struct StopOnFirstPublish {
        inner: ChannelSink,
        stop: Arc<OnceLock<Arc<AtomicBool>>>,
    }

    impl PublishSink for StopOnFirstPublish {
        fn publish(&mut self, channel: Channel, record: OutboundRecord) {
            if let Some(stop) = self.stop.get() {
                stop.store(true, Ordering::SeqCst);
            }
            self.inner.publish(channel, record);
        }
    }

    #[test]
    fn test_stop_during_pass_drains_before_stopping() {
        let shared = SharedState::new();
        let frames = Arc::new(RawFrameStore::new(4));
        let (inner, rx) = ChannelSink::new();
        let stop_slot = Arc::new(OnceLock::new());
        let sink = StopOnFirstPublish {
            inner,
            stop: stop_slot.clone(),
        };
        let mut scheduler = Scheduler::new(
            shared.clone(),
            frames.clone(),
            Box::new(sink),
            &BridgeConfig::default(),
        );
        assert!(stop_slot.set(scheduler.stop_flag()).is_ok());

        frames.store(gray_frame(0));
        let kf_id = add_keyframe(&shared, 0, &[0, 1]);
        shared.signal_new_keyframe(kf_id);

        assert_eq!(
            scheduler.run_once(),
            PassOutcome::Incremental {
                keyframe_id: kf_id,
                pose_published: true,
                image_published: true,
                new_landmarks: 2,
            }
        );
        let channels: Vec<Channel> = drain(&rx).iter().map(|p| p.channel).collect();
        assert_eq!(channels, vec![Channel::Pose, Channel::Image, Channel::PointCloud]);
        assert_eq!(scheduler.state(), SchedulerState::Draining);

        let next = add_keyframe(&shared, 10, &[2]);
        shared.signal_new_keyframe(next);
        assert_eq!(scheduler.run_once(), PassOutcome::Stopped);
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn test_spawned_scheduler_publishes_and_stops() {
        let f = fixture();
        f.frames.store(gray_frame(0));
        let kf_id = add_keyframe(&f.shared, 0, &[0]);

        let handle = f.scheduler.spawn(Duration::from_millis(5)).unwrap();
        f.shared.signal_new_keyframe(kf_id);

        let first = f.rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first.channel, Channel::Pose);

        let started = Instant::now();
        let report = handle.shutdown().unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(report.stats.incremental_passes, 1);
        assert!(report.landmarks.is_published(MapPointId(0)));
    }
}
