//! Local Mapper - simulated Local Mapping thread.
//!
//! Processes keyframes received from Tracking:
//! 1. Inserts the keyframe into the map
//! 2. Associates matched landmarks, creating map points on first sight
//! 3. Raises the new-keyframe signal
//! 4. Culls map points and older keyframes at random
//! 5. Forwards every n-th keyframe to Loop Closing

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use tracing::{debug, info};

use crate::atlas::map::{KeyFrameId, Map, MapPointId};
use crate::config::SimulationConfig;
use crate::loop_closing::DriftCorrection;
use crate::system::messages::NewKeyFrameMsg;
use crate::system::shared_state::SharedState;
use crate::tracking::World;

/// Timeout for receiving keyframes. Allows periodic shutdown checks.
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Statistics for local mapping.
#[derive(Debug, Default, Clone)]
pub struct LocalMapperStats {
    pub keyframes_inserted: usize,
    pub map_points_created: usize,
    pub keyframes_culled: usize,
    pub map_points_culled: usize,
}

/// Local Mapping thread state.
pub struct LocalMapper {
    world: Arc<World>,
    drift: Arc<DriftCorrection>,
    rng: StdRng,

    keyframe_cull_probability: f64,
    landmark_cull_probability: f64,
    correction_interval: usize,

    /// Map point created for each world landmark index.
    landmark_ids: HashMap<usize, MapPointId>,

    /// Channel sender to Loop Closing thread.
    lc_sender: Option<Sender<KeyFrameId>>,

    pub stats: LocalMapperStats,
}

impl LocalMapper {
    pub fn new(
        world: Arc<World>,
        drift: Arc<DriftCorrection>,
        config: &SimulationConfig,
        lc_sender: Option<Sender<KeyFrameId>>,
    ) -> Self {
        Self {
            world,
            drift,
            rng: StdRng::seed_from_u64(config.seed.wrapping_add(2)),
            keyframe_cull_probability: config.keyframe_cull_probability.clamp(0.0, 1.0),
            landmark_cull_probability: config.landmark_cull_probability.clamp(0.0, 1.0),
            correction_interval: config.correction_interval,
            landmark_ids: HashMap::new(),
            lc_sender,
            stats: LocalMapperStats::default(),
        }
    }

    /// Main thread loop: receive keyframes and process them.
    ///
    /// This runs until shutdown is requested or the channel is closed.
    pub fn run(&mut self, kf_receiver: Receiver<NewKeyFrameMsg>, shared: Arc<SharedState>) {
        info!("LocalMapper thread started");

        while !shared.is_shutdown_requested() {
            match kf_receiver.recv_timeout(RECV_TIMEOUT) {
                Ok(msg) => {
                    self.process_keyframe(msg, &shared);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        info!(
            "LocalMapper thread stopped. Stats: {} keyframes, {} map points, \
             culled {} keyframes / {} map points",
            self.stats.keyframes_inserted,
            self.stats.map_points_created,
            self.stats.keyframes_culled,
            self.stats.map_points_culled
        );
    }

    /// Process a single keyframe message.
    pub fn process_keyframe(&mut self, msg: NewKeyFrameMsg, shared: &SharedState) -> KeyFrameId {
        // Step 1-2: insert and associate in one critical section, so the
        // keyframe is never visible without its landmarks.
        let kf_id = {
            let mut atlas = shared.atlas.write();
            let map = atlas.active_map_mut();
            let drift = self.drift.current();

            let kf_id =
                map.create_keyframe(msg.timestamp_ns, drift.compose(&msg.pose), msg.keypoints);
            for (feature_idx, landmark) in msg.landmark_matches.iter().enumerate() {
                let Some(landmark) = *landmark else { continue };
                if let Some(mp_id) = self.map_point_for(map, landmark, kf_id, &drift) {
                    map.associate(kf_id, feature_idx, mp_id);
                }
            }
            kf_id
        };
        self.stats.keyframes_inserted += 1;

        // Step 3
        shared.signal_new_keyframe(kf_id);
        debug!("Inserted {}", kf_id);

        // Step 4
        self.cull(kf_id, shared);

        // Step 5
        if self.correction_interval > 0
            && self.stats.keyframes_inserted % self.correction_interval == 0
        {
            if let Some(sender) = &self.lc_sender {
                match sender.try_send(kf_id) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        debug!("Loop closing busy; {} not forwarded", kf_id)
                    }
                    Err(TrySendError::Disconnected(_)) => self.lc_sender = None,
                }
            }
        }

        kf_id
    }

    /// Map point for a world landmark, created on first sight and recreated
    /// if the previous one was culled.
    fn map_point_for(
        &mut self,
        map: &mut Map,
        landmark: usize,
        kf_id: KeyFrameId,
        drift: &crate::geometry::SE3,
    ) -> Option<MapPointId> {
        if let Some(&mp_id) = self.landmark_ids.get(&landmark) {
            if map.get_map_point(mp_id).is_some_and(|mp| !mp.is_bad) {
                return Some(mp_id);
            }
        }

        let position = drift.transform_point(self.world.landmark(landmark)?);
        let mp_id = map.create_map_point(position, kf_id);
        self.landmark_ids.insert(landmark, mp_id);
        self.stats.map_points_created += 1;
        Some(mp_id)
    }

    /// Randomly cull one landmark of the new keyframe and one older keyframe.
    fn cull(&mut self, kf_id: KeyFrameId, shared: &SharedState) {
        let cull_landmark = self.rng.random_bool(self.landmark_cull_probability);
        let cull_keyframe = self.rng.random_bool(self.keyframe_cull_probability);
        if !cull_landmark && !cull_keyframe {
            return;
        }

        let mut atlas = shared.atlas.write();
        let map = atlas.active_map_mut();

        if cull_landmark {
            let matched: Vec<MapPointId> = map
                .get_keyframe(kf_id)
                .map(|kf| kf.matched_map_points().map(|(_, id)| id).collect())
                .unwrap_or_default();
            if let Some(&mp_id) = matched.choose(&mut self.rng) {
                if map.set_map_point_bad(mp_id) {
                    self.stats.map_points_culled += 1;
                    debug!("Culled {}", mp_id);
                }
            }
        }

        if cull_keyframe {
            // The first keyframe anchors the map and is never culled.
            let candidates: Vec<KeyFrameId> = map
                .keyframes()
                .filter(|kf| !kf.is_bad && kf.id != kf_id && kf.id.0 != 0)
                .map(|kf| kf.id)
                .collect();
            if let Some(&old) = candidates.choose(&mut self.rng) {
                if map.set_keyframe_bad(old) {
                    self.stats.keyframes_culled += 1;
                    debug!("Culled {}", old);
                }
            }
        }
    }
}
