//! Shared state between the engine's worker threads and the bridge.
//!
//! The `SharedState` struct holds all data that needs to be accessed by
//! multiple threads, protected by appropriate synchronization primitives.
//! The two map-change signals live together in one mutex-guarded record so
//! that a reader can observe and clear them in a single critical section.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::atlas::Atlas;
use crate::atlas::map::KeyFrameId;

/// Map-change signals raised by the engine and consumed by the bridge.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MapEvents {
    /// A keyframe was inserted since the flag was last cleared.
    pub new_keyframe: bool,

    /// Most recently inserted keyframe.
    pub last_keyframe: Option<KeyFrameId>,

    /// A global correction (loop closure / global BA) has finished and
    /// previously published poses are stale.
    pub correction_finished: bool,
}

/// Shared state accessible by engine threads and the bridge.
pub struct SharedState {
    /// The Atlas containing keyframes and map points.
    /// Protected by RwLock: mapping and loop closing write, the bridge reads.
    pub atlas: RwLock<Atlas>,

    /// Map-change signals. Always written and cleared under this lock.
    events: Mutex<MapEvents>,

    /// Request engine worker threads to finish and exit.
    shutdown_requested: AtomicBool,
}

impl SharedState {
    /// Create a new SharedState with an empty Atlas.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Raise the new-keyframe signal for `kf_id`.
    pub fn signal_new_keyframe(&self, kf_id: KeyFrameId) {
        let mut events = self.events.lock();
        events.new_keyframe = true;
        events.last_keyframe = Some(kf_id);
    }

    /// Raise the correction-finished signal.
    pub fn signal_correction_finished(&self) {
        self.events.lock().correction_finished = true;
    }

    /// Lock the map-change signals.
    ///
    /// Callers that act on a signal must clear it through the same guard.
    pub fn lock_events(&self) -> MutexGuard<'_, MapEvents> {
        self.events.lock()
    }

    /// Request shutdown of the engine worker threads.
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            atlas: RwLock::new(Atlas::new()),
            events: Mutex::new(MapEvents::default()),
            shutdown_requested: AtomicBool::new(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signals_accumulate_until_cleared() {
        let shared = SharedState::new();
        shared.signal_new_keyframe(KeyFrameId::new(1));
        shared.signal_new_keyframe(KeyFrameId::new(2));
        shared.signal_correction_finished();

        let mut events = shared.lock_events();
        assert!(events.new_keyframe);
        assert!(events.correction_finished);
        assert_eq!(events.last_keyframe, Some(KeyFrameId::new(2)));

        *events = MapEvents::default();
        drop(events);
        assert_eq!(*shared.lock_events(), MapEvents::default());
    }

    #[test]
    fn test_shutdown_flag() {
        let shared = SharedState::new();
        assert!(!shared.is_shutdown_requested());
        shared.request_shutdown();
        assert!(shared.is_shutdown_requested());
    }
}
