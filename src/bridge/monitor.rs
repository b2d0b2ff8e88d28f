//! Event monitor over the engine's map-change signals.
//!
//! Signals are edge-triggered: `poll` reads and clears a signal inside one
//! critical section of the engine's event lock, so a signal raised once is
//! acted on once no matter how many pollers exist.

use std::sync::Arc;

use crate::atlas::map::KeyFrameId;
use crate::system::SharedState;

/// A consumed map-change signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapEvent {
    /// A global correction finished; every published pose may be stale.
    CorrectionFinished,

    /// A new keyframe was produced; carries the most recent one.
    NewKeyFrame(KeyFrameId),
}

/// Observes the engine's map-change signals.
pub struct EventMonitor {
    shared: Arc<SharedState>,
}

impl EventMonitor {
    pub fn new(shared: Arc<SharedState>) -> Self {
        Self { shared }
    }

    /// Whether a new keyframe is pending. Does not consume it.
    pub fn has_new_keyframe(&self) -> bool {
        self.shared.lock_events().new_keyframe
    }

    /// Whether a finished correction is pending. Does not consume it.
    pub fn correction_finished(&self) -> bool {
        self.shared.lock_events().correction_finished
    }

    /// Consume at most one pending signal.
    ///
    /// A finished correction takes priority. When both are pending only the
    /// correction is cleared; the new keyframe stays pending for the next
    /// poll so its image and landmarks still go out.
    pub fn poll(&self) -> Option<MapEvent> {
        let mut events = self.shared.lock_events();

        if events.correction_finished {
            events.correction_finished = false;
            return Some(MapEvent::CorrectionFinished);
        }

        if events.new_keyframe {
            events.new_keyframe = false;
            return events.last_keyframe.map(MapEvent::NewKeyFrame);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_keyframe_consumed_once() {
        let shared = SharedState::new();
        let monitor = EventMonitor::new(shared.clone());

        shared.signal_new_keyframe(KeyFrameId(4));
        assert!(monitor.has_new_keyframe());

        assert_eq!(monitor.poll(), Some(MapEvent::NewKeyFrame(KeyFrameId(4))));
        assert!(!monitor.has_new_keyframe());
        assert_eq!(monitor.poll(), None);
        assert_eq!(monitor.poll(), None);
    }

    #[test]
    fn test_correction_takes_priority() {
        let shared = SharedState::new();
        let monitor = EventMonitor::new(shared.clone());

        shared.signal_new_keyframe(KeyFrameId(1));
        shared.signal_correction_finished();

        assert_eq!(monitor.poll(), Some(MapEvent::CorrectionFinished));
        assert!(!monitor.correction_finished());
        assert!(monitor.has_new_keyframe());
        assert_eq!(monitor.poll(), Some(MapEvent::NewKeyFrame(KeyFrameId(1))));
        assert_eq!(monitor.poll(), None);
    }

    #[test]
    fn test_repeated_signals_collapse_to_latest() {
        let shared = SharedState::new();
        let monitor = EventMonitor::new(shared.clone());

        shared.signal_new_keyframe(KeyFrameId(1));
        shared.signal_new_keyframe(KeyFrameId(2));

        assert_eq!(monitor.poll(), Some(MapEvent::NewKeyFrame(KeyFrameId(2))));
        assert_eq!(monitor.poll(), None);
    }

    #[test]
    fn test_concurrent_pollers_act_once() {
        let shared = SharedState::new();
        shared.signal_new_keyframe(KeyFrameId(9));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let monitor = EventMonitor::new(shared.clone());
                std::thread::spawn(move || monitor.poll())
            })
            .collect();
        let fired = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .count();

        assert_eq!(fired, 1);
    }
}
