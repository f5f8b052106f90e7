//! Cross-frame jitter suppression: per-gesture cooldowns and the drag latch.

use log::debug;
use std::collections::HashMap;

use crate::gestures::Gesture;

/// Interval-gated repetition for discrete gestures.
///
/// A held posture fires once, then again only after its cooldown elapses.
/// Intermediate frames classified as something else do not reset the timer.
#[derive(Debug, Default, Clone)]
pub struct Debouncer {
    expiry_ms: HashMap<Gesture, u64>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` and arms the cooldown if `gesture` may fire at `now_ms`.
    pub fn try_fire(&mut self, gesture: Gesture, interval_ms: u64, now_ms: u64) -> bool {
        if let Some(&until) = self.expiry_ms.get(&gesture) {
            if now_ms < until {
                return false;
            }
        }
        self.expiry_ms
            .insert(gesture, now_ms.saturating_add(interval_ms));
        true
    }

    /// Milliseconds until `gesture` may fire again, if it is cooling down.
    pub fn remaining(&self, gesture: Gesture, now_ms: u64) -> Option<u64> {
        self.expiry_ms
            .get(&gesture)
            .filter(|&&until| now_ms < until)
            .map(|&until| until - now_ms)
    }

    pub fn reset(&mut self) {
        self.expiry_ms.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DragState {
    #[default]
    Released,
    Dragging,
}

/// Edge emitted by the latch on a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragPhase {
    Begin,
    End,
}

/// Two-threshold latch on the thumb/index pinch distance.
///
/// Engages below `engage`, releases only above `release` (`engage < release`),
/// so a distance hovering around either cutoff cannot toggle every frame.
#[derive(Debug, Clone, Default)]
pub struct DragLatch {
    state: DragState,
}

impl DragLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dragging(&self) -> bool {
        self.state == DragState::Dragging
    }

    pub fn update(&mut self, distance: f32, engage: f32, release: f32) -> Option<DragPhase> {
        match self.state {
            DragState::Released if distance < engage => {
                debug!("drag engaged at {distance:.1}px");
                self.state = DragState::Dragging;
                Some(DragPhase::Begin)
            }
            DragState::Dragging if distance > release => {
                debug!("drag released at {distance:.1}px");
                self.state = DragState::Released;
                Some(DragPhase::End)
            }
            _ => None,
        }
    }

    /// Drop out of `Dragging` regardless of distance (e.g. the hand vanished).
    pub fn force_release(&mut self) -> Option<DragPhase> {
        if self.is_dragging() {
            self.state = DragState::Released;
            Some(DragPhase::End)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drag_hysteresis_sequence() {
        let mut latch = DragLatch::new();
        let seq = [70.0, 35.0, 45.0, 65.0];
        let edges: Vec<_> = seq.iter().map(|&d| latch.update(d, 40.0, 60.0)).collect();
        assert_eq!(
            edges,
            vec![None, Some(DragPhase::Begin), None, Some(DragPhase::End)]
        );
        assert!(!latch.is_dragging());
    }

    #[test]
    fn test_drag_begin_emitted_once() {
        let mut latch = DragLatch::new();
        assert_eq!(latch.update(10.0, 40.0, 60.0), Some(DragPhase::Begin));
        for d in [5.0, 20.0, 39.0, 55.0, 60.0] {
            assert_eq!(latch.update(d, 40.0, 60.0), None);
            assert!(latch.is_dragging());
        }
        assert_eq!(latch.update(61.0, 40.0, 60.0), Some(DragPhase::End));
        assert_eq!(latch.update(80.0, 40.0, 60.0), None);
    }

    #[test]
    fn test_oscillation_near_cutoff_does_not_flap() {
        let mut latch = DragLatch::new();
        latch.update(30.0, 40.0, 60.0);
        let flips = [39.0, 41.0, 39.0, 41.0, 59.0, 58.0]
            .iter()
            .filter_map(|&d| latch.update(d, 40.0, 60.0))
            .count();
        assert_eq!(flips, 0);
    }

    #[test]
    fn test_force_release() {
        let mut latch = DragLatch::new();
        assert_eq!(latch.force_release(), None);
        latch.update(0.0, 40.0, 60.0);
        assert_eq!(latch.force_release(), Some(DragPhase::End));
        assert!(!latch.is_dragging());
    }

    #[test]
    fn test_debounce_single_fire_within_cooldown() {
        let mut d = Debouncer::new();
        let fired = (0..=250)
            .step_by(10)
            .filter(|&t| d.try_fire(Gesture::LeftClick, 300, t))
            .count();
        assert_eq!(fired, 1);
        assert!(d.try_fire(Gesture::LeftClick, 300, 310));
    }

    #[test]
    fn test_debounce_inclusive_expiry() {
        let mut d = Debouncer::new();
        assert!(d.try_fire(Gesture::Screenshot, 500, 1000));
        assert!(!d.try_fire(Gesture::Screenshot, 500, 1499));
        assert!(d.try_fire(Gesture::Screenshot, 500, 1500));
    }

    #[test]
    fn test_debounce_is_per_gesture() {
        let mut d = Debouncer::new();
        assert!(d.try_fire(Gesture::CloseTab, 300, 0));
        assert!(d.try_fire(Gesture::TabChange, 300, 10));
        assert!(!d.try_fire(Gesture::CloseTab, 300, 20));
        assert_eq!(d.remaining(Gesture::CloseTab, 20), Some(280));
        assert_eq!(d.remaining(Gesture::Minimize, 20), None);
    }

    #[test]
    fn test_debounce_reset() {
        let mut d = Debouncer::new();
        d.try_fire(Gesture::Minimize, 500, 0);
        d.reset();
        assert!(d.try_fire(Gesture::Minimize, 500, 1));
    }
}
