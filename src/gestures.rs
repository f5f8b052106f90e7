use crate::config::Thresholds;
use crate::fingers::FingerStates;
use crate::landmarks::{HandObservation, Landmark};
use crate::tracker::HandRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gesture {
    Move,
    LeftClick,
    RightClick,
    DoubleClick,
    ScrollUp,
    ScrollDown,
    DragToggle,
    Pinch,
    VolumeAdjust,
    BrightnessAdjust,
    TabChange,
    CloseTab,
    Minimize,
    Maximize,
    Screenshot,
    None,
}

impl Gesture {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::LeftClick => "left-click",
            Self::RightClick => "right-click",
            Self::DoubleClick => "double-click",
            Self::ScrollUp => "scroll-up",
            Self::ScrollDown => "scroll-down",
            Self::DragToggle => "drag-toggle",
            Self::Pinch => "pinch",
            Self::VolumeAdjust => "volume",
            Self::BrightnessAdjust => "brightness",
            Self::TabChange => "tab-change",
            Self::CloseTab => "close-tab",
            Self::Minimize => "minimize",
            Self::Maximize => "maximize",
            Self::Screenshot => "screenshot",
            Self::None => "none",
        }
    }

    /// Key into the profile's `bindings` table. Only discrete, debounced
    /// gestures are bound; continuous ones are wired directly.
    pub fn binding_key(&self) -> Option<&'static str> {
        Some(match self {
            Self::LeftClick => "click.left",
            Self::RightClick => "click.right",
            Self::DoubleClick => "click.double",
            Self::TabChange => "tab.next",
            Self::CloseTab => "tab.close",
            Self::Minimize => "window.minimize",
            Self::Maximize => "window.maximize",
            Self::Screenshot => "screenshot",
            _ => return None,
        })
    }

    pub fn is_discrete(&self) -> bool {
        self.binding_key().is_some()
    }

    pub const DISCRETE: [Gesture; 8] = [
        Gesture::LeftClick,
        Gesture::RightClick,
        Gesture::DoubleClick,
        Gesture::TabChange,
        Gesture::CloseTab,
        Gesture::Minimize,
        Gesture::Maximize,
        Gesture::Screenshot,
    ];
}

/// Auxiliary fingertip separations (pixels) used to split near-identical postures.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Distances {
    pub thumb_index: Option<f32>,
    pub index_middle: Option<f32>,
    pub thumb_pinky: Option<f32>,
}

impl Distances {
    pub fn measure(hand: &HandObservation) -> Self {
        Self {
            thumb_index: Some(hand.distance(Landmark::ThumbTip, Landmark::IndexTip)),
            index_middle: Some(hand.distance(Landmark::IndexTip, Landmark::MiddleTip)),
            thumb_pinky: Some(hand.distance(Landmark::ThumbTip, Landmark::PinkyTip)),
        }
    }
}

/// Map a finger-state vector to a gesture. Pure: jitter suppression happens later.
///
/// The primary hand drives the pointer; the secondary hand carries system
/// controls (volume, brightness, window and tab commands).
pub fn classify(role: HandRole, fingers: FingerStates, d: &Distances, th: &Thresholds) -> Gesture {
    match role {
        HandRole::Primary => match fingers.bits() {
            [0, 1, 0, 0, 0] => Gesture::Move,
            [0, 1, 1, 0, 0] => match d.index_middle {
                Some(dist) if dist < th.click_near => Gesture::LeftClick,
                Some(dist) if dist > th.click_far => Gesture::DoubleClick,
                // dead zone between near and far
                _ => Gesture::None,
            },
            [1, 1, 0, 0, 0] => Gesture::Pinch,
            [0, 0, 0, 1, 0] => Gesture::ScrollUp,
            [0, 0, 0, 1, 1] => Gesture::ScrollDown,
            [1, 1, 1, 1, 1] => Gesture::Screenshot,
            _ => Gesture::None,
        },
        HandRole::Secondary => match fingers.bits() {
            [1, 1, 1, 0, 0] => Gesture::VolumeAdjust,
            [0, 0, 0, 0, 1] => Gesture::BrightnessAdjust,
            [1, 1, 1, 1, 1] => Gesture::Minimize,
            [0, 1, 1, 1, 1] => Gesture::Maximize,
            [1, 0, 1, 0, 1] => Gesture::CloseTab,
            [1, 0, 0, 0, 1] => Gesture::TabChange,
            _ => Gesture::None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{Handedness, LANDMARK_COUNT, hand_from_pixels};

    fn th() -> Thresholds {
        Thresholds {
            click_near: 30.0,
            click_far: 50.0,
            ..Thresholds::default()
        }
    }

    fn with_index_middle(dist: f32) -> Distances {
        Distances {
            index_middle: Some(dist),
            ..Distances::default()
        }
    }

    #[test]
    fn test_move() {
        let g = classify(
            HandRole::Primary,
            FingerStates::from_bits([0, 1, 0, 0, 0]),
            &Distances::default(),
            &th(),
        );
        assert_eq!(g, Gesture::Move);
    }

    #[test]
    fn test_click_near_far_and_dead_zone() {
        let fs = FingerStates::from_bits([0, 1, 1, 0, 0]);
        let t = th();
        assert_eq!(
            classify(HandRole::Primary, fs, &with_index_middle(10.0), &t),
            Gesture::LeftClick
        );
        assert_eq!(
            classify(HandRole::Primary, fs, &with_index_middle(80.0), &t),
            Gesture::DoubleClick
        );
        assert_eq!(
            classify(HandRole::Primary, fs, &with_index_middle(40.0), &t),
            Gesture::None
        );
        // boundaries belong to the dead zone
        assert_eq!(
            classify(HandRole::Primary, fs, &with_index_middle(30.0), &t),
            Gesture::None
        );
        assert_eq!(
            classify(HandRole::Primary, fs, &with_index_middle(50.0), &t),
            Gesture::None
        );
    }

    #[test]
    fn test_click_without_distance_is_none() {
        let fs = FingerStates::from_bits([0, 1, 1, 0, 0]);
        assert_eq!(
            classify(HandRole::Primary, fs, &Distances::default(), &th()),
            Gesture::None
        );
    }

    #[test]
    fn test_role_tables_differ() {
        let open = FingerStates::from_bits([1, 1, 1, 1, 1]);
        let d = Distances::default();
        assert_eq!(classify(HandRole::Primary, open, &d, &th()), Gesture::Screenshot);
        assert_eq!(classify(HandRole::Secondary, open, &d, &th()), Gesture::Minimize);

        let index_only = FingerStates::from_bits([0, 1, 0, 0, 0]);
        assert_eq!(classify(HandRole::Secondary, index_only, &d, &th()), Gesture::None);
    }

    #[test]
    fn test_secondary_table() {
        let d = Distances::default();
        let cases = [
            ([1, 1, 1, 0, 0], Gesture::VolumeAdjust),
            ([0, 0, 0, 0, 1], Gesture::BrightnessAdjust),
            ([0, 1, 1, 1, 1], Gesture::Maximize),
            ([1, 0, 1, 0, 1], Gesture::CloseTab),
            ([1, 0, 0, 0, 1], Gesture::TabChange),
        ];
        for (bits, want) in cases {
            let got = classify(HandRole::Secondary, FingerStates::from_bits(bits), &d, &th());
            assert_eq!(got, want, "bits {bits:?}");
        }
    }

    #[test]
    fn test_unmatched_vectors_are_none() {
        let primary = [
            [0, 1, 0, 0, 0],
            [0, 1, 1, 0, 0],
            [1, 1, 0, 0, 0],
            [0, 0, 0, 1, 0],
            [0, 0, 0, 1, 1],
            [1, 1, 1, 1, 1],
        ];
        let secondary = [
            [1, 1, 1, 0, 0],
            [0, 0, 0, 0, 1],
            [1, 1, 1, 1, 1],
            [0, 1, 1, 1, 1],
            [1, 0, 1, 0, 1],
            [1, 0, 0, 0, 1],
        ];
        let d = Distances {
            thumb_index: Some(100.0),
            index_middle: Some(100.0),
            thumb_pinky: Some(100.0),
        };
        for n in 0u8..32 {
            let bits = [n & 1, (n >> 1) & 1, (n >> 2) & 1, (n >> 3) & 1, (n >> 4) & 1];
            let fs = FingerStates::from_bits(bits);
            if !primary.contains(&bits) {
                assert_eq!(classify(HandRole::Primary, fs, &d, &th()), Gesture::None);
            }
            if !secondary.contains(&bits) {
                assert_eq!(classify(HandRole::Secondary, fs, &d, &th()), Gesture::None);
            }
        }
    }

    #[test]
    fn test_classification_is_pure() {
        let fs = FingerStates::from_bits([0, 1, 1, 0, 0]);
        let d = with_index_middle(12.5);
        let first = classify(HandRole::Primary, fs, &d, &th());
        for _ in 0..100 {
            assert_eq!(classify(HandRole::Primary, fs, &d, &th()), first);
        }
    }

    #[test]
    fn test_measure_distances() {
        let mut pts = vec![(0, 0); LANDMARK_COUNT];
        pts[Landmark::ThumbTip.index()] = (0, 0);
        pts[Landmark::IndexTip.index()] = (30, 40);
        pts[Landmark::MiddleTip.index()] = (30, 50);
        pts[Landmark::PinkyTip.index()] = (0, 20);
        let hand = hand_from_pixels(&pts, Handedness::Right);
        let d = Distances::measure(&hand);
        assert_eq!(d.thumb_index, Some(50.0));
        assert_eq!(d.index_middle, Some(10.0));
        assert_eq!(d.thumb_pinky, Some(20.0));
    }

    #[test]
    fn test_binding_keys_only_for_discrete() {
        for g in Gesture::DISCRETE {
            assert!(g.is_discrete(), "{}", g.as_str());
        }
        assert!(!Gesture::Move.is_discrete());
        assert!(!Gesture::VolumeAdjust.is_discrete());
        assert!(!Gesture::ScrollUp.is_discrete());
        assert!(!Gesture::DragToggle.is_discrete());
    }
}
