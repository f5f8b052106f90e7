//! Reduce a hand's 21 landmarks to which fingers are extended.

use serde::Deserialize;
use std::fmt;

use crate::landmarks::{HandObservation, Handedness, Landmark};

/// Extended/curled per finger, ordered `[thumb, index, middle, ring, pinky]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FingerStates(pub [bool; 5]);

impl FingerStates {
    pub fn from_bits(bits: [u8; 5]) -> Self {
        Self(bits.map(|b| b != 0))
    }

    pub fn bits(&self) -> [u8; 5] {
        self.0.map(u8::from)
    }
}

impl fmt::Display for FingerStates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.bits();
        write!(f, "[{},{},{},{},{}]", b[0], b[1], b[2], b[3], b[4])
    }
}

/// Which thumb comparison to use when the detector gives no handedness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThumbRule {
    /// Extended when the tip is right of the IP joint.
    #[default]
    Left,
    /// Extended when the tip is left of the IP joint.
    Right,
}

const TIP_PIP: [(Landmark, Landmark); 4] = [
    (Landmark::IndexTip, Landmark::IndexPip),
    (Landmark::MiddleTip, Landmark::MiddlePip),
    (Landmark::RingTip, Landmark::RingPip),
    (Landmark::PinkyTip, Landmark::PinkyPip),
];

/// Geometric, threshold-free extraction. Assumes an upright hand facing the camera.
pub fn extract(hand: &HandObservation, unknown_thumb: ThumbRule) -> FingerStates {
    let tip = hand.point(Landmark::ThumbTip);
    let ip = hand.point(Landmark::ThumbIp);
    let rule = match hand.handedness {
        Handedness::Left => ThumbRule::Left,
        Handedness::Right => ThumbRule::Right,
        Handedness::Unknown => unknown_thumb,
    };
    let thumb = match rule {
        ThumbRule::Left => tip.x > ip.x,
        ThumbRule::Right => tip.x < ip.x,
    };

    let mut out = [thumb, false, false, false, false];
    for (i, (tip, pip)) in TIP_PIP.iter().enumerate() {
        // image y grows downward
        out[i + 1] = hand.point(*tip).y < hand.point(*pip).y;
    }
    FingerStates(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{LANDMARK_COUNT, hand_from_pixels};

    /// Upright hand with every finger curled: tips level with their PIP joints,
    /// thumb tip exactly on its IP joint.
    fn curled() -> Vec<(i32, i32)> {
        vec![(100, 100); LANDMARK_COUNT]
    }

    #[test]
    fn test_all_curled() {
        let hand = hand_from_pixels(&curled(), Handedness::Right);
        assert_eq!(extract(&hand, ThumbRule::Left), FingerStates([false; 5]));
    }

    #[test]
    fn test_index_only() {
        let mut pts = curled();
        pts[Landmark::IndexTip.index()] = (100, 40);
        let hand = hand_from_pixels(&pts, Handedness::Right);
        assert_eq!(
            extract(&hand, ThumbRule::Left),
            FingerStates::from_bits([0, 1, 0, 0, 0])
        );
    }

    #[test]
    fn test_tip_below_pip_is_curled() {
        let mut pts = curled();
        pts[Landmark::MiddleTip.index()] = (100, 130);
        let hand = hand_from_pixels(&pts, Handedness::Right);
        assert!(!extract(&hand, ThumbRule::Left).0[2]);
    }

    #[test]
    fn test_thumb_mirrors_by_handedness() {
        let mut pts = curled();
        pts[Landmark::ThumbTip.index()] = (60, 100);
        let right = hand_from_pixels(&pts, Handedness::Right);
        let left = hand_from_pixels(&pts, Handedness::Left);
        assert!(extract(&right, ThumbRule::Left).0[0]);
        assert!(!extract(&left, ThumbRule::Left).0[0]);
    }

    #[test]
    fn test_thumb_unknown_uses_default() {
        let mut pts = curled();
        pts[Landmark::ThumbTip.index()] = (140, 100);
        let hand = hand_from_pixels(&pts, Handedness::Unknown);
        assert!(extract(&hand, ThumbRule::Left).0[0]);
        assert!(!extract(&hand, ThumbRule::Right).0[0]);
    }

    #[test]
    fn test_display_and_bits() {
        let fs = FingerStates::from_bits([1, 0, 1, 0, 1]);
        assert_eq!(fs.to_string(), "[1,0,1,0,1]");
        assert_eq!(fs.bits(), [1, 0, 1, 0, 1]);
    }
}
