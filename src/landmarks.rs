//! Hand landmark indices and per-frame observations in pixel space.

use log::debug;
use serde::Deserialize;

/// Number of keypoints the landmark model reports per hand.
pub const LANDMARK_COUNT: usize = 21;

/// Relative coordinates may overshoot the frame by this much before the hand
/// is treated as garbage.
const COORD_SLACK: f32 = 1.0;

/// The 21 hand keypoints, in the order the landmark model reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Landmark {
    Wrist = 0,
    ThumbCmc = 1,
    ThumbMcp = 2,
    ThumbIp = 3,
    ThumbTip = 4,
    IndexMcp = 5,
    IndexPip = 6,
    IndexDip = 7,
    IndexTip = 8,
    MiddleMcp = 9,
    MiddlePip = 10,
    MiddleDip = 11,
    MiddleTip = 12,
    RingMcp = 13,
    RingPip = 14,
    RingDip = 15,
    RingTip = 16,
    PinkyMcp = 17,
    PinkyPip = 18,
    PinkyDip = 19,
    PinkyTip = 20,
}

impl Landmark {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Handedness as labelled by the detector. Labels are unreliable and may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handedness {
    Left,
    Right,
    #[default]
    Unknown,
}

impl Handedness {
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("left") => Self::Left,
            Some("right") => Self::Right,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        let dx = (i64::from(other.x) - i64::from(self.x)) as f32;
        let dy = (i64::from(other.y) - i64::from(self.y)) as f32;
        dx.hypot(dy)
    }
}

/// Inclusive axis-aligned box over all landmarks of a hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

impl BoundingBox {
    fn around(points: &[Point]) -> Self {
        let mut bb = BoundingBox {
            x_min: i32::MAX,
            y_min: i32::MAX,
            x_max: i32::MIN,
            y_max: i32::MIN,
        };
        for p in points {
            bb.x_min = bb.x_min.min(p.x);
            bb.y_min = bb.y_min.min(p.y);
            bb.x_max = bb.x_max.max(p.x);
            bb.y_max = bb.y_max.max(p.y);
        }
        bb
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (i64::from(self.x_min) + i64::from(self.x_max)) as f32 / 2.0,
            (i64::from(self.y_min) + i64::from(self.y_max)) as f32 / 2.0,
        )
    }
}

/// One detected hand in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct HandObservation {
    points: [Point; LANDMARK_COUNT],
    pub handedness: Handedness,
    pub bbox: BoundingBox,
}

impl HandObservation {
    pub fn new(points: [Point; LANDMARK_COUNT], handedness: Handedness) -> Self {
        let bbox = BoundingBox::around(&points);
        Self {
            points,
            handedness,
            bbox,
        }
    }

    pub fn point(&self, lm: Landmark) -> Point {
        self.points[lm.index()]
    }

    /// Euclidean pixel distance between two landmarks.
    pub fn distance(&self, a: Landmark, b: Landmark) -> f32 {
        self.point(a).distance(&self.point(b))
    }
}

/// Convert relative `[0,1]` keypoints into a pixel-space observation.
///
/// Hands with fewer than [`LANDMARK_COUNT`] points, or with a coordinate that
/// is not finite or lies far outside `[0,1]`, are dropped (returns `None`);
/// extra points beyond the 21st are ignored.
pub fn normalize(
    raw: &[(f32, f32)],
    handedness: Handedness,
    width: u32,
    height: u32,
) -> Option<HandObservation> {
    if raw.len() < LANDMARK_COUNT {
        debug!(
            "dropping hand with {} landmarks (need {LANDMARK_COUNT})",
            raw.len()
        );
        return None;
    }

    let in_range = |v: f32| v.is_finite() && (-COORD_SLACK..=1.0 + COORD_SLACK).contains(&v);
    if let Some(i) = raw[..LANDMARK_COUNT]
        .iter()
        .position(|&(rx, ry)| !in_range(rx) || !in_range(ry))
    {
        debug!("dropping hand: landmark {i} out of range {:?}", raw[i]);
        return None;
    }

    let mut points = [Point::default(); LANDMARK_COUNT];
    for (dst, &(rx, ry)) in points.iter_mut().zip(raw.iter()) {
        *dst = Point::new((rx * width as f32) as i32, (ry * height as f32) as i32);
    }
    Some(HandObservation::new(points, handedness))
}

#[cfg(test)]
pub(crate) fn hand_from_pixels(pts: &[(i32, i32)], handedness: Handedness) -> HandObservation {
    let mut points = [Point::default(); LANDMARK_COUNT];
    for (dst, &(x, y)) in points.iter_mut().zip(pts.iter()) {
        *dst = Point::new(x, y);
    }
    HandObservation::new(points, handedness)
}
