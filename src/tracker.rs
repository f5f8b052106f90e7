//! Per-role hand tracking across frames.

use log::debug;
use serde::Deserialize;

use crate::landmarks::HandObservation;

/// Semantic role of a detected hand: the primary hand drives the pointer,
/// the secondary hand carries system controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandRole {
    Primary,
    Secondary,
}

impl HandRole {
    pub const ALL: [HandRole; 2] = [HandRole::Primary, HandRole::Secondary];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolePolicy {
    /// First reported hand is primary, second is secondary, every frame.
    ListOrder,
    /// Match hands to last frame's roles by nearest bounding-box centre.
    #[default]
    Tracked,
}

/// Remembers where each role's hand was last seen.
#[derive(Debug, Clone, Default)]
pub struct RoleTracker {
    last_center: [Option<(f32, f32)>; 2],
}

fn dist(a: (f32, f32), b: (f32, f32)) -> f32 {
    (a.0 - b.0).hypot(a.1 - b.1)
}

impl RoleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.last_center = [None; 2];
    }

    /// Assign roles to (at most the first two) hands of a frame.
    ///
    /// Returns `(role, index into hands)` pairs, primary first.
    pub fn assign(
        &mut self,
        hands: &[HandObservation],
        policy: RolePolicy,
        max_jump: f32,
    ) -> Vec<(HandRole, usize)> {
        let n = hands.len().min(HandRole::ALL.len());
        let centers: Vec<(f32, f32)> = hands[..n].iter().map(|h| h.bbox.center()).collect();

        let mut by_role: [Option<usize>; 2] = [None; 2];

        if policy == RolePolicy::Tracked {
            let mut pairs = Vec::new();
            for role in HandRole::ALL {
                if let Some(prev) = self.last_center[role.slot()] {
                    for (i, c) in centers.iter().enumerate() {
                        let d = dist(prev, *c);
                        if d <= max_jump {
                            pairs.push((d, role, i));
                        }
                    }
                }
            }
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut taken = vec![false; n];
            for (d, role, i) in pairs {
                if by_role[role.slot()].is_none() && !taken[i] {
                    debug!("hand {i} keeps role {} (moved {d:.1}px)", role.as_str());
                    by_role[role.slot()] = Some(i);
                    taken[i] = true;
                }
            }
        }

        // whatever is left goes to free roles in list order
        for i in 0..n {
            if by_role.contains(&Some(i)) {
                continue;
            }
            if let Some(role) = HandRole::ALL.iter().find(|r| by_role[r.slot()].is_none()) {
                by_role[role.slot()] = Some(i);
            }
        }

        let mut out = Vec::with_capacity(n);
        for role in HandRole::ALL {
            self.last_center[role.slot()] = by_role[role.slot()].map(|i| centers[i]);
            if let Some(i) = by_role[role.slot()] {
                out.push((role, i));
            }
        }
        out
    }
}
