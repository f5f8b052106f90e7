//! Per-frame gesture engine: owned session state in, actions out.

use log::{debug, trace};

use crate::config::Profile;
use crate::fingers;
use crate::gestures::{self, Distances, Gesture};
use crate::hysteresis::{Debouncer, DragLatch, DragPhase};
use crate::landmarks::{HandObservation, Landmark};
use crate::smoothing::{CursorSmoother, interp};
use crate::tracker::{HandRole, RoleTracker};

/// One captured frame after normalization.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub hands: Vec<HandObservation>,
}

/// Value carried alongside a gesture to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payload {
    None,
    /// smoothed screen position
    Cursor { x: f32, y: f32 },
    /// wheel steps, positive is up
    Scroll(i32),
    /// target volume percent
    Volume(f32),
    Brightness(u8),
    Drag(DragPhase),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Action {
    pub role: HandRole,
    pub gesture: Gesture,
    pub payload: Payload,
}

impl Action {
    fn new(role: HandRole, gesture: Gesture, payload: Payload) -> Self {
        Self {
            role,
            gesture,
            payload,
        }
    }
}

/// Everything that must survive from one frame to the next.
///
/// Owned by the frame loop and handed to [`process_frame`] by `&mut`.
#[derive(Debug)]
pub struct SessionState {
    pub cursor: Option<(f32, f32)>,
    pub drag: DragLatch,
    pub cooldowns: Debouncer,
    pub roles: RoleTracker,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            cursor: None,
            drag: DragLatch::new(),
            cooldowns: Debouncer::new(),
            roles: RoleTracker::new(),
        }
    }

    /// Forget cursor history, cooldowns and hand roles. A held drag must be
    /// released by the caller first.
    pub fn reset(&mut self) {
        self.cursor = None;
        self.cooldowns.reset();
        self.roles.reset();
    }
}

/// Run one frame through extraction, classification, smoothing and the
/// debounce/drag state machines. Returns the actions to dispatch, in order.
pub fn process_frame(
    state: &mut SessionState,
    profile: &Profile,
    screen: (u32, u32),
    frame: &Frame,
    now_ms: u64,
) -> Vec<Action> {
    let mut out = Vec::new();
    let roles = state
        .roles
        .assign(&frame.hands, profile.roles.policy, profile.roles.max_jump);

    if !roles.iter().any(|(r, _)| *r == HandRole::Primary) {
        // pointer hand gone: never leave the button held down
        if let Some(phase) = state.drag.force_release() {
            debug!("primary hand lost while dragging; releasing");
            out.push(Action::new(
                HandRole::Primary,
                Gesture::DragToggle,
                Payload::Drag(phase),
            ));
        }
    }

    let cx = FrameCtx {
        profile,
        screen,
        frame,
        now_ms,
    };
    for (role, idx) in roles {
        let hand = &frame.hands[idx];
        let fs = fingers::extract(hand, profile.thresholds.thumb_default);
        let d = Distances::measure(hand);
        let g = gestures::classify(role, fs, &d, &profile.thresholds);
        trace!("{} hand {fs} -> {}", role.as_str(), g.as_str());

        match role {
            HandRole::Primary => primary(state, &cx, hand, g, &d, &mut out),
            HandRole::Secondary => secondary(state, &cx, g, &d, &mut out),
        }
    }
    out
}

struct FrameCtx<'a> {
    profile: &'a Profile,
    screen: (u32, u32),
    frame: &'a Frame,
    now_ms: u64,
}

fn primary(
    state: &mut SessionState,
    cx: &FrameCtx<'_>,
    hand: &HandObservation,
    g: Gesture,
    d: &Distances,
    out: &mut Vec<Action>,
) {
    let th = &cx.profile.thresholds;
    let pinch = d.thumb_index.unwrap_or(f32::MAX);
    let smoother = CursorSmoother::from_config(&cx.profile.cursor);
    let move_cursor = |state: &mut SessionState, out: &mut Vec<Action>| {
        let tip = hand.point(Landmark::IndexTip);
        let frame_size = (cx.frame.width, cx.frame.height);
        let (x, y) = smoother.step(&mut state.cursor, tip, frame_size, cx.screen);
        out.push(Action::new(HandRole::Primary, Gesture::Move, Payload::Cursor { x, y }));
    };

    if state.drag.is_dragging() {
        // the latch follows the pinch whatever the posture is
        match state.drag.update(pinch, th.drag_engage, th.drag_release) {
            Some(phase) => out.push(Action::new(
                HandRole::Primary,
                Gesture::DragToggle,
                Payload::Drag(phase),
            )),
            None => move_cursor(state, out),
        }
        return;
    }

    match g {
        Gesture::Move => move_cursor(state, out),
        Gesture::Pinch => match state.drag.update(pinch, th.drag_engage, th.drag_release) {
            Some(phase) => out.push(Action::new(
                HandRole::Primary,
                Gesture::DragToggle,
                Payload::Drag(phase),
            )),
            None if pinch > th.drag_release => {
                fire_discrete(state, cx, HandRole::Primary, Gesture::RightClick, out)
            }
            // inside the hysteresis band
            None => {}
        },
        Gesture::ScrollUp => out.push(Action::new(
            HandRole::Primary,
            g,
            Payload::Scroll(cx.profile.controls.scroll_step),
        )),
        Gesture::ScrollDown => out.push(Action::new(
            HandRole::Primary,
            g,
            Payload::Scroll(-cx.profile.controls.scroll_step),
        )),
        g if g.is_discrete() => fire_discrete(state, cx, HandRole::Primary, g, out),
        _ => {}
    }
}

fn secondary(
    state: &mut SessionState,
    cx: &FrameCtx<'_>,
    g: Gesture,
    d: &Distances,
    out: &mut Vec<Action>,
) {
    let c = &cx.profile.controls;
    let range = (c.distance_min, c.distance_max);
    match g {
        Gesture::VolumeAdjust => {
            if let Some(dist) = d.thumb_index {
                let level = interp(dist, range, (0.0, 100.0));
                out.push(Action::new(HandRole::Secondary, g, Payload::Volume(level)));
            }
        }
        Gesture::BrightnessAdjust => {
            if let Some(dist) = d.thumb_pinky {
                let level = interp(dist, range, (0.0, 100.0)) as u8;
                out.push(Action::new(HandRole::Secondary, g, Payload::Brightness(level)));
            }
        }
        g if g.is_discrete() => fire_discrete(state, cx, HandRole::Secondary, g, out),
        _ => {}
    }
}

fn fire_discrete(
    state: &mut SessionState,
    cx: &FrameCtx<'_>,
    role: HandRole,
    g: Gesture,
    out: &mut Vec<Action>,
) {
    let Some(interval) = cx.profile.cooldowns.for_gesture(g) else {
        return;
    };
    if state.cooldowns.try_fire(g, interval, cx.now_ms) {
        out.push(Action::new(role, g, Payload::None));
    } else {
        trace!(
            "{} suppressed by cooldown ({}ms left)",
            g.as_str(),
            state.cooldowns.remaining(g, cx.now_ms).unwrap_or(0)
        );
    }
}
