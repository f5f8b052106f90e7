use anyhow::{Result, anyhow};
use log::{debug, error, info, warn};
use std::{process::Command, thread};

use crate::actions::{InputInjector, MouseButton};
use crate::config::Profile;
use crate::controls::{BrightnessControl, ScreenshotSink, VolumeControl};
use crate::gestures::Gesture;
use crate::hysteresis::DragPhase;
use crate::session::{Action, Payload};

/// Side-effect collaborators for one pipeline. Volume and brightness are
/// optional: a missing backend turns those gestures into no-ops.
pub struct Controls {
    pub input: Box<dyn InputInjector>,
    pub volume: Option<Box<dyn VolumeControl>>,
    pub brightness: Option<Box<dyn BrightnessControl>>,
    pub screenshot: Box<dyn ScreenshotSink>,
}

/// What the frame loop should do after an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Toggle,
}

/// Dispatch a frame's actions. Failures are logged and skipped; a "toggle"
/// binding flips `enabled`, and while disabled only toggles run.
pub fn dispatch_all(actions: &[Action], profile: &Profile, ctl: &mut Controls, enabled: &mut bool) {
    for a in actions {
        if !*enabled && !is_toggle(a, profile) {
            continue;
        }
        match dispatch_action(a, profile, ctl) {
            Ok(Outcome::Toggle) => {
                *enabled = !*enabled;
                info!(
                    "gesture control {} by {}",
                    if *enabled { "enabled" } else { "paused" },
                    a.gesture.as_str()
                );
            }
            Ok(Outcome::Done) => {}
            Err(e) => error!("dispatch {} failed: {e}", a.gesture.as_str()),
        }
    }
}

fn is_toggle(a: &Action, profile: &Profile) -> bool {
    profile.binding_for(a.gesture) == Some("toggle")
}

pub fn dispatch_action(a: &Action, profile: &Profile, ctl: &mut Controls) -> Result<Outcome> {
    match (a.gesture, a.payload) {
        (Gesture::Move, Payload::Cursor { x, y }) => {
            ctl.input.move_to(x.round() as i32, y.round() as i32)?;
        }
        (Gesture::DragToggle, Payload::Drag(DragPhase::Begin)) => {
            ctl.input.press(MouseButton::Left)?;
        }
        (Gesture::DragToggle, Payload::Drag(DragPhase::End)) => {
            ctl.input.release(MouseButton::Left)?;
        }
        (Gesture::ScrollUp | Gesture::ScrollDown, Payload::Scroll(steps)) => {
            ctl.input.scroll_vertical(steps)?;
        }
        (Gesture::VolumeAdjust, Payload::Volume(target)) => {
            let Some(vol) = ctl.volume.as_mut() else {
                debug!("no volume backend; ignoring");
                return Ok(Outcome::Done);
            };
            let cur = vol.get()?;
            let next = ease(cur, target, profile.controls.volume_smoothing);
            vol.set(next)?;
        }
        (Gesture::BrightnessAdjust, Payload::Brightness(level)) => {
            let Some(bl) = ctl.brightness.as_mut() else {
                debug!("no backlight; ignoring");
                return Ok(Outcome::Done);
            };
            bl.set_percent(level)?;
        }
        (g, _) if g.is_discrete() => {
            let Some(action) = profile.binding_for(g) else {
                debug!("{} has no binding", g.as_str());
                return Ok(Outcome::Done);
            };
            return run_binding(g, action, profile, ctl);
        }
        (g, p) => warn!("unexpected payload {p:?} for {}", g.as_str()),
    }
    Ok(Outcome::Done)
}

/// `current + (target - current) / smoothing`
pub fn ease(current: f32, target: f32, smoothing: f32) -> f32 {
    current + (target - current) / smoothing.max(1.0)
}

fn run_binding(g: Gesture, action: &str, profile: &Profile, ctl: &mut Controls) -> Result<Outcome> {
    if action == "toggle" {
        return Ok(Outcome::Toggle);
    }
    if action == "screenshot" {
        ctl.screenshot.save()?;
        return Ok(Outcome::Done);
    }

    if let Some(rest) = action.strip_prefix("mouse:") {
        match rest.trim() {
            "double" => ctl.input.double_click(MouseButton::Left)?,
            btn => ctl.input.click(btn.parse()?)?,
        }
        return Ok(Outcome::Done);
    }
    if let Some(rest) = action.strip_prefix("scroll:") {
        let (axis, steps) = parse_scroll(rest)?;
        if axis.eq_ignore_ascii_case("vertical") {
            ctl.input.scroll_vertical(steps)?;
        } else {
            return Err(anyhow!("unsupported scroll axis '{axis}'"));
        }
        return Ok(Outcome::Done);
    }
    if let Some(rest) = action.strip_prefix("key:") {
        ctl.input.key_chord(rest.trim())?;
        return Ok(Outcome::Done);
    }
    if let Some(rest) = action.strip_prefix("cmd:") {
        if !profile.meta.allow_commands {
            return Err(anyhow!("cmd: bindings are disabled (allow_commands=false)"));
        }
        let pid = spawn_reaped(rest.trim())?;
        info!("{}: spawned '{}' (pid={pid})", g.as_str(), rest.trim());
        return Ok(Outcome::Done);
    }

    Err(anyhow!(
        "unknown action mapping for {} -> '{}'",
        g.as_str(),
        action
    ))
}

/// Run `sh -c line` without blocking the frame loop. A detached thread waits
/// on the child so it never lingers as a zombie.
fn spawn_reaped(line: &str) -> Result<u32> {
    let mut child = Command::new("sh").arg("-c").arg(line).spawn()?;
    let pid = child.id();
    let line = line.to_string();
    thread::Builder::new()
        .name(format!("cmd-{pid}"))
        .spawn(move || match child.wait() {
            Ok(st) if st.success() => debug!("'{line}' exited"),
            Ok(st) => warn!("'{line}' exited with {st}"),
            Err(e) => warn!("waiting on '{line}' failed: {e}"),
        })?;
    Ok(pid)
}

/// "vertical@+3" -> ("vertical", 3); steps default to +1.
fn parse_scroll(arg: &str) -> Result<(&str, i32)> {
    let mut parts = arg.splitn(2, '@');
    let axis = parts.next().map(str::trim).filter(|s| !s.is_empty()).unwrap_or("vertical");
    let steps = match parts.next() {
        Some(s) => s
            .trim()
            .parse::<i32>()
            .map_err(|_| anyhow!("bad scroll steps '{s}'"))?,
        None => 1,
    };
    Ok((axis, steps))
}
