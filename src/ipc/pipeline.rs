use anyhow::Result;
use log::{debug, info, warn};
use serde::Serialize;
use std::{
    io::BufRead,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{Receiver, Sender},
    },
    time::Instant,
};

use super::dispatch::{Controls, dispatch_all};
use crate::actions::{InputInjector, MouseButton, UinputSink};
use crate::config::Profile;
use crate::controls::{
    BrightnessControl, CommandScreenshot, DryRunScreenshot, FixedScreen, PactlVolume,
    ScreenGeometry, SysfsBacklight,
};
use crate::input::{FrameSource, SourceError};
use crate::session::{Frame, SessionState, process_frame};

/// Coarse commands from the control server to the frame loop.
pub enum PipelineMsg {
    UpdateProfile(Box<Profile>),
    SetEnabled(bool),
}

pub enum DaemonEvent {
    Log(String),
    Stats(PipelineStats),
    /// Gesture control was paused or resumed, by request or by a toggle binding.
    Enabled(bool),
    /// The loop has ended; `Err` carries the fatal source error.
    Finished(std::result::Result<(), String>),
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PipelineStats {
    pub frames: u64,
    pub malformed: u64,
    pub hands: u64,
    pub actions: u64,
    pub dragging: bool,
}

const STATS_EVERY: u64 = 30;

/// Build the side-effect collaborators. In dry-run mode nothing touches the
/// system: input is a no-op sink, volume and brightness are absent.
pub fn build_controls(profile: &Profile, dry_run: bool) -> Controls {
    if dry_run {
        return Controls {
            input: Box::new(UinputSink::noop()),
            volume: None,
            brightness: None,
            screenshot: Box::new(DryRunScreenshot),
        };
    }

    let screen = FixedScreen::from_config(&profile.screen).size();
    let input = UinputSink::new(screen).unwrap_or_else(|e| {
        warn!("uinput unavailable ({e}); pointer and keys disabled");
        UinputSink::noop()
    });
    let brightness: Option<Box<dyn BrightnessControl>> =
        match SysfsBacklight::open(profile.controls.backlight.as_deref()) {
            Ok(bl) => Some(Box::new(bl)),
            Err(e) => {
                warn!("brightness control disabled: {e}");
                None
            }
        };
    Controls {
        input: Box::new(input),
        volume: Some(Box::new(PactlVolume::new())),
        brightness,
        screenshot: Box::new(CommandScreenshot::from_config(&profile.controls)),
    }
}

/// Frame loop. Owns the session state; returns when the source closes or
/// `quit` is raised, and with an error when the source fails.
pub fn run_pipeline<R: BufRead>(
    mut source: FrameSource<R>,
    mut profile: Profile,
    mut ctl: Controls,
    rx: Receiver<PipelineMsg>,
    tx_evt: Sender<DaemonEvent>,
    quit: Arc<AtomicBool>,
) -> Result<()> {
    let started = Instant::now();
    let mut state = SessionState::new();
    let mut stats = PipelineStats::default();
    let mut enabled = true;
    let mut screen = FixedScreen::from_config(&profile.screen).size();

    let _ = tx_evt.send(DaemonEvent::Log(format!(
        "pipeline up, screen {}x{}{}",
        screen.0,
        screen.1,
        if ctl.input.is_noop() { ", input no-op" } else { "" }
    )));

    let result = loop {
        if quit.load(Ordering::Relaxed) {
            break Ok(());
        }

        while let Ok(msg) = rx.try_recv() {
            match msg {
                PipelineMsg::UpdateProfile(p) => {
                    profile = *p;
                    screen = FixedScreen::from_config(&profile.screen).size();
                    let _ = tx_evt.send(DaemonEvent::Log("profile applied".into()));
                }
                PipelineMsg::SetEnabled(en) => {
                    set_enabled(&mut state, ctl.input.as_mut(), &mut enabled, en, &tx_evt);
                }
            }
        }

        let frame = match source.next_frame() {
            Ok(f) => f,
            Err(SourceError::Malformed { line, reason }) => {
                warn!("skipping frame at line {line}: {reason}");
                stats.malformed += 1;
                Frame::default()
            }
            Err(SourceError::Closed) => {
                info!("frame source closed");
                break Ok(());
            }
            Err(SourceError::Io(e)) => break Err(e),
        };

        let now_ms = started.elapsed().as_millis() as u64;
        let actions = process_frame(&mut state, &profile, screen, &frame, now_ms);
        for a in &actions {
            debug!("{} {} {:?}", a.role.as_str(), a.gesture.as_str(), a.payload);
        }
        let was_enabled = enabled;
        dispatch_all(&actions, &profile, &mut ctl, &mut enabled);
        if enabled != was_enabled {
            let now = enabled;
            enabled = was_enabled;
            set_enabled(&mut state, ctl.input.as_mut(), &mut enabled, now, &tx_evt);
        }
        if !enabled {
            // nothing was pressed while paused
            state.drag.force_release();
        }

        stats.frames += 1;
        stats.hands += frame.hands.len() as u64;
        stats.actions += actions.len() as u64;
        stats.dragging = state.drag.is_dragging();
        if stats.frames % STATS_EVERY == 0 {
            let _ = tx_evt.send(DaemonEvent::Stats(stats));
        }
    };

    release_drag(&mut state, ctl.input.as_mut());
    stats.dragging = false;
    let _ = tx_evt.send(DaemonEvent::Stats(stats));
    let _ = tx_evt.send(DaemonEvent::Finished(
        result.as_ref().map(|_| ()).map_err(|e| e.to_string()),
    ));
    info!(
        "pipeline stopped after {} frames ({} malformed)",
        stats.frames, stats.malformed
    );
    Ok(result?)
}

/// Apply a pause or resume. Pausing lets go of a held drag; resuming starts
/// from a clean session, since the latch may have engaged unseen while paused.
fn set_enabled(
    state: &mut SessionState,
    input: &mut dyn InputInjector,
    enabled: &mut bool,
    en: bool,
    tx_evt: &Sender<DaemonEvent>,
) {
    if en == *enabled {
        return;
    }
    if en {
        state.drag.force_release();
        state.reset();
    } else {
        release_drag(state, input);
    }
    *enabled = en;
    let _ = tx_evt.send(DaemonEvent::Enabled(en));
}

fn release_drag(state: &mut SessionState, input: &mut dyn InputInjector) {
    if state.drag.force_release().is_some() {
        if let Err(e) = input.release(MouseButton::Left) {
            warn!("drag release failed: {e}");
        }
    }
}
