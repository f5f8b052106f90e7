use anyhow::{Result, anyhow};
use log::{debug, error, info, warn};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::{Value, json};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::{
    fs,
    io::{BufRead, BufReader, ErrorKind, Write},
    os::unix::net::{UnixListener, UnixStream},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender, TryRecvError},
    },
    thread,
    time::{Duration, Instant},
};

use super::pipeline::{DaemonEvent, PipelineMsg, PipelineStats, build_controls, run_pipeline};
use super::runtime::socket_path;
use crate::config::DaemonConfigState;
use crate::input;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// JSON-lines frame file; stdin when unset
    pub input: Option<PathBuf>,
    /// profile to load instead of the active one
    pub profile: Option<String>,
    pub dry_run: bool,
}

pub fn run_daemon(opts: RunOptions) -> Result<()> {
    // socket
    let sock = socket_path();
    if sock.exists() {
        if UnixStream::connect(&sock).is_ok() {
            return Err(anyhow!(
                "handctl daemon already running ({})",
                sock.display()
            ));
        }
        let _ = fs::remove_file(&sock);
    }
    let listener = UnixListener::bind(&sock)?;
    listener.set_nonblocking(true)?;
    info!("daemon: listening on {}", sock.display());

    // state
    let cfg = DaemonConfigState::load_with(opts.profile.as_deref())?;
    info!("daemon: active profile '{}'", cfg.active_name);
    let mut state = DaemonState::new(cfg, &opts);

    let quit = Arc::new(AtomicBool::new(false));
    for sig in [SIGINT, SIGTERM] {
        signal_hook::flag::register(sig, Arc::clone(&quit))?;
    }

    // channels
    let (tx_req, rx_req) = mpsc::channel::<IpcMsg>();
    let (tx_evt, rx_evt) = mpsc::channel::<DaemonEvent>();
    let (tx_pipe, rx_pipe) = mpsc::channel::<PipelineMsg>();

    let _watcher = match watch_profiles(&state.cfg.profiles_dir, tx_req) {
        Ok(w) => Some(w),
        Err(e) => {
            warn!("profile hot reload disabled: {e}");
            None
        }
    };

    // frame thread
    let source = input::open(opts.input.as_deref())?;
    let profile = state.cfg.profile.clone();
    let dry_run = opts.dry_run;
    let q = Arc::clone(&quit);
    let frames = thread::Builder::new()
        .name("frames".into())
        .spawn(move || {
            let ctl = build_controls(&profile, dry_run);
            run_pipeline(source, profile, ctl, rx_pipe, tx_evt, q)
        })?;

    // accept loop
    let outcome = loop {
        if quit.load(Ordering::Relaxed) {
            info!("daemon: signal received, shutting down");
            break Ok(());
        }

        match listener.accept() {
            Ok((stream, _)) => match handle_client(stream, &mut state, &tx_pipe) {
                Ok(true) => break Ok(()),
                Ok(false) => {}
                Err(e) => error!("ipc client error: {e}"),
            },
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => warn!("accept failed: {e}"),
        }

        if let Some(done) = drain_events(&rx_evt, &mut state) {
            break done;
        }

        let mut changed = false;
        while let Ok(IpcMsg::ProfilesChanged(paths)) = rx_req.try_recv() {
            changed |= paths.iter().any(|p| *p == state.cfg.active_path());
        }
        if changed {
            match state.reload(&tx_pipe) {
                Ok(()) => info!("profile '{}' reloaded from disk", state.cfg.active_name),
                Err(e) => error!("reload failed, keeping last good profile: {e}"),
            }
        }

        thread::sleep(Duration::from_millis(5));
    };

    quit.store(true, Ordering::Relaxed);
    let _ = fs::remove_file(&sock);
    // a frame thread blocked on stdin is left to die with the process
    if frames.is_finished() && frames.join().is_err() {
        error!("frame thread panicked");
    }
    outcome
}

/// Apply pending frame-loop events. `Some` means the loop is gone and the
/// daemon should stop with that outcome.
fn drain_events(rx_evt: &Receiver<DaemonEvent>, st: &mut DaemonState) -> Option<Result<()>> {
    loop {
        match rx_evt.try_recv() {
            Ok(DaemonEvent::Log(s)) => info!("[frames] {s}"),
            Ok(DaemonEvent::Stats(s)) => st.stats = s,
            Ok(DaemonEvent::Enabled(en)) => st.enabled = en,
            Ok(DaemonEvent::Finished(Ok(()))) => {
                info!("daemon: frame source finished");
                return Some(Ok(()));
            }
            Ok(DaemonEvent::Finished(Err(e))) => {
                return Some(Err(anyhow!("frame loop failed: {e}")));
            }
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => {
                return Some(Err(anyhow!("frame loop exited without finishing")));
            }
        }
    }
}

fn handle_client(
    mut stream: UnixStream,
    st: &mut DaemonState,
    tx_pipe: &Sender<PipelineMsg>,
) -> Result<bool> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if line.trim().is_empty() {
        return Ok(false);
    }
    let req: Value = serde_json::from_str(&line)?;
    let (resp, shutdown) = handle_request(&req, st, tx_pipe);
    writeln!(stream, "{resp}")?;
    Ok(shutdown)
}

/// Answer one request; the flag asks the daemon to stop.
fn handle_request(req: &Value, st: &mut DaemonState, tx_pipe: &Sender<PipelineMsg>) -> (Value, bool) {
    let op = req.get("op").and_then(|v| v.as_str()).unwrap_or("");
    debug!("ipc op '{op}'");

    let resp = match op {
        "status" => json!({"ok": true, "data": {
            "enabled": st.enabled,
            "active_profile": st.cfg.active_name,
            "socket": socket_path(),
            "pid": std::process::id(),
            "dry_run": st.dry_run,
            "input": st.input.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "stdin".into()),
            "uptime_secs": st.started.elapsed().as_secs(),
            "stats": st.stats,
        }}),
        "reload" => match st.reload(tx_pipe) {
            Ok(()) => json!({"ok": true, "data": {"active_profile": st.cfg.active_name}}),
            Err(e) => json!({"ok": false, "error": e.to_string()}),
        },
        "use" => {
            let name = req.get("profile").and_then(|v| v.as_str()).unwrap_or("");
            match st.cfg.set_active(name) {
                Ok(()) => {
                    st.push_profile(tx_pipe);
                    info!("switched active profile to {}", st.cfg.active_name);
                    json!({"ok": true, "data": {"active_profile": st.cfg.active_name}})
                }
                Err(e) => json!({"ok": false, "error": e.to_string()}),
            }
        }
        "list" => {
            let list = st.cfg.list_profiles();
            json!({"ok": true, "data": {"profiles": list, "active": st.cfg.active_name}})
        }
        "doctor" => json!({"ok": true, "data": st.cfg.doctor_report()}),
        "pause" | "resume" => {
            st.enabled = op == "resume";
            let _ = tx_pipe.send(PipelineMsg::SetEnabled(st.enabled));
            json!({"ok": true, "data": {"enabled": st.enabled}})
        }
        "shutdown" => {
            return (json!({"ok": true, "data": "shutting down"}), true);
        }
        _ => json!({"ok": false, "error": format!("unknown op: {op}")}),
    };
    (resp, false)
}

struct DaemonState {
    enabled: bool,
    cfg: DaemonConfigState,
    stats: PipelineStats,
    dry_run: bool,
    input: Option<PathBuf>,
    started: Instant,
}

impl DaemonState {
    fn new(cfg: DaemonConfigState, opts: &RunOptions) -> Self {
        Self {
            enabled: true,
            cfg,
            stats: PipelineStats::default(),
            dry_run: opts.dry_run,
            input: opts.input.clone(),
            started: Instant::now(),
        }
    }

    fn reload(&mut self, tx_pipe: &Sender<PipelineMsg>) -> Result<()> {
        self.cfg.reload()?;
        self.push_profile(tx_pipe);
        Ok(())
    }

    fn push_profile(&self, tx_pipe: &Sender<PipelineMsg>) {
        let _ = tx_pipe.send(PipelineMsg::UpdateProfile(Box::new(self.cfg.profile.clone())));
    }
}

enum IpcMsg {
    ProfilesChanged(Vec<PathBuf>),
}

fn watch_profiles(dir: &Path, tx: Sender<IpcMsg>) -> notify::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(ev) if ev.kind.is_modify() || ev.kind.is_create() => {
                let _ = tx.send(IpcMsg::ProfilesChanged(ev.paths));
            }
            Ok(_) => {}
            Err(e) => warn!("profile watcher: {e}"),
        }
    })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    debug!("watching {}", dir.display());
    Ok(watcher)
}

// client helper
pub fn client_request(req: Value) -> Result<Value> {
    let sock = socket_path();
    if !sock.exists() {
        return Err(anyhow!(
            "handctl daemon is not running (socket missing at {})",
            sock.display()
        ));
    }
    let mut stream = UnixStream::connect(sock)?;
    let line = serde_json::to_string(&req)? + "\n";
    stream.write_all(line.as_bytes())?;
    let mut reader = BufReader::new(stream);
    let mut resp = String::new();
    reader.read_line(&mut resp)?;
    let v: Value = serde_json::from_str(&resp)?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::scratch_state;

    fn state(tag: &str) -> DaemonState {
        DaemonState::new(scratch_state(tag), &RunOptions::default())
    }

    #[test]
    fn test_status_reports_state() {
        let mut st = state("status");
        let (tx, _rx) = mpsc::channel();
        let (resp, stop) = handle_request(&json!({"op": "status"}), &mut st, &tx);
        assert!(!stop);
        assert_eq!(resp["ok"], true);
        assert_eq!(resp["data"]["active_profile"], "default");
        assert_eq!(resp["data"]["input"], "stdin");
        assert_eq!(resp["data"]["stats"]["frames"], 0);
    }

    #[test]
    fn test_pause_and_resume_reach_pipeline() {
        let mut st = state("pause");
        let (tx, rx) = mpsc::channel();
        handle_request(&json!({"op": "pause"}), &mut st, &tx);
        assert!(!st.enabled);
        assert!(matches!(rx.try_recv(), Ok(PipelineMsg::SetEnabled(false))));
        handle_request(&json!({"op": "resume"}), &mut st, &tx);
        assert!(matches!(rx.try_recv(), Ok(PipelineMsg::SetEnabled(true))));
    }

    #[test]
    fn test_use_missing_profile_fails_softly() {
        let mut st = state("use-missing");
        let (tx, rx) = mpsc::channel();
        let (resp, _) = handle_request(&json!({"op": "use", "profile": "nope"}), &mut st, &tx);
        assert_eq!(resp["ok"], false);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_reload_pushes_profile() {
        let mut st = state("reload-op");
        let (tx, rx) = mpsc::channel();
        let (resp, _) = handle_request(&json!({"op": "reload"}), &mut st, &tx);
        assert_eq!(resp["ok"], true);
        assert!(matches!(rx.try_recv(), Ok(PipelineMsg::UpdateProfile(_))));
    }

    #[test]
    fn test_dead_frame_thread_stops_daemon() {
        let mut st = state("dead-frames");
        let (tx, rx) = mpsc::channel();
        tx.send(DaemonEvent::Stats(PipelineStats {
            frames: 7,
            ..PipelineStats::default()
        }))
        .unwrap();
        assert!(drain_events(&rx, &mut st).is_none());
        assert_eq!(st.stats.frames, 7);

        // sender dropped without a Finished event, as when the thread panics
        drop(tx);
        assert!(matches!(drain_events(&rx, &mut st), Some(Err(_))));
    }

    #[test]
    fn test_finished_events_end_serving() {
        let mut st = state("finished");
        let (tx, rx) = mpsc::channel();
        tx.send(DaemonEvent::Finished(Ok(()))).unwrap();
        assert!(matches!(drain_events(&rx, &mut st), Some(Ok(()))));
        tx.send(DaemonEvent::Finished(Err("boom".into()))).unwrap();
        assert!(matches!(drain_events(&rx, &mut st), Some(Err(_))));
    }

    #[test]
    fn test_toggle_from_frames_shows_in_status() {
        let mut st = state("toggle-status");
        let (tx, rx) = mpsc::channel();
        let (tx_pipe, _rx_pipe) = mpsc::channel();
        tx.send(DaemonEvent::Enabled(false)).unwrap();
        assert!(drain_events(&rx, &mut st).is_none());
        let (resp, _) = handle_request(&json!({"op": "status"}), &mut st, &tx_pipe);
        assert_eq!(resp["data"]["enabled"], false);
    }

    #[test]
    fn test_shutdown_and_unknown_ops() {
        let mut st = state("ops");
        let (tx, _rx) = mpsc::channel();
        let (_, stop) = handle_request(&json!({"op": "shutdown"}), &mut st, &tx);
        assert!(stop);
        let (resp, stop) = handle_request(&json!({"op": "dance"}), &mut st, &tx);
        assert!(!stop);
        assert_eq!(resp["ok"], false);
    }
}
