use anyhow::{Result, anyhow};
use log::warn;
use pico_args::Arguments;
use std::{
    env,
    path::PathBuf,
    process::{Command, Stdio},
};

use crate::actions::{InputInjector, MouseButton, UinputSink};
use crate::config::{DaemonConfigState, Profile};
use crate::controls::{FixedScreen, ScreenGeometry};
use crate::fingers::FingerStates;
use crate::gestures::{self, Distances};
use crate::ipc;
use crate::tracker::HandRole;

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // Hidden daemon mode (spawned by `start`)
    if pargs.contains("--daemon") {
        return ipc::run_daemon(run_options(&mut pargs)?);
    }

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    // Flags-based help (-h/--help)
    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    // First free arg is the subcommand
    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("run") => ipc::run_daemon(run_options(&mut pargs)?),

        Some("start") => {
            let opts = run_options(&mut pargs)?;
            let input = opts.input.ok_or_else(|| {
                anyhow!("usage: handctl start --input <file|fifo> [--profile <name>] [--dry-run]")
            })?;
            let exe = env::current_exe()?;
            let mut cmd = Command::new(exe);
            cmd.arg("--daemon").arg("--input").arg(&input);
            if let Some(p) = &opts.profile {
                cmd.arg("--profile").arg(p);
            }
            if opts.dry_run {
                cmd.arg("--dry-run");
            }
            let child = cmd.stdin(Stdio::null()).spawn()?;
            println!(
                "handctl: started daemon (pid={}) reading {}",
                child.id(),
                input.display()
            );
            Ok(())
        }

        Some("stop") => request("shutdown"),
        Some("status") => request("status"),
        Some("reload") => request("reload"),
        Some("list") => request("list"),
        Some("doctor") => request("doctor"),
        Some("pause") => request("pause"),
        Some("resume") => request("resume"),

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl use <profile_name>"))?;
            let r = ipc::client_request(serde_json::json!({"op":"use","profile":name}))?;
            print_response(&r);
            Ok(())
        }

        Some("classify") => classify(&mut pargs),

        Some("emit") => emit(&mut pargs),

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

fn run_options(pargs: &mut Arguments) -> Result<ipc::RunOptions> {
    Ok(ipc::RunOptions {
        input: pargs.opt_value_from_os_str("--input", |s| {
            Ok::<_, std::convert::Infallible>(PathBuf::from(s))
        })?,
        profile: pargs.opt_value_from_str("--profile")?,
        dry_run: pargs.contains("--dry-run"),
    })
}

fn request(op: &str) -> Result<()> {
    let r = ipc::client_request(serde_json::json!({ "op": op }))?;
    print_response(&r);
    Ok(())
}

/// Profile for one-shot commands: the named or active one, else the bundled default.
fn local_profile(name: Option<&str>) -> Profile {
    match DaemonConfigState::load_with(name) {
        Ok(st) => st.profile,
        Err(e) => {
            warn!("using bundled default profile: {e}");
            Profile::default()
        }
    }
}

fn classify(pargs: &mut Arguments) -> Result<()> {
    // usage:
    //   handctl classify 0 1 1 0 0 --index-middle 12
    //   handctl classify 1 1 1 0 0 --role secondary --thumb-index 90
    let role = match pargs.opt_value_from_str::<_, String>("--role")?.as_deref() {
        None | Some("primary") => HandRole::Primary,
        Some("secondary") => HandRole::Secondary,
        Some(other) => return Err(anyhow!("unknown role: {other}")),
    };
    let d = Distances {
        thumb_index: pargs.opt_value_from_str("--thumb-index")?,
        index_middle: pargs.opt_value_from_str("--index-middle")?,
        thumb_pinky: pargs.opt_value_from_str("--thumb-pinky")?,
    };
    let profile_name: Option<String> = pargs.opt_value_from_str("--profile")?;

    let mut bits = [0u8; 5];
    for b in bits.iter_mut() {
        *b = pargs
            .free_from_str()
            .map_err(|_| anyhow!("usage: handctl classify <thumb> <index> <middle> <ring> <pinky>"))?;
        if *b > 1 {
            return Err(anyhow!("finger states are 0 or 1"));
        }
    }

    let profile = local_profile(profile_name.as_deref());
    let fingers = FingerStates::from_bits(bits);
    let g = gestures::classify(role, fingers, &d, &profile.thresholds);
    match profile.binding_for(g) {
        Some(action) => println!("{} {fingers} -> {} ({action})", role.as_str(), g.as_str()),
        None => println!("{} {fingers} -> {}", role.as_str(), g.as_str()),
    }
    Ok(())
}

fn emit(pargs: &mut Arguments) -> Result<()> {
    // usage:
    //   handctl emit click right
    //   handctl emit double
    //   handctl emit scroll 3
    //   handctl emit key CTRL+TAB
    //   handctl emit move 960 540
    let what: String = pargs
        .free_from_str()
        .map_err(|_| anyhow!("usage: handctl emit <click|double|scroll|key|move> ..."))?;
    let screen = FixedScreen::from_config(&local_profile(None).screen).size();
    let mut sink = UinputSink::new(screen)?;
    match what.as_str() {
        "click" => {
            let btn: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl emit click <left|right|middle>"))?;
            sink.click(btn.parse::<MouseButton>()?)?;
            println!("ok: clicked {btn}");
        }
        "double" => {
            sink.double_click(MouseButton::Left)?;
            println!("ok: double-clicked left");
        }
        "scroll" => {
            let steps: i32 = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl emit scroll <steps>"))?;
            sink.scroll_vertical(steps)?;
            println!("ok: scrolled vertical {steps}");
        }
        "key" => {
            let chord: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl emit key CTRL+TAB"))?;
            sink.key_chord(&chord)?;
            println!("ok: sent key chord {chord}");
        }
        "move" => {
            let usage = || anyhow!("usage: handctl emit move <x> <y>");
            let x: i32 = pargs.free_from_str().map_err(|_| usage())?;
            let y: i32 = pargs.free_from_str().map_err(|_| usage())?;
            sink.move_to(x, y)?;
            println!("ok: moved pointer to {x},{y}");
        }
        other => return Err(anyhow!("unknown emit kind: {other}")),
    }
    Ok(())
}

fn print_help() {
    println!(
        r#"handctl - hand-gesture desktop control

USAGE:
  handctl help [command]                  Show general or command-specific help
  handctl run [--input F] [--profile P] [--dry-run]
                                          Run in the foreground, frames from F or stdin
  handctl start --input F [--profile P] [--dry-run]
                                          Start the daemon in the background
  handctl stop                            Stop the daemon
  handctl status                          Show daemon state and frame counters
  handctl reload                          Reload active profile
  handctl use <name>                      Switch active profile
  handctl list                            List profiles
  handctl doctor                          Diagnose permissions/devices
  handctl pause | resume                  Suspend or resume gesture actions
  handctl classify <t> <i> <m> <r> <p>    Classify a finger-state vector
  handctl emit click <left|right|middle>  Emit a mouse click
  handctl emit double                     Emit a left double-click
  handctl emit scroll <steps>             Emit vertical scroll (+/- steps)
  handctl emit key CTRL+TAB               Emit a key or chord
  handctl emit move <x> <y>               Move the pointer

FRAMES:
  One JSON object per line:
  {{"width":640,"height":480,"hands":[{{"landmarks":[[x,y],...],"handedness":"Right"}}]}}

TIPS:
  - Profiles: ~/.config/handctl/profiles (edits are picked up live)
  - Active profile pointer: ~/.config/handctl/active
  - Control socket: {}
  - RUST_LOG=debug shows every classified action
"#,
        ipc::socket_path().display()
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "run" => println!(
            "usage: handctl run [--input <file>] [--profile <name>] [--dry-run]\nRuns the frame loop and control socket in the foreground. --dry-run logs actions without touching input, audio or backlight."
        ),
        "start" => println!(
            "usage: handctl start --input <file|fifo> [--profile <name>] [--dry-run]\nStarts the background daemon."
        ),
        "stop" => println!("usage: handctl stop\nStops the running daemon."),
        "status" => println!(
            "usage: handctl status\nShows enabled flag, active profile, input, socket, PID and frame counters."
        ),
        "reload" => println!(
            "usage: handctl reload\nReloads the current profile; keeps last good on error."
        ),
        "use" => {
            println!("usage: handctl use <name>\nSwitches active profile to <name> and reloads.")
        }
        "list" => {
            println!("usage: handctl list\nLists available profiles and the active one.")
        }
        "doctor" => println!(
            "usage: handctl doctor\nChecks uinput access, input group, backlight and pactl."
        ),
        "pause" | "resume" => println!(
            "usage: handctl pause|resume\nPauses or resumes dispatch; frames are still read. A held drag is released on pause."
        ),
        "classify" => println!(
            "usage: handctl classify <thumb> <index> <middle> <ring> <pinky> [--role primary|secondary]\n                        [--thumb-index PX] [--index-middle PX] [--thumb-pinky PX] [--profile NAME]\nPrints the gesture a finger-state vector maps to."
        ),
        "emit" => println!(
            "usage:\n  handctl emit click <left|right|middle>\n  handctl emit double\n  handctl emit scroll <steps>\n  handctl emit key CTRL+TAB\n  handctl emit move <x> <y>"
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}
