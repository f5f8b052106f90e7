//! System-control collaborators: screen geometry, volume, backlight, screenshots.
//!
//! Each one is a small trait so the dispatcher can be driven by fakes in tests
//! and by no-ops when a device is unavailable.

use chrono::{DateTime, Local};
use directories::UserDirs;
use log::{debug, info};
use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};
use thiserror::Error;

use crate::config::{ControlsConfig, ScreenConfig};

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("{what}: {source}")]
    Io {
        what: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{cmd}` exited with {status}")]
    Command { cmd: String, status: String },
    #[error("could not parse volume from {0:?}")]
    Parse(String),
    #[error("no backlight device under /sys/class/backlight")]
    NoBacklight,
    #[error("empty screenshot command")]
    EmptyCommand,
}

fn io_err(what: impl Into<String>) -> impl FnOnce(std::io::Error) -> ControlError {
    let what = what.into();
    move |source| ControlError::Io { what, source }
}

pub trait ScreenGeometry {
    fn size(&self) -> (u32, u32);
}

/// Screen size taken from the profile.
#[derive(Debug, Clone, Copy)]
pub struct FixedScreen {
    width: u32,
    height: u32,
}

impl FixedScreen {
    pub fn from_config(cfg: &ScreenConfig) -> Self {
        Self {
            width: cfg.width,
            height: cfg.height,
        }
    }
}

impl ScreenGeometry for FixedScreen {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Master volume as a percentage in `0..=100`.
pub trait VolumeControl {
    fn get(&mut self) -> Result<f32, ControlError>;
    fn set(&mut self, percent: f32) -> Result<(), ControlError>;
}

/// Default PulseAudio/PipeWire sink through `pactl`.
#[derive(Debug, Default)]
pub struct PactlVolume;

impl PactlVolume {
    pub fn new() -> Self {
        Self
    }
}

fn run(cmd: &mut Command) -> Result<String, ControlError> {
    let label = format!("{cmd:?}");
    let out = cmd.output().map_err(io_err(label.clone()))?;
    if !out.status.success() {
        return Err(ControlError::Command {
            cmd: label,
            status: out.status.to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&out.stdout).into_owned())
}

/// First `NN%` figure in `pactl get-sink-volume` output.
pub fn parse_pactl_volume(s: &str) -> Option<f32> {
    s.split_whitespace()
        .find_map(|tok| tok.strip_suffix('%'))
        .and_then(|n| n.parse::<f32>().ok())
}

impl VolumeControl for PactlVolume {
    fn get(&mut self) -> Result<f32, ControlError> {
        let out = run(Command::new("pactl").args(["get-sink-volume", "@DEFAULT_SINK@"]))?;
        parse_pactl_volume(&out).ok_or(ControlError::Parse(out))
    }

    fn set(&mut self, percent: f32) -> Result<(), ControlError> {
        let pct = format!("{}%", percent.clamp(0.0, 100.0).round() as u32);
        run(Command::new("pactl").args(["set-sink-volume", "@DEFAULT_SINK@", &pct]))?;
        Ok(())
    }
}

/// Display brightness as an integer percentage in `0..=100`.
pub trait BrightnessControl {
    fn set_percent(&mut self, percent: u8) -> Result<(), ControlError>;
}

/// Linux backlight class device.
#[derive(Debug)]
pub struct SysfsBacklight {
    dir: PathBuf,
    max: u32,
}

impl SysfsBacklight {
    pub fn open(name: Option<&str>) -> Result<Self, ControlError> {
        let root = Path::new("/sys/class/backlight");
        let dir = match name {
            Some(n) => root.join(n),
            None => fs::read_dir(root)
                .map_err(io_err(root.display().to_string()))?
                .flatten()
                .map(|e| e.path())
                .min()
                .ok_or(ControlError::NoBacklight)?,
        };
        let max_path = dir.join("max_brightness");
        let raw = fs::read_to_string(&max_path).map_err(io_err(max_path.display().to_string()))?;
        let max = raw
            .trim()
            .parse::<u32>()
            .map_err(|_| ControlError::Parse(raw.clone()))?;
        debug!("backlight {} (max {max})", dir.display());
        Ok(Self { dir, max })
    }

    pub fn raw_value(&self, percent: u8) -> u32 {
        (u64::from(self.max) * u64::from(percent.min(100)) / 100) as u32
    }
}

impl BrightnessControl for SysfsBacklight {
    fn set_percent(&mut self, percent: u8) -> Result<(), ControlError> {
        let path = self.dir.join("brightness");
        fs::write(&path, self.raw_value(percent).to_string())
            .map_err(io_err(path.display().to_string()))
    }
}

pub trait ScreenshotSink {
    /// Capture the screen; returns where the image was written.
    fn save(&mut self) -> Result<PathBuf, ControlError>;
}

/// Runs an external capture tool (`grim`, `scrot`, ...) with `{path}` substituted.
#[derive(Debug)]
pub struct CommandScreenshot {
    dir: PathBuf,
    cmd: String,
}

pub fn screenshot_name(at: DateTime<Local>) -> String {
    at.format("%Y-%m-%d_%H-%M-%S.png").to_string()
}

fn default_screenshot_dir() -> PathBuf {
    UserDirs::new()
        .and_then(|u| u.picture_dir().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("screenshots")
}

impl CommandScreenshot {
    pub fn from_config(cfg: &ControlsConfig) -> Self {
        Self {
            dir: cfg.screenshot_dir.clone().unwrap_or_else(default_screenshot_dir),
            cmd: cfg.screenshot_cmd.clone(),
        }
    }

    /// Program and arguments for `path`, split on whitespace.
    pub fn command_line(&self, path: &Path) -> Vec<String> {
        let p = path.display().to_string();
        self.cmd
            .split_whitespace()
            .map(|tok| tok.replace("{path}", &p))
            .collect()
    }
}

impl ScreenshotSink for CommandScreenshot {
    fn save(&mut self) -> Result<PathBuf, ControlError> {
        fs::create_dir_all(&self.dir).map_err(io_err(self.dir.display().to_string()))?;
        let path = self.dir.join(screenshot_name(Local::now()));
        let argv = self.command_line(&path);
        let (prog, args) = argv.split_first().ok_or(ControlError::EmptyCommand)?;
        run(Command::new(prog).args(args))?;
        info!("screenshot saved: {}", path.display());
        Ok(path)
    }
}

/// Logs the file name a capture would get, writes nothing.
#[derive(Debug, Default)]
pub struct DryRunScreenshot;

impl ScreenshotSink for DryRunScreenshot {
    fn save(&mut self) -> Result<PathBuf, ControlError> {
        let path = PathBuf::from(screenshot_name(Local::now()));
        info!("dry-run: would capture {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_pactl_volume() {
        let out = "Volume: front-left: 32768 /  50% / -18.06 dB,   front-right: 32768 /  50% / -18.06 dB\n        balance 0.00\n";
        assert_eq!(parse_pactl_volume(out), Some(50.0));
        assert_eq!(parse_pactl_volume("Volume: n/a"), None);
    }

    #[test]
    fn test_backlight_scaling() {
        let bl = SysfsBacklight {
            dir: PathBuf::from("/nonexistent"),
            max: 937,
        };
        assert_eq!(bl.raw_value(0), 0);
        assert_eq!(bl.raw_value(100), 937);
        assert_eq!(bl.raw_value(50), 468);
        assert_eq!(bl.raw_value(255), 937);
    }

    #[test]
    fn test_screenshot_name() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(screenshot_name(at), "2024-03-09_07-05-01.png");
    }

    #[test]
    fn test_command_line_substitutes_path() {
        let shot = CommandScreenshot {
            dir: PathBuf::from("/tmp/shots"),
            cmd: "grim -t png {path}".to_string(),
        };
        let argv = shot.command_line(Path::new("/tmp/shots/a.png"));
        assert_eq!(argv, vec!["grim", "-t", "png", "/tmp/shots/a.png"]);
    }

    #[test]
    fn test_fixed_screen() {
        let s = FixedScreen::from_config(&ScreenConfig {
            width: 2560,
            height: 1440,
        });
        assert_eq!(s.size(), (2560, 1440));
    }
}
