use anyhow::{Result, anyhow};
use directories::UserDirs;
use log::{info, warn};
use serde::{Deserialize, Deserializer};
use std::{
    collections::HashMap,
    env, fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::fingers::ThumbRule;
use crate::gestures::Gesture;
use crate::tracker::RolePolicy;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
    #[serde(default)]
    pub allow_commands: bool,
}

/// Pixel-distance thresholds. Engage/release and near/far are kept apart on purpose.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// index/middle tip separation below which two raised fingers click
    pub click_near: f32,
    /// separation above which the same posture double-clicks
    pub click_far: f32,
    /// thumb/index pinch distance that starts a drag
    pub drag_engage: f32,
    /// pinch distance that ends a drag, strictly above `drag_engage`
    pub drag_release: f32,
    pub thumb_default: ThumbRule,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            click_near: 30.0,
            click_far: 50.0,
            drag_engage: 40.0,
            drag_release: 60.0,
            thumb_default: ThumbRule::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CursorConfig {
    pub frame_margin: u32,
    pub smoothing: f32,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            frame_margin: 100,
            smoothing: 5.0,
        }
    }
}

/// Minimum interval between repeated firings, in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Cooldowns {
    pub left_click: u64,
    pub right_click: u64,
    pub double_click: u64,
    pub screenshot: u64,
    pub minimize: u64,
    pub maximize: u64,
    pub close_tab: u64,
    pub tab_change: u64,
}

impl Default for Cooldowns {
    fn default() -> Self {
        Self {
            left_click: 200,
            right_click: 300,
            double_click: 300,
            screenshot: 500,
            minimize: 500,
            maximize: 500,
            close_tab: 300,
            tab_change: 300,
        }
    }
}

impl Cooldowns {
    pub fn for_gesture(&self, g: Gesture) -> Option<u64> {
        Some(match g {
            Gesture::LeftClick => self.left_click,
            Gesture::RightClick => self.right_click,
            Gesture::DoubleClick => self.double_click,
            Gesture::Screenshot => self.screenshot,
            Gesture::Minimize => self.minimize,
            Gesture::Maximize => self.maximize,
            Gesture::CloseTab => self.close_tab,
            Gesture::TabChange => self.tab_change,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    /// pinch distance mapped to 0% volume/brightness
    pub distance_min: f32,
    /// pinch distance mapped to 100%
    pub distance_max: f32,
    /// easing divisor applied between current and target volume
    pub volume_smoothing: f32,
    /// wheel steps emitted per scroll frame
    pub scroll_step: i32,
    pub screenshot_dir: Option<PathBuf>,
    /// `{path}` is replaced by the output file
    pub screenshot_cmd: String,
    /// sysfs backlight device name; first one found when unset
    pub backlight: Option<String>,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            distance_min: 30.0,
            distance_max: 200.0,
            volume_smoothing: 5.0,
            scroll_step: 1,
            screenshot_dir: None,
            screenshot_cmd: "grim {path}".to_string(),
            backlight: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RolesConfig {
    pub policy: RolePolicy,
    /// largest centre movement (px) still treated as the same hand
    pub max_jump: f32,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            policy: RolePolicy::default(),
            max_jump: 150.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub cursor: CursorConfig,
    #[serde(default)]
    pub cooldowns: Cooldowns,
    #[serde(default)]
    pub screen: ScreenConfig,
    #[serde(default)]
    pub controls: ControlsConfig,
    #[serde(default)]
    pub roles: RolesConfig,

    // Accept nested/dotted tables and flatten them into "a.b" -> "value"
    #[serde(default, deserialize_with = "deserialize_bindings_flat")]
    pub bindings: HashMap<String, String>,
}

impl Default for Profile {
    fn default() -> Self {
        Self::from_toml(default_profile_text()).unwrap_or_else(|_| Self {
            meta: Meta::default(),
            thresholds: Thresholds::default(),
            cursor: CursorConfig::default(),
            cooldowns: Cooldowns::default(),
            screen: ScreenConfig::default(),
            controls: ControlsConfig::default(),
            roles: RolesConfig::default(),
            bindings: HashMap::new(),
        })
    }
}

impl Profile {
    pub fn from_toml(txt: &str) -> Result<Self> {
        let profile: Profile = toml::from_str(txt)?;
        validate_profile(&profile)?;
        Ok(profile)
    }

    pub fn binding_for(&self, g: Gesture) -> Option<&str> {
        g.binding_key()
            .and_then(|k| self.bindings.get(k))
            .map(String::as_str)
    }
}

// --------- custom bindings deserializer (tolerant) ----------
fn deserialize_bindings_flat<'de, D>(
    de: D,
) -> std::result::Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = toml::Value::deserialize(de)?;
    let table = match val {
        toml::Value::Table(t) => t,
        other => {
            return Err(serde::de::Error::custom(format!(
                "bindings must be a table, got {:?}",
                other.type_str()
            )));
        }
    };

    let mut out = HashMap::new();
    flatten_table("", &table, &mut out).map_err(serde::de::Error::custom)?;
    Ok(out)
}

fn flatten_table(
    prefix: &str,
    table: &toml::value::Table,
    out: &mut HashMap<String, String>,
) -> std::result::Result<(), String> {
    for (k, v) in table {
        let key = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        match v {
            toml::Value::String(s) => {
                out.insert(key, s.clone());
            }
            toml::Value::Table(sub) => {
                flatten_table(&key, sub, out)?;
            }
            other => {
                return Err(format!(
                    "binding '{}' value must be a string, got {}",
                    key,
                    other.type_str()
                ));
            }
        }
    }
    Ok(())
}
// ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DaemonConfigState {
    pub active_name: String,
    pub profile: Profile,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

fn config_dir() -> PathBuf {
    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .unwrap_or_else(env::temp_dir);
    home.join(".config").join("handctl")
}

fn profiles_dir() -> PathBuf {
    config_dir().join("profiles")
}

fn active_ptr_path() -> PathBuf {
    config_dir().join("active")
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl DaemonConfigState {
    /// Install the bundled default profile on first run, then load `name`
    /// (without moving the active pointer) or the active profile.
    pub fn load_with(name: Option<&str>) -> Result<Self> {
        let cfgdir = config_dir();
        let profdir = profiles_dir();
        fs::create_dir_all(&profdir)?;

        let def_path = profdir.join("default.toml");
        if !def_path.exists() {
            fs::write(&def_path, default_profile_text())?;
            info!("installed default profile at {}", def_path.display());
        }

        let active_ptr = active_ptr_path();
        if !active_ptr.exists() {
            let mut f = fs::File::create(&active_ptr)?;
            f.write_all(b"default")?;
        }

        let active_name = match name {
            Some(n) => n.to_string(),
            None => fs::read_to_string(&active_ptr)?.trim().to_string(),
        };
        let profile = load_profile(&profdir, &active_name)?;

        Ok(Self {
            active_name,
            profile,
            config_dir: cfgdir,
            profiles_dir: profdir,
            active_ptr,
        })
    }

    pub fn active_path(&self) -> PathBuf {
        self.profiles_dir.join(format!("{}.toml", self.active_name))
    }

    pub fn reload(&mut self) -> Result<()> {
        self.profile = load_profile(&self.profiles_dir, &self.active_name)?;
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profiles_dir.join(format!("{name}.toml"));
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.reload()?;
        Ok(())
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.profiles_dir) {
            for e in rd.flatten() {
                if let Some(ext) = e.path().extension() {
                    if ext == "toml" {
                        if let Some(stem) = e.path().file_stem().and_then(|s| s.to_str()) {
                            v.push(stem.to_string());
                        }
                    }
                }
            }
        }
        v.sort();
        v
    }

    pub fn doctor_report(&self) -> serde_json::Value {
        let uinput_ok = Path::new("/dev/uinput").exists();
        let in_input_group = check_in_input_group();
        let backlights = list_backlights();
        let pactl = find_in_path("pactl");
        if !uinput_ok {
            warn!("doctor: /dev/uinput missing; pointer and key injection will be no-ops");
        }
        serde_json::json!({
            "uinput_present": uinput_ok,
            "input_group_member": in_input_group,
            "backlights": backlights,
            "pactl": pactl,
            "config_dir": self.config_dir,
            "profiles_dir": self.profiles_dir,
            "active_profile": self.active_name,
            "screen": [self.profile.screen.width, self.profile.screen.height],
            "hints": {
                "udev_rule": "/etc/udev/rules.d/80-uinput.rules",
                "add_user_to_input_group": "sudo usermod -aG input $USER && newgrp input",
                "backlight_write": "add a udev rule granting the video group write access to brightness"
            }
        })
    }
}

fn load_profile(dir: &Path, name: &str) -> Result<Profile> {
    let path = dir.join(format!("{name}.toml"));
    let txt = fs::read_to_string(&path)
        .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
    Profile::from_toml(&txt).map_err(|e| anyhow!("failed to load {}: {e}", path.display()))
}

const ACTION_PREFIXES: [&str; 4] = ["mouse:", "scroll:", "key:", "cmd:"];

fn validate_profile(p: &Profile) -> Result<()> {
    let th = &p.thresholds;
    if th.click_near <= 0.0 || th.drag_engage <= 0.0 {
        return Err(anyhow!("thresholds must be positive distances"));
    }
    if th.click_near > th.click_far {
        return Err(anyhow!(
            "thresholds.click_near ({}) must not exceed click_far ({})",
            th.click_near,
            th.click_far
        ));
    }
    if th.drag_engage >= th.drag_release {
        return Err(anyhow!(
            "thresholds.drag_engage ({}) must be below drag_release ({})",
            th.drag_engage,
            th.drag_release
        ));
    }
    if p.cursor.smoothing < 1.0 || p.controls.volume_smoothing < 1.0 {
        return Err(anyhow!("smoothing factors must be >= 1"));
    }
    if p.controls.distance_min >= p.controls.distance_max {
        return Err(anyhow!("controls.distance_min must be below distance_max"));
    }
    if p.screen.width == 0 || p.screen.height == 0 {
        return Err(anyhow!("screen size must be non-zero"));
    }
    for g in Gesture::DISCRETE {
        if p.cooldowns.for_gesture(g) == Some(0) {
            return Err(anyhow!("cooldown for {} must be positive", g.as_str()));
        }
    }

    for (k, v) in &p.bindings {
        if k.trim().is_empty() {
            return Err(anyhow!("empty binding key"));
        }
        if v.trim().is_empty() {
            return Err(anyhow!("binding '{}' has empty action", k));
        }

        let ok = ACTION_PREFIXES.iter().any(|pre| v.starts_with(pre))
            || v == "toggle"
            || v == "screenshot";
        if !ok {
            return Err(anyhow!("binding '{}' has invalid action '{}'", k, v));
        }
        if v.starts_with("cmd:") && !p.meta.allow_commands {
            return Err(anyhow!(
                "binding '{}' uses cmd: but allow_commands=false",
                k
            ));
        }
    }
    Ok(())
}

fn list_backlights() -> Vec<String> {
    let mut out = vec![];
    if let Ok(rd) = fs::read_dir("/sys/class/backlight") {
        for e in rd.flatten() {
            if let Some(name) = e.file_name().to_str() {
                out.push(name.to_string());
            }
        }
    }
    out.sort();
    out
}

fn find_in_path(bin: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(bin))
        .find(|p| p.is_file())
}

fn check_in_input_group() -> bool {
    if let Ok(s) = fs::read_to_string("/etc/group") {
        let user = whoami::username();
        for line in s.lines() {
            if line.starts_with("input:") {
                if line
                    .split(':')
                    .nth(3)
                    .unwrap_or("")
                    .split(',')
                    .any(|u| u == user)
                {
                    return true;
                }
            }
        }
    }
    false
}

/// Config state rooted in a fresh directory under the system temp dir.
#[cfg(test)]
pub(crate) fn scratch_state(tag: &str) -> DaemonConfigState {
    let root = env::temp_dir().join(format!("handctl-{tag}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&root);
    let profdir = root.join("profiles");
    fs::create_dir_all(&profdir).unwrap();
    fs::write(profdir.join("default.toml"), default_profile_text()).unwrap();
    let active_ptr = root.join("active");
    fs::write(&active_ptr, "default").unwrap();
    DaemonConfigState {
        active_name: "default".to_string(),
        profile: Profile::default(),
        config_dir: root,
        profiles_dir: profdir,
        active_ptr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_parses() {
        let p = Profile::from_toml(default_profile_text()).unwrap();
        assert_eq!(p.meta.name.as_deref(), Some("default"));
        assert_eq!(p.thresholds.click_near, 30.0);
        assert_eq!(p.thresholds.drag_release, 60.0);
        assert_eq!(p.binding_for(Gesture::TabChange), Some("key:CTRL+TAB"));
        assert_eq!(p.binding_for(Gesture::Screenshot), Some("screenshot"));
        assert_eq!(p.binding_for(Gesture::Move), None);
    }

    #[test]
    fn test_minimal_profile_uses_defaults() {
        let p = Profile::from_toml("[meta]\nname = \"bare\"\n").unwrap();
        assert_eq!(p.cursor.frame_margin, 100);
        assert_eq!(p.cooldowns.left_click, 200);
        assert_eq!(p.roles.policy, RolePolicy::Tracked);
        assert_eq!(p.thresholds.thumb_default, ThumbRule::Left);
        assert!(p.bindings.is_empty());
    }

    #[test]
    fn test_nested_bindings_flatten() {
        let txt = r#"
            [bindings.click]
            left = "mouse:left"
            [bindings.tab]
            next = "key:CTRL+TAB"
        "#;
        let p = Profile::from_toml(txt).unwrap();
        assert_eq!(p.bindings.get("click.left").map(String::as_str), Some("mouse:left"));
        assert_eq!(p.binding_for(Gesture::TabChange), Some("key:CTRL+TAB"));
    }

    #[test]
    fn test_non_string_binding_rejected() {
        let txt = "[bindings]\nscreenshot = 3\n";
        assert!(Profile::from_toml(txt).is_err());
    }

    #[test]
    fn test_drag_thresholds_must_be_ordered() {
        let txt = "[thresholds]\ndrag_engage = 60.0\ndrag_release = 60.0\n";
        let err = Profile::from_toml(txt).unwrap_err().to_string();
        assert!(err.contains("drag_engage"), "{err}");
    }

    #[test]
    fn test_click_thresholds_must_be_ordered() {
        let txt = "[thresholds]\nclick_near = 80.0\nclick_far = 50.0\n";
        assert!(Profile::from_toml(txt).is_err());
    }

    #[test]
    fn test_smoothing_below_one_rejected() {
        let txt = "[cursor]\nsmoothing = 0.5\n";
        assert!(Profile::from_toml(txt).is_err());
    }

    #[test]
    fn test_cmd_requires_allow_commands() {
        let txt = "[bindings]\nscreenshot = \"cmd:scrot\"\n";
        assert!(Profile::from_toml(txt).is_err());
        let txt = "[meta]\nallow_commands = true\n[bindings]\nscreenshot = \"cmd:scrot\"\n";
        assert!(Profile::from_toml(txt).is_ok());
    }

    #[test]
    fn test_unknown_action_rejected() {
        let txt = "[bindings.click]\nleft = \"teleport\"\n";
        assert!(Profile::from_toml(txt).is_err());
    }

    #[test]
    fn test_role_policy_parses() {
        let p = Profile::from_toml("[roles]\npolicy = \"list_order\"\n").unwrap();
        assert_eq!(p.roles.policy, RolePolicy::ListOrder);
    }

    #[test]
    fn test_cooldown_lookup() {
        let c = Cooldowns::default();
        assert_eq!(c.for_gesture(Gesture::Screenshot), Some(500));
        assert_eq!(c.for_gesture(Gesture::Move), None);
    }

    #[test]
    fn test_set_active_and_reload() {
        let mut st = scratch_state("use");
        let fast = default_profile_text().replace("smoothing = 5.0", "smoothing = 2.0");
        fs::write(st.profiles_dir.join("fast.toml"), fast).unwrap();

        assert_eq!(st.list_profiles(), vec!["default", "fast"]);
        st.set_active("fast").unwrap();
        assert_eq!(st.active_name, "fast");
        assert_eq!(st.profile.cursor.smoothing, 2.0);
        assert_eq!(fs::read_to_string(&st.active_ptr).unwrap(), "fast");

        assert!(st.set_active("missing").is_err());
        assert_eq!(st.active_name, "fast");
    }

    #[test]
    fn test_reload_keeps_last_good_profile() {
        let mut st = scratch_state("reload");
        fs::write(st.active_path(), "[thresholds]\ndrag_engage = 90.0\n").unwrap();
        assert!(st.reload().is_err());
        assert_eq!(st.profile.thresholds.drag_engage, 40.0);
    }
}
