use anyhow::{Result, anyhow};
use log::{info, warn};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl FromStr for MouseButton {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "middle" => Ok(Self::Middle),
            other => Err(anyhow!("unknown mouse button: {other}")),
        }
    }
}

/// Pointer, wheel and keyboard injection. Failures are reported, never fatal.
pub trait InputInjector {
    fn move_to(&mut self, x: i32, y: i32) -> Result<()>;
    fn press(&mut self, button: MouseButton) -> Result<()>;
    fn release(&mut self, button: MouseButton) -> Result<()>;
    fn scroll_vertical(&mut self, steps: i32) -> Result<()>;
    /// Send a chord like "CTRL+TAB" or a single "TAB"
    fn key_chord(&mut self, chord: &str) -> Result<()>;

    fn click(&mut self, button: MouseButton) -> Result<()> {
        self.press(button)?;
        self.release(button)
    }

    fn double_click(&mut self, button: MouseButton) -> Result<()> {
        self.click(button)?;
        self.click(button)
    }

    /// True when events go nowhere.
    fn is_noop(&self) -> bool {
        false
    }
}

pub struct UinputSink {
    #[allow(dead_code)]
    linux: Option<Box<LinuxUinput>>,
}

impl UinputSink {
    /// `screen` sets the range of the absolute pointer axes.
    pub fn new(screen: (u32, u32)) -> Result<Self> {
        #[cfg(target_os = "linux")]
        {
            let dev = LinuxUinput::create(screen)?;
            return Ok(Self {
                linux: Some(Box::new(dev)),
            });
        }
        #[allow(unreachable_code)]
        {
            let _ = screen;
            warn!("uinput not available; running in NO-OP mode");
            Ok(Self { linux: None })
        }
    }

    pub fn noop() -> Self {
        Self { linux: None }
    }
}

impl InputInjector for UinputSink {
    fn is_noop(&self) -> bool {
        self.linux.is_none()
    }

    fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            dev.move_abs(x, y)?;
        }
        #[cfg(not(target_os = "linux"))]
        let _ = (x, y);
        Ok(())
    }

    fn press(&mut self, button: MouseButton) -> Result<()> {
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            dev.button(button, 1)?;
        }
        #[cfg(not(target_os = "linux"))]
        let _ = button;
        Ok(())
    }

    fn release(&mut self, button: MouseButton) -> Result<()> {
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            dev.button(button, 0)?;
        }
        #[cfg(not(target_os = "linux"))]
        let _ = button;
        Ok(())
    }

    fn scroll_vertical(&mut self, steps: i32) -> Result<()> {
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            dev.scroll_vertical(steps)?;
        }
        #[cfg(not(target_os = "linux"))]
        let _ = steps;
        Ok(())
    }

    fn key_chord(&mut self, chord: &str) -> Result<()> {
        let parts = parse_chord(chord)?;
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            let mut keys = Vec::with_capacity(parts.len());
            for p in &parts {
                keys.push(map_key(p)?);
            }
            // press in order
            for k in &keys {
                dev.key_send(*k, 1)?;
            }
            dev.sync()?;
            // release in reverse
            for k in keys.iter().rev() {
                dev.key_send(*k, 0)?;
            }
            dev.sync()?;
        }
        #[cfg(not(target_os = "linux"))]
        let _ = parts;
        Ok(())
    }
}

/// Split "ctrl + tab" into upper-cased tokens ["CTRL", "TAB"].
pub fn parse_chord(chord: &str) -> Result<Vec<String>> {
    let parts: Vec<String> = chord
        .split('+')
        .map(|s| s.trim().to_ascii_uppercase())
        .collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(anyhow!("malformed key chord: '{chord}'"));
    }
    Ok(parts)
}

#[cfg(target_os = "linux")]
fn map_key(tok: &str) -> Result<uinput::event::keyboard::Key> {
    use uinput::event::keyboard::Key as K;
    let k = match tok {
        "CTRL" | "CONTROL" => K::LeftControl,
        "ALT" => K::LeftAlt,
        "SHIFT" => K::LeftShift,
        "SUPER" | "META" | "WIN" => K::LeftMeta,
        "TAB" => K::Tab,
        "ESC" | "ESCAPE" => K::Esc,
        "ENTER" | "RETURN" => K::Enter,
        "SPACE" => K::Space,
        "UP" => K::Up,
        "DOWN" => K::Down,
        "LEFT" => K::Left,
        "RIGHT" => K::Right,
        "MINUS" | "-" => K::Minus,
        "EQUAL" | "=" => K::Equal,
        "A" => K::A,
        "C" => K::C,
        "D" => K::D,
        "F" => K::F,
        "N" => K::N,
        "Q" => K::Q,
        "R" => K::R,
        "T" => K::T,
        "V" => K::V,
        "W" => K::W,
        "X" => K::X,
        "Z" => K::Z,
        "F4" => K::F4,
        "F5" => K::F5,
        "F11" => K::F11,
        other => return Err(anyhow!("unsupported key token: {other}")),
    };
    Ok(k)
}

#[cfg(target_os = "linux")]
struct LinuxUinput {
    dev: uinput::device::Device,
}

#[cfg(target_os = "linux")]
impl LinuxUinput {
    fn create(screen: (u32, u32)) -> Result<Self> {
        use uinput::event::{Keyboard, absolute, controller::Mouse, relative};

        let dev = uinput::default()?
            .name("Handctl Virtual Input")?
            // absolute pointer spanning the screen
            .event(absolute::Position::X)?
            .min(0)
            .max(screen.0 as i32)
            .event(absolute::Position::Y)?
            .min(0)
            .max(screen.1 as i32)
            // wheel
            .event(relative::Wheel::Vertical)?
            // mouse buttons
            .event(Mouse::Left)?
            .event(Mouse::Right)?
            .event(Mouse::Middle)?
            // keys for chords
            .event(Keyboard::All)?
            .create()?;

        info!(
            "uinput: created virtual device ({}x{} absolute)",
            screen.0, screen.1
        );
        Ok(Self { dev })
    }

    fn sync(&mut self) -> Result<()> {
        self.dev.synchronize()?;
        Ok(())
    }

    fn key_send(&mut self, key: uinput::event::keyboard::Key, val: i32) -> Result<()> {
        self.dev.send(key, val)?;
        Ok(())
    }

    fn move_abs(&mut self, x: i32, y: i32) -> Result<()> {
        use uinput::event::absolute::Position;
        self.dev.send(Position::X, x)?;
        self.dev.send(Position::Y, y)?;
        self.sync()
    }

    fn button(&mut self, button: MouseButton, val: i32) -> Result<()> {
        use uinput::event::controller::Mouse;
        let m = match button {
            MouseButton::Left => Mouse::Left,
            MouseButton::Right => Mouse::Right,
            MouseButton::Middle => Mouse::Middle,
        };
        self.dev.send(m, val)?;
        self.sync()
    }

    fn scroll_vertical(&mut self, steps: i32) -> Result<()> {
        use uinput::event::relative::Wheel;
        self.dev.send(Wheel::Vertical, steps)?;
        self.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mouse_button_parse() {
        assert_eq!("Left".parse::<MouseButton>().unwrap(), MouseButton::Left);
        assert_eq!(" right ".parse::<MouseButton>().unwrap(), MouseButton::Right);
        assert!("thumb".parse::<MouseButton>().is_err());
    }

    #[test]
    fn test_parse_chord() {
        assert_eq!(parse_chord("ctrl + tab").unwrap(), vec!["CTRL", "TAB"]);
        assert_eq!(parse_chord("SUPER+D").unwrap(), vec!["SUPER", "D"]);
        assert!(parse_chord("CTRL+").is_err());
    }

    #[test]
    fn test_noop_sink_accepts_everything() {
        let mut sink = UinputSink::noop();
        assert!(sink.is_noop());
        sink.move_to(10, 10).unwrap();
        sink.double_click(MouseButton::Left).unwrap();
        sink.scroll_vertical(-3).unwrap();
        sink.key_chord("CTRL+W").unwrap();
    }

    #[test]
    fn test_malformed_chord_rejected_even_when_noop() {
        let mut sink = UinputSink::noop();
        assert!(sink.key_chord("CTRL++W").is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_map_key() {
        assert!(map_key("CTRL").is_ok());
        assert!(map_key("UP").is_ok());
        assert!(map_key("HYPER").is_err());
    }
}
