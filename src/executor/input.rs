use std::time::Duration;

use enigo::{Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};

use crate::errors::{PilotError, PilotResult};

/// OS-level pointer and keyboard primitives. The executor speaks this trait
/// so the platform binding stays swappable and tests can record events
/// instead of moving a real cursor.
pub trait InputDriver {
    /// Current display resolution as (width, height) in pixels.
    fn screen_size(&mut self) -> PilotResult<(u32, u32)>;
    /// Move the pointer to absolute pixel coordinates over `duration`.
    fn move_to(&mut self, x: i32, y: i32, duration: Duration) -> PilotResult<()>;
    /// Left-click at absolute pixel coordinates.
    fn click(&mut self, x: i32, y: i32) -> PilotResult<()>;
    fn key_down(&mut self, key: &str) -> PilotResult<()>;
    fn key_up(&mut self, key: &str) -> PilotResult<()>;
    fn type_char(&mut self, ch: char) -> PilotResult<()>;
}

/// Production driver on top of enigo.
pub struct EnigoDriver {
    enigo: Enigo,
}

impl EnigoDriver {
    pub fn new() -> PilotResult<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| PilotError::Executor(format!("input backend init failed: {e}")))?;
        Ok(Self { enigo })
    }

    fn key_for(&self, name: &str) -> PilotResult<Key> {
        named_key(name).ok_or_else(|| PilotError::Executor(format!("unknown key name: {name}")))
    }
}

impl InputDriver for EnigoDriver {
    fn screen_size(&mut self) -> PilotResult<(u32, u32)> {
        let (w, h) = self
            .enigo
            .main_display()
            .map_err(|e| PilotError::Executor(format!("display size unavailable: {e}")))?;
        Ok((w.max(0) as u32, h.max(0) as u32))
    }

    fn move_to(&mut self, x: i32, y: i32, duration: Duration) -> PilotResult<()> {
        if duration.is_zero() {
            return self
                .enigo
                .move_mouse(x, y, Coordinate::Abs)
                .map_err(|e| PilotError::Executor(e.to_string()));
        }

        // interpolate in ~10ms ticks so the motion is visible
        let (sx, sy) = self
            .enigo
            .location()
            .map_err(|e| PilotError::Executor(e.to_string()))?;
        let steps = (duration.as_millis() / 10).max(1) as u32;
        for step in 1..=steps {
            let t = step as f64 / steps as f64;
            let ix = sx + ((x - sx) as f64 * t).round() as i32;
            let iy = sy + ((y - sy) as f64 * t).round() as i32;
            self.enigo
                .move_mouse(ix, iy, Coordinate::Abs)
                .map_err(|e| PilotError::Executor(e.to_string()))?;
            std::thread::sleep(Duration::from_millis(10));
        }
        Ok(())
    }

    fn click(&mut self, x: i32, y: i32) -> PilotResult<()> {
        self.enigo
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(|e| PilotError::Executor(e.to_string()))?;
        self.enigo
            .button(Button::Left, Direction::Click)
            .map_err(|e| PilotError::Executor(e.to_string()))
    }

    fn key_down(&mut self, key: &str) -> PilotResult<()> {
        let key = self.key_for(key)?;
        self.enigo
            .key(key, Direction::Press)
            .map_err(|e| PilotError::Executor(e.to_string()))
    }

    fn key_up(&mut self, key: &str) -> PilotResult<()> {
        let key = self.key_for(key)?;
        self.enigo
            .key(key, Direction::Release)
            .map_err(|e| PilotError::Executor(e.to_string()))
    }

    fn type_char(&mut self, ch: char) -> PilotResult<()> {
        match ch {
            '\n' => self
                .enigo
                .key(Key::Return, Direction::Click)
                .map_err(|e| PilotError::Executor(e.to_string())),
            '\t' => self
                .enigo
                .key(Key::Tab, Direction::Click)
                .map_err(|e| PilotError::Executor(e.to_string())),
            _ => self
                .enigo
                .text(&ch.to_string())
                .map_err(|e| PilotError::Executor(e.to_string())),
        }
    }
}

/// Maps the key names the model vocabulary uses onto enigo keys. A single
/// character falls through as a literal key; anything else unrecognized is
/// the platform binding's problem and reported as an error upstream.
fn named_key(name: &str) -> Option<Key> {
    let lower = name.to_ascii_lowercase();
    let key = match lower.as_str() {
        "cmd" | "command" | "super" | "win" | "meta" => Key::Meta,
        "ctrl" | "control" => Key::Control,
        "alt" | "option" => Key::Alt,
        "shift" => Key::Shift,
        "enter" | "return" => Key::Return,
        "space" => Key::Space,
        "tab" => Key::Tab,
        "esc" | "escape" => Key::Escape,
        "backspace" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" => Key::PageUp,
        "pagedown" => Key::PageDown,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        _ => {
            let mut chars = lower.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Key::Unicode(c),
                _ => return None,
            }
        }
    };
    Some(key)
}
