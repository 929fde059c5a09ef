use std::time::Duration;

use crate::agent::actions::{Action, ActionKind};
use crate::errors::PilotResult;
use crate::executor::input::InputDriver;
use crate::executor::safety;

const MOVE_DURATION: Duration = Duration::from_millis(200);
const ORBIT_STEPS: u32 = 12;
const ORBIT_STEP_DURATION: Duration = Duration::from_millis(40);
const ORBIT_RADIUS: f64 = 50.0;
const CHORD_HOLD: Duration = Duration::from_millis(100);

/// What happened to one action. The caller decides how loudly to log; nothing
/// here aborts the batch or the run.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecOutcome {
    Completed,
    /// A `write` hit the safety denylist; zero keystrokes were emitted.
    Blocked { pattern: &'static str },
    /// The platform binding failed mid-action.
    Failed { reason: String },
}

/// Executes validated actions against the OS. Fire-and-forget: no operation
/// verifies its effect on screen.
pub struct Executor<D: InputDriver> {
    driver: D,
    write_filter_enabled: bool,
}

impl<D: InputDriver> Executor<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            write_filter_enabled: true,
        }
    }

    pub fn with_write_filter(driver: D, enabled: bool) -> Self {
        Self {
            driver,
            write_filter_enabled: enabled,
        }
    }

    pub fn execute(&mut self, action: &Action) -> ExecOutcome {
        match &action.kind {
            ActionKind::Click { x, y } => self.click(*x, *y),
            ActionKind::Write { content } => self.write(content),
            ActionKind::Press { keys } => self.press(keys),
            // `done` terminates the loop upstream; nothing reaches the OS.
            ActionKind::Done { .. } => ExecOutcome::Completed,
        }
    }

    /// Converts fraction coordinates to pixels, homes the pointer with a
    /// visible orbit around the target, then clicks. Out-of-range fractions
    /// are clamped into [0,1].
    pub fn click(&mut self, x_frac: f64, y_frac: f64) -> ExecOutcome {
        let (width, height) = match self.driver.screen_size() {
            Ok(size) => size,
            Err(e) => {
                return ExecOutcome::Failed {
                    reason: format!("screen size unavailable: {e}"),
                }
            }
        };

        let px = (width as f64 * x_frac.clamp(0.0, 1.0)).round() as i32;
        let py = (height as f64 * y_frac.clamp(0.0, 1.0)).round() as i32;

        match self.homed_click(px, py) {
            Ok(()) => ExecOutcome::Completed,
            Err(e) => ExecOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }

    fn homed_click(&mut self, px: i32, py: i32) -> PilotResult<()> {
        self.driver.move_to(px, py, MOVE_DURATION)?;
        for step in 0..ORBIT_STEPS {
            let angle = step as f64 / ORBIT_STEPS as f64 * std::f64::consts::TAU;
            let ox = px + (angle.cos() * ORBIT_RADIUS).round() as i32;
            let oy = py + (angle.sin() * ORBIT_RADIUS).round() as i32;
            self.driver.move_to(ox, oy, ORBIT_STEP_DURATION)?;
        }
        self.driver.click(px, py)
    }

    /// Types `text` one character at a time. The safety filter runs before
    /// any keystroke; on a denylist hit nothing at all is emitted. Literal
    /// `\n` escape sequences become real newlines.
    pub fn write(&mut self, text: &str) -> ExecOutcome {
        if self.write_filter_enabled {
            if let Some(pattern) = safety::blocked_write_pattern(text) {
                return ExecOutcome::Blocked { pattern };
            }
        }

        let normalized = text.replace("\\n", "\n");
        for ch in normalized.chars() {
            if let Err(e) = self.driver.type_char(ch) {
                return ExecOutcome::Failed {
                    reason: format!("typing failed at {ch:?}: {e}"),
                };
            }
        }
        ExecOutcome::Completed
    }

    /// Presses `keys` as a chord: all key-downs in order, a short hold, then
    /// key-ups in the same order. A key the platform doesn't know is logged
    /// and skipped; keys already down still get released.
    pub fn press(&mut self, keys: &[String]) -> ExecOutcome {
        let mut held: Vec<&str> = Vec::with_capacity(keys.len());
        for key in keys {
            match self.driver.key_down(key) {
                Ok(()) => held.push(key),
                Err(e) => tracing::warn!(key = %key, error = %e, "key down failed, skipping"),
            }
        }

        std::thread::sleep(CHORD_HOLD);

        for key in &held {
            if let Err(e) = self.driver.key_up(key) {
                tracing::warn!(key = %key, error = %e, "key up failed");
            }
        }

        if held.is_empty() {
            ExecOutcome::Failed {
                reason: "no key in the chord could be pressed".into(),
            }
        } else {
            ExecOutcome::Completed
        }
    }
}
