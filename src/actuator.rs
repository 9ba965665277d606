//! Desktop control surface used to operate the dialer application.

use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::ActuatorError;

/// Screen coordinate in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
}

impl Key {
    fn keysym(self) -> &'static str {
        match self {
            Key::Enter => "Return",
        }
    }
}

/// One recorded interaction with the desktop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Click(Point),
    Type(String),
    Press(Key),
}

/// Synchronous control of the pointer and keyboard.
pub trait Actuator: Send {
    fn click(&mut self, at: Point) -> Result<(), ActuatorError>;
    fn type_text(&mut self, text: &str) -> Result<(), ActuatorError>;
    fn press_key(&mut self, key: Key) -> Result<(), ActuatorError>;
}

const XDOTOOL: &str = "xdotool";

/// Drives an X11 desktop through the `xdotool` program.
#[derive(Debug, Clone)]
pub struct XdotoolActuator {
    program: PathBuf,
}

impl XdotoolActuator {
    /// Locates `xdotool` on `PATH`.
    pub fn new() -> Result<Self, ActuatorError> {
        let program = which::which(XDOTOOL).map_err(|source| ActuatorError::Unavailable {
            program: XDOTOOL,
            source,
        })?;
        Ok(Self { program })
    }

    fn exec(&self, action: &str, args: &[&str]) -> Result<(), ActuatorError> {
        tracing::debug!(action, ?args, "xdotool");
        let status = Command::new(&self.program)
            .args(args)
            .status()
            .map_err(|source| ActuatorError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;
        if !status.success() {
            return Err(ActuatorError::Exit {
                action: action.to_string(),
                code: status.code(),
            });
        }
        Ok(())
    }
}

impl Actuator for XdotoolActuator {
    fn click(&mut self, at: Point) -> Result<(), ActuatorError> {
        let (x, y) = (at.x.to_string(), at.y.to_string());
        self.exec("click", &["mousemove", "--sync", &x, &y, "click", "1"])
    }

    fn type_text(&mut self, text: &str) -> Result<(), ActuatorError> {
        if text.is_empty() {
            return Err(ActuatorError::Rejected("nothing to type".to_string()));
        }
        self.exec("type", &["type", "--", text])
    }

    fn press_key(&mut self, key: Key) -> Result<(), ActuatorError> {
        self.exec("key", &["key", key.keysym()])
    }
}

/// Records actions instead of performing them.
///
/// The journal is shared, so a clone taken before the actuator is handed to
/// a worker still sees everything it records.
#[derive(Debug, Clone, Default)]
pub struct DryRunActuator {
    journal: Arc<Mutex<Vec<Action>>>,
}

impl DryRunActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<Action> {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, action: Action) {
        tracing::info!(?action, "dry run");
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(action);
    }
}

impl Actuator for DryRunActuator {
    fn click(&mut self, at: Point) -> Result<(), ActuatorError> {
        self.record(Action::Click(at));
        Ok(())
    }

    fn type_text(&mut self, text: &str) -> Result<(), ActuatorError> {
        self.record(Action::Type(text.to_string()));
        Ok(())
    }

    fn press_key(&mut self, key: Key) -> Result<(), ActuatorError> {
        self.record(Action::Press(key));
        Ok(())
    }
}
