//! Progress events emitted during a run.
//!
//! The engine and the run controller report through an [`EventSink`]. Each
//! [`Event`] carries the local time it was created and renders as a
//! `[YYYY-mm-dd HH:MM:SS] message` line. [`EventLog`] keeps the accumulated
//! lines for readers on other threads.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Local};
use uuid::Uuid;

use crate::state_machine::RunOutcome;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    RunStarted { run_id: Uuid, total: usize },
    Dialing { index: usize, phone: String },
    Playing { index: usize, audio_path: String },
    HungUp { index: usize },
    ItemFailed { index: usize, error: String },
    RunAborted { error: String },
    Saved { rows: usize },
    SaveFailed { error: String },
    RunCompleted { outcome: RunOutcome, done: usize, failed: usize, pending: usize },
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::RunStarted { total, .. } => write!(f, "Automation started ({total} rows)"),
            EventKind::Dialing { phone, .. } => write!(f, "Dialing {phone}"),
            EventKind::Playing { audio_path, .. } => write!(f, "Playing {audio_path}"),
            EventKind::HungUp { .. } => write!(f, "Hung up"),
            EventKind::ItemFailed { error, .. } | EventKind::RunAborted { error } => {
                write!(f, "Error: {error}")
            }
            EventKind::Saved { rows } => write!(f, "Saved {rows} rows"),
            EventKind::SaveFailed { error } => write!(f, "Save failed: {error}"),
            EventKind::RunCompleted {
                outcome,
                done,
                failed,
                pending,
            } => write!(
                f,
                "Automation finished ({outcome}): {done} done, {failed} failed, {pending} pending"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub at: DateTime<Local>,
    pub kind: EventKind,
}

impl Event {
    pub fn now(kind: EventKind) -> Self {
        Self {
            at: Local::now(),
            kind,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at.format(TIMESTAMP_FORMAT), self.kind)
    }
}

/// Receiver of progress events. Called from the worker thread.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: Event) {
        (**self).emit(event);
    }
}

/// Forwards every event to two sinks, left first.
pub struct Tee<A, B>(pub A, pub B);

impl<A: EventSink, B: EventSink> EventSink for Tee<A, B> {
    fn emit(&self, event: Event) {
        self.0.emit(event.clone());
        self.1.emit(event);
    }
}

/// Append-only, in-order record of everything emitted during a run.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<Event>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the events recorded so far.
    pub fn snapshot(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The recorded events rendered as timestamped lines.
    pub fn lines(&self) -> Vec<String> {
        self.snapshot().iter().map(ToString::to_string).collect()
    }

    #[cfg(test)]
    pub fn kinds(&self) -> Vec<EventKind> {
        self.snapshot().into_iter().map(|e| e.kind).collect()
    }
}

impl EventSink for EventLog {
    fn emit(&self, event: Event) {
        tracing::debug!(event = %event.kind, "progress");
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
