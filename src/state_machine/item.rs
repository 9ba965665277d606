use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::UnknownStatus;

/// Persisted outcome of a work item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemStatus {
    #[default]
    Pending,
    Running,
    Done,
    Failed,
}

impl ItemStatus {
    /// `Done` and `Failed` are the only states an item leaves a run in once touched.
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Done | ItemStatus::Failed)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemStatus::Pending => write!(f, "PENDING"),
            ItemStatus::Running => write!(f, "RUNNING"),
            ItemStatus::Done => write!(f, "DONE"),
            ItemStatus::Failed => write!(f, "FAILED"),
        }
    }
}

impl FromStr for ItemStatus {
    type Err = UnknownStatus;

    /// Case-insensitive; an empty cell means the row was never processed.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "pending" => Ok(ItemStatus::Pending),
            "running" => Ok(ItemStatus::Running),
            "done" => Ok(ItemStatus::Done),
            "failed" => Ok(ItemStatus::Failed),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// One row of the work list: a number to dial and the clip to play into the call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub phone: String,
    pub audio_path: String,
    pub status: ItemStatus,
    pub last_updated: Option<DateTime<Local>>,
}

impl WorkItem {
    pub fn new(phone: impl Into<String>, audio_path: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            audio_path: audio_path.into(),
            status: ItemStatus::Pending,
            last_updated: None,
        }
    }

    /// Marks the item as being worked on. The timestamp is left alone until
    /// the item settles.
    pub fn begin(&mut self) {
        self.status = ItemStatus::Running;
    }

    /// Records the terminal status of this run and stamps it.
    pub fn settle(&mut self, status: ItemStatus) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.last_updated = Some(Local::now());
    }

    /// Puts a previously processed item back in the queue for a fresh run.
    pub fn reset(&mut self) {
        self.status = ItemStatus::Pending;
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// Every item was considered.
    Completed,
    /// A stop request was observed at an item boundary.
    Cancelled,
    /// The run never reached the item loop.
    Aborted(String),
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::Cancelled => write!(f, "cancelled"),
            RunOutcome::Aborted(reason) => write!(f, "aborted: {reason}"),
        }
    }
}

/// Structured record produced when a run finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    pub done: usize,
    pub failed: usize,
    pub pending: usize,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub duration_ms: i64,
    pub items: Vec<WorkItem>,
}

impl RunReport {
    /// Tally the items handed back by the engine.
    pub fn from_items(
        run_id: Uuid,
        outcome: RunOutcome,
        started_at: DateTime<Local>,
        items: Vec<WorkItem>,
    ) -> Self {
        let now = Local::now();
        let count = |status: ItemStatus| items.iter().filter(|i| i.status == status).count();

        Self {
            run_id,
            outcome,
            done: count(ItemStatus::Done),
            failed: count(ItemStatus::Failed),
            pending: count(ItemStatus::Pending),
            started_at,
            finished_at: now,
            duration_ms: (now - started_at).num_milliseconds(),
            items,
        }
    }
}
