//! Work lists stored as JSON or TOML documents.
//!
//! ```toml
//! [[rows]]
//! phone = "5550100"
//! audio = "clips/reminder.wav"
//! status = "DONE"
//! last_updated = "2024-05-01 09:30:12"
//! ```
//!
//! Rows missing a phone number or an audio path are skipped on load and kept
//! as they are on save. Saving replaces the file in one step, through a
//! temporary file in the same directory.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::WorkListError;
use crate::state_machine::{ItemStatus, WorkItem};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Persists the items of a finished run.
pub trait WorkListSink: Send + Sync {
    fn save(&self, items: &[WorkItem]) -> Result<(), WorkListError>;
}

/// Keeps nothing. Used when a run has no backing file.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardSink;

impl WorkListSink for DiscardSink {
    fn save(&self, items: &[WorkItem]) -> Result<(), WorkListError> {
        tracing::debug!(rows = items.len(), "results discarded");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Toml,
}

impl Format {
    fn from_path(path: &Path) -> Result<Self, WorkListError> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("json") => Ok(Format::Json),
            Some("toml") => Ok(Format::Toml),
            _ => Err(WorkListError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Row {
    #[serde(default)]
    phone: String,
    #[serde(default)]
    audio: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    last_updated: String,
}

impl Row {
    fn from_item(item: &WorkItem) -> Self {
        Self {
            phone: item.phone.clone(),
            audio: item.audio_path.clone(),
            status: item.status.to_string(),
            last_updated: item
                .last_updated
                .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
                .unwrap_or_default(),
        }
    }

    fn is_usable(&self) -> bool {
        !self.phone.trim().is_empty() && !self.audio.trim().is_empty()
    }

    fn into_item(self, line: usize) -> Option<WorkItem> {
        if !self.is_usable() {
            tracing::debug!(row = line, "skipping row without phone or audio");
            return None;
        }

        let mut item = WorkItem::new(self.phone.trim(), self.audio.trim());
        item.status = self.status.parse().unwrap_or_else(|e| {
            tracing::warn!(row = line, error = %e, "treating row as pending");
            ItemStatus::Pending
        });
        let stamp = self.last_updated.trim();
        if !stamp.is_empty() {
            item.last_updated = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
                .ok()
                .and_then(|t| t.and_local_timezone(Local).earliest());
            if item.last_updated.is_none() {
                tracing::warn!(row = line, stamp, "ignoring unreadable timestamp");
            }
        }
        Some(item)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    rows: Vec<Row>,
}

/// A work list backed by a file on disk.
#[derive(Debug, Clone)]
pub struct WorkListFile {
    path: PathBuf,
    format: Format,
}

impl WorkListFile {
    /// Picks the format from the file extension. The file is not read yet.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, WorkListError> {
        let path = path.into();
        let format = Format::from_path(&path)?;
        Ok(Self { path, format })
    }

    fn io_error(&self, source: std::io::Error) -> WorkListError {
        WorkListError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn read_document(&self) -> Result<Document, WorkListError> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        if contents.trim().is_empty() {
            return Err(WorkListError::EmptySource(self.path.clone()));
        }
        Ok(match self.format {
            Format::Json => serde_json::from_str(&contents)?,
            Format::Toml => toml::from_str(&contents)?,
        })
    }

    /// Reads the usable rows in file order.
    pub fn load(&self) -> Result<Vec<WorkItem>, WorkListError> {
        let document = self.read_document()?;
        if document.rows.is_empty() {
            return Err(WorkListError::EmptySource(self.path.clone()));
        }

        let items: Vec<WorkItem> = document
            .rows
            .into_iter()
            .enumerate()
            .filter_map(|(i, row)| row.into_item(i + 1))
            .collect();
        if items.is_empty() {
            return Err(WorkListError::NoValidRows(self.path.clone()));
        }

        tracing::info!(rows = items.len(), path = %self.path.display(), "work list loaded");
        Ok(items)
    }

    /// Lays `items` over the usable rows of the file on disk, in order, and
    /// keeps the unusable ones where they were. Items beyond the file's rows
    /// are appended.
    fn merge_rows(&self, items: &[WorkItem]) -> Vec<Row> {
        let existing = match self.read_document() {
            Ok(document) => document.rows,
            Err(e) => {
                tracing::debug!(error = %e, "no readable rows to keep");
                Vec::new()
            }
        };

        let mut items = items.iter();
        let mut rows: Vec<Row> = existing
            .into_iter()
            .filter_map(|row| {
                if row.is_usable() {
                    items.next().map(Row::from_item)
                } else {
                    Some(row)
                }
            })
            .collect();
        rows.extend(items.map(Row::from_item));
        rows
    }

    fn replace_contents(&self, contents: &str) -> Result<(), WorkListError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir).map_err(|e| self.io_error(e))?;
        file.write_all(contents.as_bytes())
            .and_then(|()| file.as_file().sync_all())
            .map_err(|e| self.io_error(e))?;
        file.persist(&self.path)
            .map_err(|e| self.io_error(e.error))?;
        Ok(())
    }
}

impl WorkListSink for WorkListFile {
    fn save(&self, items: &[WorkItem]) -> Result<(), WorkListError> {
        let document = Document {
            rows: self.merge_rows(items),
        };
        let contents = match self.format {
            Format::Json => serde_json::to_string_pretty(&document)?,
            Format::Toml => toml::to_string_pretty(&document)?,
        };
        self.replace_contents(&contents)?;
        tracing::info!(rows = items.len(), path = %self.path.display(), "work list saved");
        Ok(())
    }
}
