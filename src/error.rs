use std::path::PathBuf;

use thiserror::Error;

use crate::player::AudioBackend;

#[derive(Debug, Error)]
pub enum AutodialError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Actuator error: {0}")]
    Actuator(#[from] ActuatorError),

    #[error("Work list error: {0}")]
    WorkList(#[from] WorkListError),

    #[error("Run controller error: {0}")]
    Controller(#[from] ControllerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("`{program}` not found on PATH: {source}")]
    Unavailable {
        program: &'static str,
        #[source]
        source: which::Error,
    },

    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{action} exited with status {code:?}")]
    Exit { action: String, code: Option<i32> },

    /// Raised by actuators that are not backed by a process.
    #[error("{0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("audio backend {backend} unavailable: `{program}` not found: {source}")]
    BackendUnavailable {
        backend: AudioBackend,
        program: &'static str,
        #[source]
        source: which::Error,
    },

    #[error("audio file not found: {0}")]
    MissingFile(PathBuf),

    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with status {code:?} while playing {path}")]
    Exit {
        program: String,
        path: PathBuf,
        code: Option<i32>,
    },

    /// Raised by players that are not backed by a process.
    #[error("{0}")]
    Failed(String),
}

/// Run-level failures: anything that stops the item loop from starting.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cannot start audio player: {0}")]
    Player(#[from] PlayerError),
}

#[derive(Debug, Error)]
pub enum WorkListError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported work list format for {0} (expected .json or .toml)")]
    UnsupportedFormat(PathBuf),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("work list {0} is empty")]
    EmptySource(PathBuf),

    #[error("work list {0} has no row with both a phone number and an audio path")]
    NoValidRows(PathBuf),
}

/// A persisted status cell holds a value no `ItemStatus` renders as.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown status '{0}'")]
pub struct UnknownStatus(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown audio backend '{0}' (expected vlc, ffplay, system or silent)")]
pub struct UnknownBackend(pub String);

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("no async runtime available to host the worker")]
    NoRuntime,

    #[error("worker thread failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
