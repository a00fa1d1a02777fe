use std::path::PathBuf;

use thiserror::Error;

use crate::codec::Header;

/// Structural failures while decoding a persisted record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("record is truncated")]
    Truncated,

    #[error("incompatible record header (magic {:#010x}, version {}.{}.{})",
        .found.magic, .found.major, .found.minor, .found.patch)]
    VersionMismatch { found: Header },

    #[error("malformed record: {0}")]
    Malformed(String),
}

/// Failures surfaced by the persistence gateway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistError {
    #[error("{path}: incompatible game file version")]
    VersionMismatch { path: PathBuf },

    #[error("{path}: game file is truncated")]
    Truncated { path: PathBuf },

    #[error("{path}: malformed game file: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("{path}: game file holds out-of-range values: {reason}")]
    InvalidRecord { path: PathBuf, reason: String },

    #[error("failed to write {path}: {reason}")]
    WriteFailed { path: PathBuf, reason: String },

    #[error("failed to read {path}: {reason}")]
    ReadFailed { path: PathBuf, reason: String },

    /// A worker tried to reach outside its grant. Unreachable in correct code.
    #[error("sandbox violation in worker for {path}: {reason}")]
    SandboxViolation { path: PathBuf, reason: String },

    #[error("worker for {path} did not respond within {timeout_ms} ms")]
    WorkerUnresponsive { path: PathBuf, timeout_ms: u64 },
}

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("Operation '{operation}' is not allowed in phase {phase:?}")]
    InvalidPhase {
        operation: &'static str,
        phase: crate::engine::Phase,
    },

    #[error("Tool index {index} is not in the catalog")]
    UnknownTool { index: usize },

    #[error("Creature index {index} is not in the catalog")]
    UnknownCreature { index: usize },

    #[error("The creature catalog is empty")]
    EmptyCatalog,

    #[error("Invalid player name: {0}")]
    InvalidName(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type SimResult<T> = Result<T, SimError>;
