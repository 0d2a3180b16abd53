//! Core error types for duos-core.
//!
//! This module defines the error hierarchy using thiserror. Validation
//! errors (invalid overrides) are returned synchronously to the caller;
//! a too-small pool is not an error but a run status, reported through
//! `RunStats` and logging.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for duos-core.
#[derive(Error, Debug)]
pub enum EngineError {
    /// An admin override violated a pairing invariant
    #[error("invalid override: {0}")]
    InvalidOverride(String),

    /// A reshuffle is already running, or a pointer update raced
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// The weekly run exceeded its bounded timeout
    #[error("reshuffle run timed out after {timeout_secs} seconds")]
    RunTimeout { timeout_secs: u64 },

    /// Storage-related errors
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open the database
    #[error("failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// The same unordered pair was already recorded for this week
    #[error("pairing of {member1} and {member2} already recorded for week {week}/{year}")]
    DuplicatePairing {
        member1: String,
        member2: String,
        week: u32,
        year: i32,
    },

    /// No member with the given id exists
    #[error("unknown member: {0}")]
    UnknownMember(String),

    /// A partner pointer changed under a guarded commit
    #[error("member {0} was paired concurrently")]
    PointerRace(String),

    /// Query execution failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked {
                    StorageError::Locked
                } else {
                    StorageError::QueryFailed(err.to_string())
                }
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::Storage(err.into())
    }
}

/// Result type alias for EngineError
pub type Result<T, E = EngineError> = std::result::Result<T, E>;
