//! Core error types for habitroom-core.
//!
//! This module defines the error hierarchy using thiserror. Engine operations
//! return [`HabitError`]; storage, configuration and input validation each have
//! their own enum that converts into it.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

use crate::habit::HabitId;

/// Core error type for habitroom-core.
#[derive(Error, Debug)]
pub enum HabitError {
    /// Input rejected before any ledger access
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Habit does not exist or belongs to another owner
    #[error("Habit '{0}' not found")]
    HabitNotFound(HabitId),

    /// No record stored for the given day
    #[error("No record for habit '{habit_id}' on {date}")]
    RecordNotFound { habit_id: HabitId, date: NaiveDate },

    /// The date is not an obligated day for the habit
    #[error("{date} is not an obligated day for habit '{habit_id}'")]
    ObligationMismatch { habit_id: HabitId, date: NaiveDate },

    /// Another writer holds the habit's ledger; the caller should retry
    #[error("Habit '{habit_id}' is being modified concurrently, retry the operation")]
    Conflict { habit_id: HabitId },

    /// Ledger failure while replaying the streak; nothing was persisted
    #[error("Streak recalculation failed for habit '{habit_id}': {source}")]
    RecalculationFailed {
        habit_id: HabitId,
        #[source]
        source: DatabaseError,
    },

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HabitError {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HabitError::Conflict { .. })
    }

    /// Re-tag a lock failure as a conflict on `habit_id`.
    pub(crate) fn for_habit(self, habit_id: &str) -> Self {
        match self {
            HabitError::Database(DatabaseError::Locked) => HabitError::Conflict {
                habit_id: habit_id.to_string(),
            },
            other => other,
        }
    }

    /// Classify a ledger failure raised while the streak was being replayed.
    pub(crate) fn replay(habit_id: &str, err: DatabaseError) -> Self {
        match err {
            DatabaseError::Locked => HabitError::Conflict {
                habit_id: habit_id.to_string(),
            },
            source => HabitError::RecalculationFailed {
                habit_id: habit_id.to_string(),
                source,
            },
        }
    }
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// A stored row could not be decoded
    #[error("Corrupt row in '{table}': {message}")]
    Corrupt { table: &'static str, message: String },

    /// Database is locked or busy past the busy timeout
    #[error("Database is locked")]
    Locked,

    /// No reader connection could be checked out of the pool
    #[error("Reader pool unavailable: {0}")]
    Pool(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Key does not exist in the configuration
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to locate the data directory
    #[error("Failed to access data directory: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// Date lies after the current day
    #[error("Date {date} is in the future (today is {today})")]
    FutureDate { date: NaiveDate, today: NaiveDate },

    /// Numeric progress call with a zero delta
    #[error("Progress delta must be non-zero")]
    ZeroDelta,

    /// Operation does not apply to this kind of habit
    #[error("Habit '{habit_id}' is not a {expected} habit")]
    WrongHabitType {
        habit_id: HabitId,
        expected: &'static str,
    },

    /// Page size outside the allowed window
    #[error("Page size {size} must be between 1 and {max}")]
    InvalidPageSize { size: usize, max: usize },

    /// Periodicity rule is malformed or unknown
    #[error("Invalid periodicity rule: {0}")]
    InvalidRule(String),
}

impl ValidationError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => match inner.code {
                rusqlite::ErrorCode::DatabaseLocked | rusqlite::ErrorCode::DatabaseBusy => {
                    DatabaseError::Locked
                }
                _ => DatabaseError::QueryFailed(err.to_string()),
            },
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<r2d2::Error> for DatabaseError {
    fn from(err: r2d2::Error) -> Self {
        DatabaseError::Pool(err.to_string())
    }
}

/// Result type alias for HabitError
pub type Result<T, E = HabitError> = std::result::Result<T, E>;
