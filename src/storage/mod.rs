//! Storage module for persisting job records
//!
//! This module handles all durable state of the pipeline:
//! - SQLite database initialization and schema management
//! - Job creation, status and progress updates
//! - Append-only error records per job
//! - Read-only listing for the command line
//!
//! The job runner is the only writer of a job record; everything else takes snapshots.

mod schema;
mod sqlite;
mod traits;

pub use schema::{initialize_schema, schema_version, SCHEMA_SQL};
pub use sqlite::SqliteJobStore;
pub use traits::{JobStore, StorageError, StorageResult};

use crate::pipeline::ErrorRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::Path;

/// Opens (or creates) the job database at `path`
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteJobStore)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_store(path: &Path) -> StorageResult<SqliteJobStore> {
    SqliteJobStore::new(path)
}

/// Durable representation of one job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub job_id: String,
    pub query: String,
    pub status: JobStatus,
    pub progress: String,
    pub step_count: u32,
    pub max_steps: u32,
    pub report_md: Option<String>,
    pub report_json: Option<Value>,
    /// Chronological, append-only
    pub errors: Vec<ErrorRecord>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Fields required to create a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub job_id: String,
    pub query: String,
    pub max_steps: u32,
}

/// Partial update of a job; `None` leaves the stored value untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<String>,
    pub step_count: Option<u32>,
    pub report_md: Option<String>,
    pub report_json: Option<Value>,
    pub error_message: Option<String>,
}

impl JobUpdate {
    /// Update carrying only a status change
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Update carrying step count and progress text
    pub fn progress(step_count: u32, progress: impl Into<String>) -> Self {
        Self {
            step_count: Some(step_count),
            progress: Some(progress.into()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_progress(mut self, progress: impl Into<String>) -> Self {
        self.progress = Some(progress.into());
        self
    }
}

/// Lifecycle status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    /// Defined for external tooling; the runner never sets it
    Cancelled,
}

impl JobStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns all statuses
    pub fn all_statuses() -> Vec<Self> {
        vec![
            Self::Pending,
            Self::Running,
            Self::Completed,
            Self::Failed,
            Self::Cancelled,
        ]
    }

    /// Returns true once no further transition is allowed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether a stored job may move from `self` to `next`
    ///
    /// Re-asserting the current non-terminal status is allowed so progress updates can
    /// carry it.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Pending) | (Self::Running, Self::Running) => true,
            (Self::Pending, Self::Running) => true,
            // A job can fail before it ever starts running (e.g. a panic on startup)
            (Self::Pending, Self::Failed) => true,
            (Self::Running, Self::Completed | Self::Failed) => true,
            (Self::Pending | Self::Running, Self::Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
