//! Storage traits and error types
//!
//! This module defines the trait interface for job storage backends and
//! associated error types.

use crate::pipeline::ErrorRecord;
use crate::storage::{JobRecord, JobStatus, JobUpdate, NewJob};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job already exists: {0}")]
    DuplicateJob(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for job storage backends
///
/// Every call is atomic on its own. Implementations must be shareable across tasks.
pub trait JobStore: Send + Sync {
    /// Inserts a new job in `pending` status
    fn create(&self, job: &NewJob) -> StorageResult<JobRecord>;

    /// Gets a job by ID, including its error records
    ///
    /// # Returns
    ///
    /// * `Ok(JobRecord)` - The stored job
    /// * `Err(StorageError::JobNotFound)` - No job with this ID
    fn get(&self, job_id: &str) -> StorageResult<JobRecord>;

    /// Applies a partial update
    ///
    /// Reaching a terminal status stamps `completed_at`. Status changes that the job
    /// lifecycle does not allow are rejected with `InvalidTransition`.
    fn update(&self, job_id: &str, update: &JobUpdate) -> StorageResult<()>;

    /// Appends one error record
    fn append_error(&self, job_id: &str, error: &ErrorRecord) -> StorageResult<()>;

    /// Lists the most recently created jobs, newest first
    fn list_recent(&self, limit: usize) -> StorageResult<Vec<JobRecord>>;
}
