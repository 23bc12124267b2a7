//! Output module for the command line
//!
//! This module handles:
//! - Printing job status and job listings
//! - Aggregating statistics over recent jobs
//! - Exporting a job's markdown and JSON reports to files

mod export;
pub mod status;

pub use export::{export_report, ExportedReport};
pub use status::{
    format_job_list, format_job_status, print_job_list, print_job_status, JobStatistics,
};

use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Job {0} has no report yet")]
    MissingReport(String),

    #[error("Failed to format output: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for OutputError {
    fn from(err: serde_json::Error) -> Self {
        Self::Format(err.to_string())
    }
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
