//! Market-Scout: a guarded research pipeline
//!
//! This crate turns a free-text query into a structured market-comparison report by
//! driving a fixed sequence of stages (plan, search, filter, crawl, extract, compare,
//! report) under step limits, with a bounded-concurrency fetch pool and explicit retry
//! policies around every flaky external call.

pub mod config;
pub mod crawler;
pub mod llm;
pub mod output;
pub mod pipeline;
pub mod retry;
pub mod search;
pub mod storage;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main error type for Market-Scout operations
#[derive(Debug, Error)]
pub enum ScoutError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Guardrail hit: {0}")]
    Guardrail(#[from] GuardrailError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Missing environment variable: {0}")]
    MissingEnv(String),
}

/// Failures of a single page fetch
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Request failed for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Failed to read body of {url}: {message}")]
    Body { url: String, message: String },

    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

/// Failures of the structured-generation collaborator
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Generation request timed out")]
    Timeout,

    #[error("Generation request failed: {0}")]
    Request(String),

    #[error("Generation API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Generation returned an empty response")]
    Empty,

    #[error("Generation result does not match {shape}: {message}")]
    InvalidShape { shape: String, message: String },
}

/// Failures of the search collaborator
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("Search request failed: {0}")]
    Request(String),

    #[error("Search request timed out")]
    Timeout,

    #[error("Search endpoint returned HTTP {0}")]
    Status(u16),

    #[error("Search response could not be parsed: {0}")]
    Parse(String),
}

/// Execution guardrails
///
/// These are used to classify and log limit hits. The decision to halt belongs to the
/// step machine, never to whoever raises one of these.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GuardrailError {
    #[error("Step limit reached: {step_count}/{max_steps} steps")]
    StepLimitExceeded { step_count: u32, max_steps: u32 },

    #[error("URL limit applied: {found} URLs truncated to {max_urls}")]
    UrlLimitExceeded { found: usize, max_urls: usize },
}

/// Closed classification of every error the pipeline can record
///
/// The kind is decided where the error is raised and travels with it, so retry policies
/// and error records never have to guess from a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Generation,
    Fetch,
    Timeout,
    Guardrail,
    Persistence,
    Unknown,
}

impl ErrorKind {
    /// Converts the kind to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Generation => "generation",
            Self::Fetch => "fetch",
            Self::Timeout => "timeout",
            Self::Guardrail => "guardrail",
            Self::Persistence => "persistence",
            Self::Unknown => "unknown",
        }
    }

    /// Parses a kind from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "generation" => Some(Self::Generation),
            "fetch" => Some(Self::Fetch),
            "timeout" => Some(Self::Timeout),
            "guardrail" => Some(Self::Guardrail),
            "persistence" => Some(Self::Persistence),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Returns all error kinds
    pub fn all_kinds() -> Vec<Self> {
        vec![
            Self::Generation,
            Self::Fetch,
            Self::Timeout,
            Self::Guardrail,
            Self::Persistence,
            Self::Unknown,
        ]
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Maps an error value to its [`ErrorKind`]
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

impl Classify for FetchError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            // A malformed URL will never succeed on a second attempt
            Self::InvalidUrl { .. } => ErrorKind::Unknown,
            Self::Status { .. } | Self::Transport { .. } | Self::Body { .. } => ErrorKind::Fetch,
        }
    }
}

impl Classify for GenerationError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout => ErrorKind::Timeout,
            _ => ErrorKind::Generation,
        }
    }
}

impl Classify for SearchError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout => ErrorKind::Timeout,
            Self::Request(_) | Self::Status(_) => ErrorKind::Fetch,
            Self::Parse(_) => ErrorKind::Unknown,
        }
    }
}

impl Classify for GuardrailError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Guardrail
    }
}

impl Classify for ScoutError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Fetch(e) => e.kind(),
            Self::Generation(e) => e.kind(),
            Self::Search(e) => e.kind(),
            Self::Guardrail(e) => e.kind(),
            Self::Storage(_) => ErrorKind::Persistence,
            Self::HttpClient(e) if e.is_timeout() => ErrorKind::Timeout,
            Self::HttpClient(_) => ErrorKind::Fetch,
            Self::Config(_) | Self::Serialization(_) | Self::Io(_) | Self::Internal(_) => {
                ErrorKind::Unknown
            }
        }
    }
}

/// Result type alias for Market-Scout operations
pub type Result<T> = std::result::Result<T, ScoutError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{FetchPool, FetchResult, HttpFetcher, PageFetcher};
pub use llm::StructuredGenerator;
pub use pipeline::{JobRunner, RunState, Services, Stage, StageDelta};
pub use retry::RetryPolicy;
pub use search::SearchProvider;
pub use storage::{JobRecord, JobStatus, JobStore, SqliteJobStore};
