//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the JobStore trait.

use crate::pipeline::ErrorRecord;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{JobStore, StorageError, StorageResult};
use crate::storage::{JobRecord, JobStatus, JobUpdate, NewJob};
use crate::ErrorKind;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const JOB_COLUMNS: &str = "job_id, query, status, progress, step_count, max_steps, report_md, \
                           report_json, error_message, created_at, updated_at, completed_at";

/// SQLite storage backend
///
/// A single connection behind a mutex; every trait call holds the lock for its whole
/// duration, which makes each call atomic.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Creates a new SqliteJobStore instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteJobStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for tests and dry runs)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("connection mutex poisoned".to_string()))
    }
}

/// Columns of a `jobs` row, before error records are attached
struct JobRow {
    job_id: String,
    query: String,
    status: JobStatus,
    progress: String,
    step_count: u32,
    max_steps: u32,
    report_md: Option<String>,
    report_json: Option<serde_json::Value>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let status: String = row.get(2)?;
        let report_json: Option<String> = row.get(7)?;
        let completed_at: Option<String> = row.get(11)?;

        Ok(Self {
            job_id: row.get(0)?,
            query: row.get(1)?,
            status: JobStatus::from_db_string(&status).ok_or_else(|| {
                conversion_error(2, format!("unknown job status '{}'", status))
            })?,
            progress: row.get(3)?,
            step_count: row.get(4)?,
            max_steps: row.get(5)?,
            report_md: row.get(6)?,
            report_json: report_json
                .map(|json| serde_json::from_str(&json).map_err(|e| conversion_error(7, e)))
                .transpose()?,
            error_message: row.get(8)?,
            created_at: parse_timestamp(9, &row.get::<_, String>(9)?)?,
            updated_at: parse_timestamp(10, &row.get::<_, String>(10)?)?,
            completed_at: completed_at
                .map(|ts| parse_timestamp(11, &ts))
                .transpose()?,
        })
    }

    fn into_record(self, errors: Vec<ErrorRecord>) -> JobRecord {
        JobRecord {
            job_id: self.job_id,
            query: self.query,
            status: self.status,
            progress: self.progress,
            step_count: self.step_count,
            max_steps: self.max_steps,
            report_md: self.report_md,
            report_json: self.report_json,
            errors,
            error_message: self.error_message,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        }
    }
}

fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
{
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, err.into())
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_error(column, e))
}

fn load_errors(conn: &Connection, job_id: &str) -> StorageResult<Vec<ErrorRecord>> {
    let mut stmt =
        conn.prepare("SELECT stage, message, kind FROM job_errors WHERE job_id = ?1 ORDER BY id")?;

    let errors = stmt
        .query_map(params![job_id], |row| {
            let kind: String = row.get(2)?;
            Ok(ErrorRecord {
                stage: row.get(0)?,
                message: row.get(1)?,
                kind: ErrorKind::from_db_string(&kind).unwrap_or(ErrorKind::Unknown),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(errors)
}

fn load_job(conn: &Connection, job_id: &str) -> StorageResult<Option<JobRow>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM jobs WHERE job_id = ?1", JOB_COLUMNS),
            params![job_id],
            JobRow::from_row,
        )
        .optional()?;
    Ok(row)
}

impl JobStore for SqliteJobStore {
    fn create(&self, job: &NewJob) -> StorageResult<JobRecord> {
        let conn = self.lock()?;
        let now = Utc::now();
        let stamp = timestamp(now);

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO jobs (job_id, query, status, progress, step_count, max_steps, \
             created_at, updated_at) VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?6)",
            params![
                job.job_id,
                job.query,
                JobStatus::Pending.to_db_string(),
                "Job created",
                job.max_steps,
                stamp
            ],
        )?;

        if inserted == 0 {
            return Err(StorageError::DuplicateJob(job.job_id.clone()));
        }

        Ok(JobRecord {
            job_id: job.job_id.clone(),
            query: job.query.clone(),
            status: JobStatus::Pending,
            progress: "Job created".to_string(),
            step_count: 0,
            max_steps: job.max_steps,
            report_md: None,
            report_json: None,
            errors: Vec::new(),
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        })
    }

    fn get(&self, job_id: &str) -> StorageResult<JobRecord> {
        let conn = self.lock()?;
        let row = load_job(&conn, job_id)?
            .ok_or_else(|| StorageError::JobNotFound(job_id.to_string()))?;
        let errors = load_errors(&conn, job_id)?;
        Ok(row.into_record(errors))
    }

    fn update(&self, job_id: &str, update: &JobUpdate) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let current: Option<String> = tx
            .query_row(
                "SELECT status FROM jobs WHERE job_id = ?1",
                params![job_id],
                |row| row.get(0),
            )
            .optional()?;
        let current = current
            .and_then(|s| JobStatus::from_db_string(&s))
            .ok_or_else(|| StorageError::JobNotFound(job_id.to_string()))?;

        if let Some(next) = update.status {
            if !current.can_transition_to(next) {
                return Err(StorageError::InvalidTransition {
                    from: current,
                    to: next,
                });
            }
        }

        let now = timestamp(Utc::now());
        let completed_at = update
            .status
            .filter(JobStatus::is_terminal)
            .map(|_| now.clone());
        let report_json = update
            .report_json
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        tx.execute(
            "UPDATE jobs SET
                status = COALESCE(?1, status),
                progress = COALESCE(?2, progress),
                step_count = COALESCE(?3, step_count),
                report_md = COALESCE(?4, report_md),
                report_json = COALESCE(?5, report_json),
                error_message = COALESCE(?6, error_message),
                updated_at = ?7,
                completed_at = COALESCE(?8, completed_at)
             WHERE job_id = ?9",
            params![
                update.status.map(|s| s.to_db_string()),
                update.progress,
                update.step_count,
                update.report_md,
                report_json,
                update.error_message,
                now,
                completed_at,
                job_id
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn append_error(&self, job_id: &str, error: &ErrorRecord) -> StorageResult<()> {
        let conn = self.lock()?;

        let exists = load_job(&conn, job_id)?.is_some();
        if !exists {
            return Err(StorageError::JobNotFound(job_id.to_string()));
        }

        conn.execute(
            "INSERT INTO job_errors (job_id, stage, message, kind, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                job_id,
                error.stage,
                error.message,
                error.kind.to_db_string(),
                timestamp(Utc::now())
            ],
        )?;
        Ok(())
    }

    fn list_recent(&self, limit: usize) -> StorageResult<Vec<JobRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM jobs ORDER BY created_at DESC, rowid DESC LIMIT ?1",
            JOB_COLUMNS
        ))?;

        let rows = stmt
            .query_map(params![limit as i64], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            let errors = load_errors(&conn, &row.job_id)?;
            jobs.push(row.into_record(errors));
        }
        Ok(jobs)
    }
}
