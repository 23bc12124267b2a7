//! Job status display
//!
//! Formatting is kept separate from printing so the command line output can be
//! tested without capturing stdout.

use crate::storage::{JobRecord, JobStatus};
use crate::ErrorKind;
use std::collections::HashMap;

/// Counts over a set of job records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobStatistics {
    pub total_jobs: u64,
    pub jobs_by_status: HashMap<JobStatus, u64>,
    pub errors_by_kind: HashMap<ErrorKind, u64>,
}

impl JobStatistics {
    pub fn from_records(records: &[JobRecord]) -> Self {
        let mut stats = Self {
            total_jobs: records.len() as u64,
            ..Default::default()
        };
        for record in records {
            *stats.jobs_by_status.entry(record.status).or_insert(0) += 1;
            for error in &record.errors {
                *stats.errors_by_kind.entry(error.kind).or_insert(0) += 1;
            }
        }
        stats
    }

    /// Share of finished jobs that completed, in percent
    pub fn completion_rate(&self) -> f64 {
        let completed = self.count(JobStatus::Completed);
        let finished = completed + self.count(JobStatus::Failed) + self.count(JobStatus::Cancelled);
        if finished == 0 {
            0.0
        } else {
            completed as f64 / finished as f64 * 100.0
        }
    }

    pub fn count(&self, status: JobStatus) -> u64 {
        self.jobs_by_status.get(&status).copied().unwrap_or(0)
    }
}

/// Formats one job for the `status` command
pub fn format_job_status(record: &JobRecord) -> String {
    let mut out = String::new();
    out.push_str(&format!("Job:       {}\n", record.job_id));
    out.push_str(&format!("Query:     {}\n", record.query));
    out.push_str(&format!("Status:    {}\n", record.status));
    out.push_str(&format!("Steps:     {}/{}\n", record.step_count, record.max_steps));
    out.push_str(&format!("Progress:  {}\n", record.progress));
    out.push_str(&format!("Created:   {}\n", record.created_at.to_rfc3339()));
    if let Some(completed) = record.completed_at {
        out.push_str(&format!("Finished:  {}\n", completed.to_rfc3339()));
    }
    if let Some(message) = &record.error_message {
        out.push_str(&format!("Failure:   {}\n", message));
    }
    out.push_str(&format!(
        "Report:    {}\n",
        if record.report_md.is_some() {
            "available"
        } else {
            "none"
        }
    ));

    if !record.errors.is_empty() {
        out.push_str(&format!("\nErrors ({}):\n", record.errors.len()));
        for error in &record.errors {
            out.push_str(&format!("  [{}/{}] {}\n", error.stage, error.kind, error.message));
        }
    }
    out
}

/// Formats the `jobs` listing, newest first, followed by totals
pub fn format_job_list(records: &[JobRecord]) -> String {
    if records.is_empty() {
        return "No jobs found\n".to_string();
    }

    let mut out = String::new();
    for record in records {
        out.push_str(&format!(
            "{}  {:<9}  {:>2}/{:<2}  {}\n",
            record.job_id,
            record.status.to_db_string(),
            record.step_count,
            record.max_steps,
            record.query
        ));
    }

    let stats = JobStatistics::from_records(records);
    out.push_str(&format!("\nTotal: {} jobs", stats.total_jobs));
    let mut statuses: Vec<_> = stats.jobs_by_status.iter().collect();
    statuses.sort_by(|a, b| b.1.cmp(a.1).then(a.0.to_db_string().cmp(b.0.to_db_string())));
    for (status, count) in statuses {
        out.push_str(&format!(", {} {}", count, status));
    }
    out.push('\n');
    out.push_str(&format!("Completion rate: {:.1}%\n", stats.completion_rate()));
    out
}

pub fn print_job_status(record: &JobRecord) {
    print!("{}", format_job_status(record));
}

pub fn print_job_list(records: &[JobRecord]) {
    print!("{}", format_job_list(records));
}
