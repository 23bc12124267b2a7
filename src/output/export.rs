use crate::output::{OutputError, OutputResult};
use crate::storage::JobRecord;
use std::fs;
use std::path::{Path, PathBuf};

/// Files written by [`export_report`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedReport {
    pub markdown: PathBuf,
    pub json: Option<PathBuf>,
}

/// Writes a job's reports into `dir` as `<job_id>.md` and `<job_id>.json`
///
/// # Arguments
///
/// * `record` - The job whose reports should be written
/// * `dir` - Target directory, created if missing
///
/// # Returns
///
/// * `Ok(ExportedReport)` - Paths of the written files
/// * `Err(OutputError)` - The job has no markdown report, or writing failed
pub fn export_report(record: &JobRecord, dir: &Path) -> OutputResult<ExportedReport> {
    let markdown = record
        .report_md
        .as_ref()
        .ok_or_else(|| OutputError::MissingReport(record.job_id.clone()))?;

    fs::create_dir_all(dir)?;

    let md_path = dir.join(format!("{}.md", record.job_id));
    fs::write(&md_path, markdown)?;

    let json_path = match &record.report_json {
        Some(report) => {
            let path = dir.join(format!("{}.json", record.job_id));
            fs::write(&path, serde_json::to_string_pretty(report)?)?;
            Some(path)
        }
        None => None,
    };

    tracing::info!("Exported report of job {} to {}", record.job_id, dir.display());

    Ok(ExportedReport {
        markdown: md_path,
        json: json_path,
    })
}
