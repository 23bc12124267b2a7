//! Whole jobs through the runner with scripted collaborators

use crate::support::{
    entity_json, plan_json, services, summary_json, FixedSearch, FlakyStore, SchemaGenerator,
    SlowFetcher,
};
use market_scout::config::PipelineConfig;
use market_scout::pipeline::nodes::build_comparison_table;
use market_scout::pipeline::state::{ExtractedEntity, ResearchMode};
use market_scout::storage::JobStore;
use market_scout::{ErrorKind, GenerationError, JobRunner, JobStatus, SqliteJobStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const URLS: &[&str] = &["https://acme.example/pricing", "https://acme.example/review"];

fn pipeline_config(max_steps: u32) -> PipelineConfig {
    PipelineConfig {
        max_steps,
        max_urls: 10,
    }
}

fn happy_generator() -> SchemaGenerator {
    SchemaGenerator::new()
        .respond("ResearchPlan", Ok(plan_json("A", &["Acme"])))
        .respond("ExtractedEntity", Ok(entity_json("acme inc")))
        .respond("ReportSummary", Ok(summary_json()))
}

fn runner(
    generator: SchemaGenerator,
    search: FixedSearch,
    fetcher: SlowFetcher,
    store: Arc<dyn JobStore>,
    max_steps: u32,
) -> JobRunner {
    let services = services(Arc::new(generator), search, Arc::new(fetcher));
    JobRunner::new(Arc::new(services), store, pipeline_config(max_steps))
}

fn memory_store() -> Arc<dyn JobStore> {
    Arc::new(SqliteJobStore::new_in_memory().unwrap())
}

#[tokio::test]
async fn test_full_run_persists_report() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("jobs.db");
    let store: Arc<dyn JobStore> = Arc::new(SqliteJobStore::new(&db_path).unwrap());
    let runner = runner(
        happy_generator(),
        FixedSearch::new(URLS),
        SlowFetcher::new(Duration::from_millis(5)),
        store,
        20,
    );

    let record = runner.run("Compare AI coding assistants").await.unwrap();

    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.step_count, 7);
    assert!(record.errors.is_empty(), "unexpected errors: {:?}", record.errors);
    assert!(record.completed_at.is_some());

    let md = record.report_md.as_deref().unwrap();
    assert!(md.starts_with("# Compare AI coding assistants\n"));
    assert!(md.contains("## Research Classification"));
    assert!(md.contains("## Comparison"));
    assert!(md.contains("## Key Differences"));
    assert!(md.contains("Acme leads on price"));
    assert!(md.contains("## Sources"));

    let json = record.report_json.as_ref().unwrap();
    assert_eq!(json["stats"]["urls_found"], 2);
    assert_eq!(json["stats"]["pages_succeeded"], 2);
    assert_eq!(json["stats"]["entities"], 2);

    // A fresh connection sees the same record
    let reopened = SqliteJobStore::new(&db_path).unwrap();
    let stored = reopened.get(&record.job_id).unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.report_md, record.report_md);
}

#[tokio::test]
async fn test_extracted_company_takes_canonical_name() {
    let runner = runner(
        happy_generator(),
        FixedSearch::new(URLS),
        SlowFetcher::new(Duration::from_millis(1)),
        memory_store(),
        20,
    );

    let record = runner.run("Compare AI coding assistants").await.unwrap();

    let json = record.report_json.unwrap();
    let entities = json["entities"].as_array().unwrap();
    assert_eq!(entities.len(), 2);
    for entity in entities {
        assert_eq!(entity["company"], "Acme");
        assert!(entity["source_url"].as_str().unwrap().starts_with("https://acme.example/"));
    }
    assert!(json["comparison_table"]["rows"][0]["values"]["Acme"].is_string());
}

#[tokio::test]
async fn test_step_limit_stops_after_filter() {
    let generator = Arc::new(happy_generator());
    let services = services(
        generator.clone(),
        FixedSearch::new(URLS),
        Arc::new(SlowFetcher::new(Duration::from_millis(1))),
    );
    let runner = JobRunner::new(Arc::new(services), memory_store(), pipeline_config(3));

    let record = runner.run("Compare AI coding assistants").await.unwrap();

    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.step_count, 3);
    assert!(record.report_md.is_none());
    assert!(record.progress.starts_with("Stopped"));
    assert_eq!(generator.calls_for("ExtractedEntity"), 0);

    let guardrail: Vec<_> = record
        .errors
        .iter()
        .filter(|e| e.kind == ErrorKind::Guardrail)
        .collect();
    assert_eq!(guardrail.len(), 1);
    assert_eq!(guardrail[0].stage, "crawl");
}

#[tokio::test]
async fn test_no_urls_halts_before_crawl() {
    let fetcher = Arc::new(SlowFetcher::new(Duration::from_millis(1)));
    let services = services(Arc::new(happy_generator()), FixedSearch::empty(), fetcher.clone());
    let runner = JobRunner::new(Arc::new(services), memory_store(), pipeline_config(20));

    let record = runner.run("Compare AI coding assistants").await.unwrap();

    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.step_count, 2);
    assert!(record.report_md.is_none());
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn test_all_fetches_failing_records_each_url() {
    let fetcher = SlowFetcher::new(Duration::from_millis(1)).failing_all(URLS);
    let runner = runner(
        happy_generator(),
        FixedSearch::new(URLS),
        fetcher,
        memory_store(),
        20,
    );

    let record = runner.run("Compare AI coding assistants").await.unwrap();

    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.step_count, 4);
    assert!(record.report_md.is_none());

    let crawl_errors: Vec<_> = record.errors.iter().filter(|e| e.stage == "crawl").collect();
    assert_eq!(crawl_errors.len(), URLS.len());
    for (error, url) in crawl_errors.iter().zip(URLS) {
        assert!(error.message.starts_with(url));
        assert_eq!(error.kind, ErrorKind::Fetch);
    }
}

#[tokio::test]
async fn test_partial_fetch_failure_still_reports() {
    let fetcher = SlowFetcher::new(Duration::from_millis(1)).failing_all(&[URLS[1]]);
    let runner = runner(
        happy_generator(),
        FixedSearch::new(URLS),
        fetcher,
        memory_store(),
        20,
    );

    let record = runner.run("Compare AI coding assistants").await.unwrap();

    assert_eq!(record.step_count, 7);
    assert_eq!(record.errors.len(), 1);
    assert_eq!(record.errors[0].stage, "crawl");
    let md = record.report_md.unwrap();
    assert!(md.contains("1 of 2 pages could not be fetched."));
    assert!(md.contains("## Errors"));
}

#[tokio::test]
async fn test_plan_failure_halts_with_one_error() {
    let generator = Arc::new(SchemaGenerator::new().respond(
        "ResearchPlan",
        Err(GenerationError::Api {
            status: 500,
            message: "upstream unavailable".to_string(),
        }),
    ));
    let services = services(
        generator.clone(),
        FixedSearch::new(URLS),
        Arc::new(SlowFetcher::new(Duration::from_millis(1))),
    );
    let runner = JobRunner::new(Arc::new(services), memory_store(), pipeline_config(20));

    let record = runner.run("Compare AI coding assistants").await.unwrap();

    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.step_count, 1);
    assert!(record.report_md.is_none());
    assert_eq!(record.errors.len(), 1);
    assert_eq!(record.errors[0].stage, "plan");
    assert_eq!(record.errors[0].kind, ErrorKind::Generation);
    // Retried under the generation policy before giving up
    assert_eq!(generator.calls_for("ResearchPlan"), 2);
}

#[tokio::test]
async fn test_store_failure_marks_job_failed() {
    let store = Arc::new(FlakyStore::new(1));
    let runner = runner(
        happy_generator(),
        FixedSearch::new(URLS),
        SlowFetcher::new(Duration::from_millis(1)),
        store,
        20,
    );

    let record = runner.run("Compare AI coding assistants").await.unwrap();

    assert_eq!(record.status, JobStatus::Failed);
    assert!(record.error_message.as_deref().unwrap().contains("disk full"));
    let last = record.errors.last().unwrap();
    assert_eq!(last.stage, "job");
    assert_eq!(last.kind, ErrorKind::Persistence);
}

#[tokio::test]
async fn test_concurrent_jobs_are_independent() {
    let runner = runner(
        happy_generator(),
        FixedSearch::new(URLS),
        SlowFetcher::new(Duration::from_millis(20)),
        memory_store(),
        20,
    );

    let (first, first_handle) = runner.spawn("First question").unwrap();
    let (second, second_handle) = runner.spawn("Second question").unwrap();
    assert_ne!(first.job_id, second.job_id);

    let first_done = first_handle.await.unwrap().unwrap();
    let second_done = second_handle.await.unwrap().unwrap();

    assert_eq!(first_done.status, JobStatus::Completed);
    assert_eq!(second_done.status, JobStatus::Completed);
    assert!(first_done.report_md.unwrap().starts_with("# First question"));
    assert!(second_done.report_md.unwrap().starts_with("# Second question"));

    let listed = runner.store().list_recent(10).unwrap();
    assert_eq!(listed.len(), 2);
}

#[test]
fn test_comparison_is_idempotent() {
    let entities = vec![
        ExtractedEntity {
            company: "Acme".to_string(),
            pricing: "$19/month".to_string(),
            ..Default::default()
        },
        ExtractedEntity {
            company: "Globex".to_string(),
            positioning: "enterprise".to_string(),
            ..Default::default()
        },
    ];

    let first = build_comparison_table(&entities, ResearchMode::A);
    let second = build_comparison_table(&entities, ResearchMode::A);

    assert_eq!(first, second);
    assert_eq!(first.entities(), vec!["Acme".to_string(), "Globex".to_string()]);
}
