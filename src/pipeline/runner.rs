//! Job runner
//!
//! Owns the lifecycle of one job:
//! 1. Creates the pending job record
//! 2. Marks it running and drives the step machine one stage at a time
//! 3. Persists step count, progress and new error records after every stage
//! 4. Stores the reports and marks the job completed
//!
//! Stage failures never fail a job. Only an error escaping the pipeline (a storage
//! failure or a panic inside a stage) marks it `failed`, with the message kept.

use crate::config::{Config, PipelineConfig};
use crate::crawler::{HttpFetcher, PageFetcher};
use crate::llm::{CachedGenerator, OpenAiGenerator, StructuredGenerator};
use crate::pipeline::machine::{HaltReason, StepMachine, Transition};
use crate::pipeline::nodes::{node_for, run_node};
use crate::pipeline::{ErrorRecord, RunState};
use crate::retry::RetryPolicy;
use crate::search::{DuckDuckGoSearch, SearchProvider};
use crate::storage::{JobRecord, JobStatus, JobStore, JobUpdate, NewJob};
use crate::{Classify, ErrorKind, GuardrailError, Result, ScoutError};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

/// Stage name used for failures that escape every stage
const JOB_STAGE: &str = "job";

/// Default number of concurrent fetches in the crawl stage
const DEFAULT_CRAWL_CONCURRENCY: usize = 3;

/// Collaborators injected into every stage
///
/// Built once per process and shared by all jobs.
#[derive(Clone)]
pub struct Services {
    pub generator: Arc<dyn StructuredGenerator>,
    pub search: Arc<dyn SearchProvider>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub fetch_retry: RetryPolicy,
    pub generation_retry: RetryPolicy,
    /// Ceiling of in-flight fetches in one crawl stage
    pub crawl_concurrency: usize,
}

impl Services {
    /// Bundles collaborators with the default retry policies
    pub fn new(
        generator: Arc<dyn StructuredGenerator>,
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        Self {
            generator,
            search,
            fetcher,
            fetch_retry: RetryPolicy::fetch(3),
            generation_retry: RetryPolicy::generation(3),
            crawl_concurrency: DEFAULT_CRAWL_CONCURRENCY,
        }
    }

    pub fn with_retry(mut self, fetch_retry: RetryPolicy, generation_retry: RetryPolicy) -> Self {
        self.fetch_retry = fetch_retry;
        self.generation_retry = generation_retry;
        self
    }

    pub fn with_crawl_concurrency(mut self, crawl_concurrency: usize) -> Self {
        self.crawl_concurrency = crawl_concurrency.max(1);
        self
    }

    /// Builds the production collaborators from configuration
    ///
    /// # Returns
    ///
    /// * `Ok(Services)` - OpenAI-compatible generator (cached if enabled), DuckDuckGo
    ///   search and the HTTP fetcher
    /// * `Err(ScoutError)` - Missing API key or a client that failed to build
    pub fn from_config(config: &Config) -> Result<Self> {
        let openai: Arc<dyn StructuredGenerator> = Arc::new(OpenAiGenerator::from_env(&config.llm)?);
        let generator: Arc<dyn StructuredGenerator> = if config.cache.enabled {
            Arc::new(CachedGenerator::new(
                openai,
                Duration::from_secs(config.cache.ttl_seconds),
            ))
        } else {
            openai
        };
        let search = Arc::new(DuckDuckGoSearch::new(&config.search)?);
        let fetcher = Arc::new(HttpFetcher::new(&config.crawler)?);
        let (fetch_retry, generation_retry) = RetryPolicy::from_config(&config.retry);

        Ok(Self::new(generator, search, fetcher)
            .with_retry(fetch_retry, generation_retry)
            .with_crawl_concurrency(config.crawler.max_concurrency))
    }
}

/// Drives jobs through the pipeline and keeps their records current
#[derive(Clone)]
pub struct JobRunner {
    services: Arc<Services>,
    store: Arc<dyn JobStore>,
    config: PipelineConfig,
    machine: StepMachine,
}

impl JobRunner {
    pub fn new(services: Arc<Services>, store: Arc<dyn JobStore>, config: PipelineConfig) -> Self {
        Self {
            services,
            store,
            config,
            machine: StepMachine::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Allocates an identifier and persists a pending job
    pub fn create_job(&self, query: &str) -> Result<JobRecord> {
        let job = NewJob {
            job_id: Uuid::new_v4().to_string(),
            query: query.trim().to_string(),
            max_steps: self.config.max_steps,
        };
        let record = self.store.create(&job)?;
        tracing::info!("Created job {} for query {:?}", record.job_id, record.query);
        Ok(record)
    }

    /// Creates a job and runs it to a terminal status
    pub async fn run(&self, query: &str) -> Result<JobRecord> {
        let record = self.create_job(query)?;
        self.run_job(&record.job_id).await
    }

    /// Creates a job and runs it on its own task
    ///
    /// # Returns
    ///
    /// * `Ok((JobRecord, JoinHandle))` - The pending record and the handle resolving to
    ///   the final record
    /// * `Err(ScoutError)` - The job could not be created
    pub fn spawn(&self, query: &str) -> Result<(JobRecord, JoinHandle<Result<JobRecord>>)> {
        let record = self.create_job(query)?;
        let runner = self.clone();
        let job_id = record.job_id.clone();
        let handle = tokio::spawn(async move { runner.run_job(&job_id).await });
        Ok((record, handle))
    }

    /// Runs a pending job to a terminal status
    ///
    /// The pipeline itself runs on a separate task, so a panic inside a stage is caught
    /// here and recorded as a failed job instead of unwinding into the caller.
    ///
    /// # Returns
    ///
    /// * `Ok(JobRecord)` - The job's final record (completed or failed)
    /// * `Err(ScoutError)` - The job does not exist, is not pending, or could not be
    ///   marked failed
    pub async fn run_job(&self, job_id: &str) -> Result<JobRecord> {
        let record = self.store.get(job_id)?;
        if record.status != JobStatus::Pending {
            return Err(ScoutError::Internal(format!(
                "job {} is {}, only pending jobs can run",
                job_id, record.status
            )));
        }

        let trace_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("job", job_id = %record.job_id, trace_id = %trace_id);
        let state = RunState::new(
            record.job_id.clone(),
            trace_id,
            record.query.clone(),
            record.max_steps,
            self.config.max_urls,
        );

        let runner = self.clone();
        let outcome = tokio::spawn(async move { runner.drive(state).await }.instrument(span)).await;

        let failure = match outcome {
            Ok(Ok(halt)) => {
                tracing::info!("Job {} finished: {}", job_id, halt);
                None
            }
            Ok(Err(e)) => Some((e.to_string(), e.kind())),
            Err(join_error) if join_error.is_panic() => Some((
                format!("pipeline panicked: {}", panic_message(join_error.into_panic())),
                ErrorKind::Unknown,
            )),
            Err(join_error) => Some((join_error.to_string(), ErrorKind::Unknown)),
        };

        if let Some((message, kind)) = failure {
            tracing::error!("Job {} failed: {}", job_id, message);
            self.mark_failed(job_id, &message, kind)?;
        }

        Ok(self.store.get(job_id)?)
    }

    /// Runs the stage loop for one job
    async fn drive(&self, mut state: RunState) -> Result<HaltReason> {
        let job_id = state.job_id.clone();
        self.store.update(
            &job_id,
            &JobUpdate::status(JobStatus::Running).with_progress("Starting research"),
        )?;

        let mut transition = self.machine.start(&state);
        let halt = loop {
            let stage = match transition {
                Transition::Run(stage) => stage,
                Transition::Halt(reason) => break reason,
            };

            let node = node_for(stage);
            let delta = run_node(node.as_ref(), &state, &self.services).await;
            let new_errors = delta.errors.clone();
            state.apply(delta);

            self.store.update(
                &job_id,
                &JobUpdate::progress(state.step_count, state.progress.clone()),
            )?;
            for error in &new_errors {
                self.store.append_error(&job_id, error)?;
            }

            transition = self.machine.after(stage, &state);
        };

        if let HaltReason::StepLimit { next } = halt {
            let guardrail = GuardrailError::StepLimitExceeded {
                step_count: state.step_count,
                max_steps: state.max_steps,
            };
            tracing::warn!("{} before {}", guardrail, next);
            let record = ErrorRecord::from_error(next, &guardrail);
            self.store.append_error(&job_id, &record)?;
            state.errors.push(record);
        }

        let progress = if halt.is_completed() {
            state.progress.clone()
        } else {
            format!("Stopped: {}", halt)
        };
        let update = JobUpdate {
            status: Some(JobStatus::Completed),
            progress: Some(progress),
            step_count: Some(state.step_count),
            report_md: state.report_md.take(),
            report_json: state.report_json.take(),
            error_message: None,
        };
        self.store.update(&job_id, &update)?;

        tracing::info!(
            "Job completed after {} steps with {} errors",
            state.step_count,
            state.errors.len()
        );
        Ok(halt)
    }

    /// Marks a job failed and records the escaping error
    fn mark_failed(&self, job_id: &str, message: &str, kind: ErrorKind) -> Result<()> {
        let update = JobUpdate {
            status: Some(JobStatus::Failed),
            error_message: Some(message.to_string()),
            ..Default::default()
        };
        self.store.update(job_id, &update)?;

        let record = ErrorRecord {
            stage: JOB_STAGE.to_string(),
            message: message.to_string(),
            kind,
        };
        if let Err(e) = self.store.append_error(job_id, &record) {
            tracing::warn!("Could not record failure of job {}: {}", job_id, e);
        }
        Ok(())
    }
}

fn panic_message(payload: Box<dyn Any + Send + 'static>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
