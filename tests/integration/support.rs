//! Fakes shared by the integration tests

use async_trait::async_trait;
use market_scout::crawler::{FetchResult, PageFetcher, PageMetadata};
use market_scout::llm::{GenerationRequest, StructuredGenerator};
use market_scout::pipeline::ErrorRecord;
use market_scout::search::{SearchHit, SearchProvider};
use market_scout::storage::{
    JobRecord, JobStore, JobUpdate, NewJob, SqliteJobStore, StorageError, StorageResult,
};
use market_scout::{ErrorKind, FetchError, GenerationError, RetryPolicy, SearchError, Services};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Answers by schema name; every call for the same schema gets the same reply
#[derive(Default)]
pub struct SchemaGenerator {
    replies: HashMap<String, Result<Value, GenerationError>>,
    calls: Mutex<Vec<String>>,
}

impl SchemaGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, schema: &str, reply: Result<Value, GenerationError>) -> Self {
        self.replies.insert(schema.to_string(), reply);
        self
    }

    pub fn calls_for(&self, schema: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|name| name.as_str() == schema)
            .count()
    }
}

#[async_trait]
impl StructuredGenerator for SchemaGenerator {
    async fn generate_value(&self, request: &GenerationRequest) -> Result<Value, GenerationError> {
        self.calls.lock().unwrap().push(request.schema_name.clone());
        self.replies
            .get(&request.schema_name)
            .cloned()
            .unwrap_or_else(|| {
                Err(GenerationError::Api {
                    status: 404,
                    message: format!("no reply for {}", request.schema_name),
                })
            })
    }
}

/// Returns the same URL list for every keyword
pub struct FixedSearch {
    urls: Vec<String>,
}

impl FixedSearch {
    pub fn new(urls: &[&str]) -> Self {
        Self {
            urls: urls.iter().map(|u| u.to_string()).collect(),
        }
    }

    pub fn empty() -> Self {
        Self { urls: Vec::new() }
    }
}

#[async_trait]
impl SearchProvider for FixedSearch {
    async fn search(&self, keyword: &str, max_results: usize) -> Result<Vec<SearchHit>, SearchError> {
        Ok(self
            .urls
            .iter()
            .take(max_results)
            .map(|url| SearchHit {
                url: url.clone(),
                title: format!("{} result", keyword),
                snippet: String::new(),
            })
            .collect())
    }
}

/// Serves a page per URL after a fixed delay and tracks peak concurrency
#[derive(Default)]
pub struct SlowFetcher {
    delay: Duration,
    failing: HashSet<String>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl SlowFetcher {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn failing_all(mut self, urls: &[&str]) -> Self {
        self.failing.extend(urls.iter().map(|u| u.to_string()));
        self
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for SlowFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(url) {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: 503,
            });
        }
        let text = format!("Acme One is a product page at {}", url);
        Ok(FetchResult::success(
            url,
            format!("Title of {}", url),
            &text,
            &format!("<p>{}</p>", text),
            PageMetadata::default(),
        ))
    }
}

/// Store whose writes start failing once `fail_after` updates have succeeded
pub struct FlakyStore {
    inner: SqliteJobStore,
    updates: AtomicUsize,
    fail_after: usize,
}

impl FlakyStore {
    pub fn new(fail_after: usize) -> Self {
        Self {
            inner: SqliteJobStore::new_in_memory().unwrap(),
            updates: AtomicUsize::new(0),
            fail_after,
        }
    }
}

impl JobStore for FlakyStore {
    fn create(&self, job: &NewJob) -> StorageResult<JobRecord> {
        self.inner.create(job)
    }

    fn get(&self, job_id: &str) -> StorageResult<JobRecord> {
        self.inner.get(job_id)
    }

    fn update(&self, job_id: &str, update: &JobUpdate) -> StorageResult<()> {
        let seen = self.updates.fetch_add(1, Ordering::SeqCst);
        // Failure marking must still land
        if seen >= self.fail_after && update.error_message.is_none() {
            return Err(StorageError::Database("disk full".to_string()));
        }
        self.inner.update(job_id, update)
    }

    fn append_error(&self, job_id: &str, error: &ErrorRecord) -> StorageResult<()> {
        self.inner.append_error(job_id, error)
    }

    fn list_recent(&self, limit: usize) -> StorageResult<Vec<JobRecord>> {
        self.inner.list_recent(limit)
    }
}

pub fn instant_retry(name: &'static str, attempts: u32, kinds: Vec<ErrorKind>) -> RetryPolicy {
    RetryPolicy::new(name, attempts, Duration::ZERO, Duration::ZERO, kinds)
}

pub fn services(
    generator: Arc<SchemaGenerator>,
    search: FixedSearch,
    fetcher: Arc<SlowFetcher>,
) -> Services {
    Services::new(generator, Arc::new(search), fetcher)
        .with_retry(
            instant_retry("fetch", 2, vec![ErrorKind::Fetch, ErrorKind::Timeout]),
            instant_retry("generation", 2, vec![ErrorKind::Generation, ErrorKind::Timeout]),
        )
        .with_crawl_concurrency(2)
}

pub fn plan_json(mode: &str, entities: &[&str]) -> Value {
    let mapping: Vec<Value> = entities
        .iter()
        .map(|e| json!({"entity": e, "representative_model": format!("{} One", e)}))
        .collect();
    json!({
        "research_mode": mode,
        "mode_confidence": 0.85,
        "mode_reason": "the query names products",
        "feasibility_assessment": "vendors publish pricing",
        "entity_type": "software product",
        "excluded_types": ["consultancies"],
        "entity_model_mapping": mapping,
        "search_keywords": ["ai coding assistant pricing", "ai coding assistant review"],
        "risk_note": ""
    })
}

pub fn entity_json(company: &str) -> Value {
    json!({
        "company": company,
        "product_name": format!("{} One", company),
        "pricing": "$19/month",
        "advantages": "fast completions",
        "disadvantages": "cloud only",
        "target_users": "developers"
    })
}

pub fn summary_json() -> Value {
    json!({
        "headline": "Acme leads on price",
        "key_findings": ["Acme is cheapest"],
        "risks": ["few sources"]
    })
}
