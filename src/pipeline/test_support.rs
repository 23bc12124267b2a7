//! Scripted collaborators for unit tests

use crate::crawler::{FetchResult, PageFetcher, PageMetadata};
use crate::llm::{GenerationRequest, StructuredGenerator};
use crate::pipeline::Services;
use crate::retry::RetryPolicy;
use crate::search::{SearchHit, SearchProvider};
use crate::{ErrorKind, FetchError, GenerationError, SearchError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replies per schema name; the last reply of a sequence repeats
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<HashMap<String, VecDeque<Result<Value, GenerationError>>>>,
    panics: HashSet<String>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, schema: &str, reply: Result<Value, GenerationError>) -> Self {
        self.respond_sequence(schema, vec![reply])
    }

    pub fn respond_sequence(self, schema: &str, replies: Vec<Result<Value, GenerationError>>) -> Self {
        if let Ok(mut map) = self.replies.lock() {
            map.insert(schema.to_string(), replies.into());
        }
        self
    }

    pub fn panicking(mut self, schema: &str) -> Self {
        self.panics.insert(schema.to_string());
        self
    }
}

#[async_trait]
impl StructuredGenerator for ScriptedGenerator {
    async fn generate_value(&self, request: &GenerationRequest) -> Result<Value, GenerationError> {
        if self.panics.contains(&request.schema_name) {
            panic!("scripted panic for {}", request.schema_name);
        }
        let mut replies = self.replies.lock().unwrap();
        let Some(queue) = replies.get_mut(&request.schema_name) else {
            return Err(GenerationError::Api {
                status: 404,
                message: format!("no scripted reply for {}", request.schema_name),
            });
        };
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap()
        }
    }
}

/// Fixed hits per keyword; unknown keywords return nothing
#[derive(Default)]
pub struct StaticSearch {
    results: HashMap<String, Result<Vec<SearchHit>, SearchError>>,
}

impl StaticSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hits(mut self, keyword: &str, urls: &[&str]) -> Self {
        let hits = urls
            .iter()
            .map(|url| SearchHit {
                url: url.to_string(),
                title: format!("About {}", url),
                snippet: String::new(),
            })
            .collect();
        self.results.insert(keyword.to_string(), Ok(hits));
        self
    }

    pub fn with_error(mut self, keyword: &str, error: SearchError) -> Self {
        self.results.insert(keyword.to_string(), Err(error));
        self
    }
}

#[async_trait]
impl SearchProvider for StaticSearch {
    async fn search(&self, keyword: &str, max_results: usize) -> Result<Vec<SearchHit>, SearchError> {
        match self.results.get(keyword) {
            Some(Ok(hits)) => Ok(hits.iter().take(max_results).cloned().collect()),
            Some(Err(e)) => Err(e.clone()),
            None => Ok(Vec::new()),
        }
    }
}

/// Serves a small page for every URL except the ones told to fail or panic
#[derive(Default)]
pub struct EchoFetcher {
    failing: HashSet<String>,
    panicking: HashSet<String>,
}

impl EchoFetcher {
    pub fn failing(mut self, urls: &[&str]) -> Self {
        self.failing.extend(urls.iter().map(|u| u.to_string()));
        self
    }

    pub fn panicking(mut self, url: &str) -> Self {
        self.panicking.insert(url.to_string());
        self
    }
}

#[async_trait]
impl PageFetcher for EchoFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
        if self.panicking.contains(url) {
            panic!("scripted fetch panic for {}", url);
        }
        if self.failing.contains(url) {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: 500,
            });
        }
        let content = format!("Content of {}", url);
        Ok(FetchResult::success(
            url,
            format!("Page {}", url),
            &content,
            &format!("<p>{}</p>", content),
            PageMetadata::default(),
        ))
    }
}

fn instant_retry(name: &'static str, kinds: Vec<ErrorKind>) -> RetryPolicy {
    RetryPolicy::new(name, 2, Duration::ZERO, Duration::ZERO, kinds)
}

pub fn services_from(
    generator: ScriptedGenerator,
    search: StaticSearch,
    fetcher: EchoFetcher,
) -> Services {
    Services::new(Arc::new(generator), Arc::new(search), Arc::new(fetcher))
        .with_retry(
            instant_retry("fetch", vec![ErrorKind::Fetch, ErrorKind::Timeout]),
            instant_retry("generation", vec![ErrorKind::Generation, ErrorKind::Timeout]),
        )
        .with_crawl_concurrency(2)
}

pub fn services_with(replies: Vec<(&str, Result<Value, GenerationError>)>) -> Services {
    let generator = replies
        .into_iter()
        .fold(ScriptedGenerator::new(), |generator, (schema, reply)| {
            generator.respond(schema, reply)
        });
    services_from(generator, StaticSearch::new(), EchoFetcher::default())
}

/// Plan locking `entities`, searching each entity name in lowercase
pub fn plan_json(mode: &str, entities: &[&str]) -> Value {
    let mapping: Vec<Value> = entities
        .iter()
        .map(|e| json!({"entity": e, "representative_model": format!("{} One", e)}))
        .collect();
    let keywords: Vec<String> = entities.iter().map(|e| e.to_lowercase()).collect();
    json!({
        "research_mode": mode,
        "mode_confidence": 0.9,
        "mode_reason": "named competitors",
        "feasibility_assessment": "public data available",
        "entity_type": "software product",
        "excluded_types": [],
        "entity_model_mapping": mapping,
        "search_keywords": keywords,
        "risk_note": ""
    })
}

pub fn entity_json(company: &str) -> Value {
    json!({
        "company": company,
        "product_name": format!("{} One", company),
        "pricing": "$10/month",
        "advantages": "fast",
        "disadvantages": "closed source"
    })
}

pub fn summary_json(headline: &str) -> Value {
    json!({
        "headline": headline,
        "key_findings": ["finding one"],
        "risks": ["thin data"]
    })
}
