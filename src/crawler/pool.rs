//! Bounded fetch pool
//!
//! Runs many fetch units at once under a fixed ceiling. The pool owns a counting
//! semaphore; every fetch task holds one permit for its whole lifetime, retries
//! included, so no more than `max_concurrency` requests are ever in flight.
//!
//! `fetch_many` never fails: every input URL maps to exactly one [`FetchResult`] in
//! input order, and a task that panics is reported as a failed result.

use crate::crawler::fetcher::{fetch_with_retry, FetchResult, PageFetcher};
use crate::retry::RetryPolicy;
use crate::ErrorKind;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Aggregate outcome of one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    /// Counts successes and failures in a result set
    pub fn of(results: &[FetchResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
        }
    }

    /// Success ratio in `[0, 1]`, zero for an empty batch
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.total as f64
        }
    }
}

/// Concurrency-limited batch fetch executor
#[derive(Clone)]
pub struct FetchPool {
    fetcher: Arc<dyn PageFetcher>,
    retry: RetryPolicy,
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
}

impl FetchPool {
    /// Creates a pool allowing `max_concurrency` in-flight fetches (at least one)
    pub fn new(fetcher: Arc<dyn PageFetcher>, retry: RetryPolicy, max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            fetcher,
            retry,
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Fetches every URL, returning one result per input in input order
    pub async fn fetch_many(&self, urls: &[String]) -> Vec<FetchResult> {
        tracing::info!(
            "Fetching {} URLs (concurrency {})",
            urls.len(),
            self.max_concurrency
        );

        let mut handles = Vec::with_capacity(urls.len());
        for url in urls {
            let fetcher = Arc::clone(&self.fetcher);
            let retry = self.retry.clone();
            let semaphore = Arc::clone(&self.semaphore);
            let task_url = url.clone();

            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return FetchResult::failure(
                            task_url,
                            "fetch pool has been shut down",
                            ErrorKind::Unknown,
                        )
                    }
                };
                fetch_with_retry(fetcher.as_ref(), &retry, &task_url).await
            });
            handles.push((url.clone(), handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (url, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!("Fetch task for {} did not complete: {}", url, e);
                    FetchResult::failure(url, format!("fetch task aborted: {}", e), ErrorKind::Unknown)
                }
            };
            results.push(result);
        }

        let summary = BatchSummary::of(&results);
        tracing::info!(
            "Batch fetch complete: {} total, {} succeeded, {} failed",
            summary.total,
            summary.succeeded,
            summary.failed
        );

        results
    }
}
