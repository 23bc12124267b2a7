//! HTTP fetcher implementation
//!
//! This module handles single-page retrieval for the crawl stage, including:
//! - Building the shared HTTP client (timeout, TLS, redirect limit, compression)
//! - Randomized client identity and pre-request delay per request
//! - Error classification into [`FetchError`]
//! - Normalizing successful responses into a [`FetchResult`]
//!
//! A [`PageFetcher`] performs exactly one attempt. Retrying is the job of the
//! [`RetryPolicy`] wrapped around it, see [`fetch_with_retry`].

use crate::config::CrawlerConfig;
use crate::crawler::identity::build_headers;
use crate::crawler::parser::{parse_html, truncate_chars, MAX_CONTENT_CHARS, MAX_HTML_CHARS};
use crate::retry::RetryPolicy;
use crate::{Classify, ErrorKind, FetchError};
use async_trait::async_trait;
use rand::Rng;
use reqwest::{redirect::Policy, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Maximum number of redirects followed per request
pub const MAX_REDIRECTS: usize = 10;

/// Free-form response metadata kept with each page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    /// Character count of the extracted text before capping
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// URL the response was served from after redirects
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
}

/// Uniform record of one fetch, successful or not
///
/// Created once by the fetch layer and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResult {
    /// The URL that was requested
    pub url: String,
    pub title: String,
    /// Extracted text, at most [`MAX_CONTENT_CHARS`] characters
    pub content: String,
    /// Raw markup, at most [`MAX_HTML_CHARS`] characters
    pub html: String,
    pub metadata: PageMetadata,
    pub success: bool,
    pub error: Option<String>,
    /// Classification of `error`, set on failed results only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl FetchResult {
    /// Builds a successful result, applying the size ceilings
    pub fn success(
        url: impl Into<String>,
        title: impl Into<String>,
        content: &str,
        html: &str,
        metadata: PageMetadata,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            content: truncate_chars(content, MAX_CONTENT_CHARS),
            html: truncate_chars(html, MAX_HTML_CHARS),
            metadata,
            success: true,
            error: None,
            error_kind: None,
        }
    }

    /// Builds a failed result carrying only the URL and the classified error
    pub fn failure(url: impl Into<String>, error: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            content: String::new(),
            html: String::new(),
            metadata: PageMetadata::default(),
            success: false,
            error: Some(error.into()),
            error_kind: Some(kind),
        }
    }
}

/// One attempt at retrieving one page
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches `url` once
    ///
    /// # Returns
    ///
    /// * `Ok(FetchResult)` - A successful result (`success == true`)
    /// * `Err(FetchError)` - Timeout, non-2xx status, transport or body failure
    async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// Identity headers are injected per request, so the client itself carries no
/// default user agent.
///
/// # Arguments
///
/// * `timeout` - Total per-request timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetch Unit backed by `reqwest`
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    min_delay: Duration,
    max_delay: Duration,
}

impl HttpFetcher {
    /// Creates a fetcher from the `[crawler]` section
    pub fn new(config: &CrawlerConfig) -> Result<Self, reqwest::Error> {
        let client = build_http_client(Duration::from_secs(config.timeout_seconds))?;
        Ok(Self {
            client,
            min_delay: Duration::from_millis(config.min_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms.max(config.min_delay_ms)),
        })
    }

    /// Picks the pre-request delay uniformly from the configured range
    fn random_delay(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        let millis = rand::thread_rng()
            .gen_range(self.min_delay.as_millis() as u64..=self.max_delay.as_millis() as u64);
        Duration::from_millis(millis)
    }

    fn classify(url: &str, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else if let Some(status) = err.status() {
            FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
                message: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        // ThreadRng is not Send, so draw everything before the first await
        let delay = self.random_delay();
        let headers = build_headers(&parsed, &mut rand::thread_rng());

        tracing::debug!("Fetching {} after {:?} delay", url, delay);
        tokio::time::sleep(delay).await;

        let response = self
            .client
            .get(parsed)
            .headers(headers)
            .send()
            .await
            .map_err(|e| Self::classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!("HTTP {} for {}", status.as_u16(), url);
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                FetchError::Body {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let page = parse_html(&body);
        let metadata = PageMetadata {
            status_code: Some(status.as_u16()),
            content_length: Some(page.content.chars().count()),
            content_type,
            final_url: Some(final_url),
        };

        tracing::debug!(
            "Fetched {} ({} chars of text, title {:?})",
            url,
            page.content.len(),
            page.title
        );

        Ok(FetchResult::success(url, page.title, &page.content, &body, metadata))
    }
}

/// Full Fetch Unit: one URL, retried under `retry`, never an error
///
/// Exhausted or non-retryable failures are folded into a failed [`FetchResult`].
pub async fn fetch_with_retry(
    fetcher: &dyn PageFetcher,
    retry: &RetryPolicy,
    url: &str,
) -> FetchResult {
    match retry.execute(|| fetcher.fetch(url)).await {
        Ok(result) => result,
        Err(err) => {
            tracing::warn!("Fetch failed for {}: {}", url, err);
            FetchResult::failure(url, err.to_string(), err.kind())
        }
    }
}
