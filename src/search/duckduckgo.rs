//! DuckDuckGo HTML search
//!
//! Queries the no-JavaScript HTML endpoint and scrapes the result list:
//! - `a.result__a` carries title and (wrapped) target URL
//! - `.result__snippet` carries the snippet
//!
//! Result links are usually `//duckduckgo.com/l/?uddg=<encoded target>` redirects and are
//! unwrapped before filtering.

use super::{is_accessible_url, SearchHit, SearchProvider};
use crate::config::SearchConfig;
use crate::crawler::build_headers;
use crate::SearchError;
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

/// Search provider backed by DuckDuckGo's HTML endpoint
#[derive(Debug, Clone)]
pub struct DuckDuckGoSearch {
    client: Client,
    endpoint: Url,
}

impl DuckDuckGoSearch {
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| SearchError::Request(format!("invalid endpoint: {}", e)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| SearchError::Request(e.to_string()))?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, keyword: &str, max_results: usize) -> Result<Vec<SearchHit>, SearchError> {
        tracing::debug!("Searching for {:?} (max {})", keyword, max_results);

        let headers = build_headers(&self.endpoint, &mut rand::thread_rng());
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[("q", keyword)])
            .headers(headers)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(request_error)?;

        let hits = parse_results(&body, max_results)?;
        tracing::debug!("Search for {:?} returned {} usable hits", keyword, hits.len());
        Ok(hits)
    }
}

fn request_error(err: reqwest::Error) -> SearchError {
    if err.is_timeout() {
        SearchError::Timeout
    } else {
        SearchError::Request(err.to_string())
    }
}

/// Extracts up to `max_results` accessible, de-duplicated hits from a result page
pub fn parse_results(html: &str, max_results: usize) -> Result<Vec<SearchHit>, SearchError> {
    let document = Html::parse_document(html);
    let result_selector = selector(".result")?;
    let link_selector = selector("a.result__a")?;
    let snippet_selector = selector(".result__snippet")?;

    let mut seen = HashSet::new();
    let mut hits = Vec::new();

    for result in document.select(&result_selector) {
        if hits.len() >= max_results {
            break;
        }

        let Some(link) = result.select(&link_selector).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(url) = unwrap_redirect(href) else {
            continue;
        };
        if !is_accessible_url(&url) || !seen.insert(url.clone()) {
            continue;
        }

        let title = normalize_space(&link.text().collect::<String>());
        let snippet = result
            .select(&snippet_selector)
            .next()
            .map(|s| normalize_space(&s.text().collect::<String>()))
            .unwrap_or_default();

        hits.push(SearchHit {
            url,
            title,
            snippet,
        });
    }

    Ok(hits)
}

/// Resolves a result href to the real target URL
///
/// Handles protocol-relative links and `/l/?uddg=` redirect wrappers. Returns `None`
/// for hrefs that cannot be resolved to an absolute URL.
pub fn unwrap_redirect(href: &str) -> Option<String> {
    let base = Url::parse("https://duckduckgo.com/").ok()?;
    let resolved = base.join(href).ok()?;

    let is_wrapper = resolved
        .host_str()
        .is_some_and(|host| host.ends_with("duckduckgo.com"))
        && resolved.path().starts_with("/l/");

    if is_wrapper {
        return resolved
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, value)| value.into_owned());
    }

    Some(resolved.to_string())
}

fn selector(css: &str) -> Result<Selector, SearchError> {
    Selector::parse(css).map_err(|e| SearchError::Parse(format!("selector {}: {:?}", css, e)))
}

fn normalize_space(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
