//! Search provider interface
//!
//! The search stage only needs `search(keyword, max_results)` returning ordered hits.
//! This module also holds the list of domains that reliably refuse automated access;
//! providers drop hits on those hosts before returning.

mod duckduckgo;

pub use duckduckgo::{parse_results, unwrap_redirect, DuckDuckGoSearch};

use crate::SearchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

/// Domains that block scraping, sit behind paywalls or require a login
pub const BLOCKED_DOMAINS: &[&str] = &[
    "zhihu.com",
    "weixin.qq.com",
    "weibo.com",
    "douyin.com",
    "xiaohongshu.com",
    "bilibili.com",
    "weforum.org",
    "bloomberg.com",
    "wsj.com",
    "nytimes.com",
    "ft.com",
    "linkedin.com",
    "facebook.com",
    "twitter.com",
    "x.com",
    "instagram.com",
    "reddit.com",
    "segmentfault.com",
    "ones.cn",
    "worktile.com",
    "movieboxpro.app",
];

/// One search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// The search collaborator
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Returns at most `max_results` hits for `keyword`, best first
    async fn search(&self, keyword: &str, max_results: usize) -> Result<Vec<SearchHit>, SearchError>;
}

/// Whether `url` is worth handing to the crawler
///
/// Rejects unparseable or non-HTTP URLs and any host that is, or is a subdomain of, a
/// blocked domain.
pub fn is_accessible_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return false;
    }
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();

    !BLOCKED_DOMAINS.iter().any(|domain| {
        host == *domain
            || host
                .strip_suffix(domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}
