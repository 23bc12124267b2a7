//! Crawler module for web page fetching and processing
//!
//! This module contains the fetch subsystem used by the crawl stage:
//! - Single-page fetching with timeout, identity rotation and typed failures
//! - HTML normalization (title, readable text, size ceilings)
//! - The bounded-concurrency fetch pool

mod fetcher;
mod identity;
mod parser;
mod pool;

pub use fetcher::{
    build_http_client, fetch_with_retry, FetchResult, HttpFetcher, PageFetcher, PageMetadata,
    MAX_REDIRECTS,
};
pub use identity::{build_headers, origin_of, ClientSignature, CLIENT_SIGNATURES};
pub use parser::{
    parse_html, truncate_chars, ParsedPage, EXCLUDED_TAGS, MAX_CONTENT_CHARS, MAX_HTML_CHARS,
};
pub use pool::{BatchSummary, FetchPool};
