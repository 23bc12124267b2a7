//! Fetch Unit and fetch pool behavior over real HTTP

use crate::support::{instant_retry, SlowFetcher};
use market_scout::config::CrawlerConfig;
use market_scout::crawler::{fetch_with_retry, BatchSummary};
use market_scout::{ErrorKind, FetchPool, HttpFetcher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Crawler settings without politeness delays
fn create_test_config(timeout_seconds: u64) -> CrawlerConfig {
    CrawlerConfig {
        max_concurrency: 3,
        timeout_seconds,
        min_delay_ms: 0,
        max_delay_ms: 0,
    }
}

fn fetch_retry(attempts: u32) -> market_scout::RetryPolicy {
    instant_retry("fetch", attempts, vec![ErrorKind::Fetch, ErrorKind::Timeout])
}

#[tokio::test]
async fn test_fetch_extracts_title_and_text() {
    // Start a mock server
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pricing"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(
                    r#"<html><head><title>Acme Pricing</title><script>var x = 1;</script></head>
                    <body><nav>Menu</nav><main><p>Acme One costs $19 per month.</p></main>
                    <footer>Copyright</footer></body></html>"#,
                )
                .insert_header("content-type", "text/html"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = HttpFetcher::new(&create_test_config(5)).unwrap();
    let url = format!("{}/pricing", mock_server.uri());

    let result = fetch_with_retry(&fetcher, &fetch_retry(3), &url).await;

    assert!(result.success, "fetch failed: {:?}", result.error);
    assert_eq!(result.url, url);
    assert_eq!(result.title, "Acme Pricing");
    assert!(result.content.contains("Acme One costs $19 per month."));
    assert!(!result.content.contains("var x"));
    assert!(!result.content.contains("Menu"));
    assert!(!result.content.contains("Copyright"));
    assert_eq!(result.metadata.status_code, Some(200));
    assert!(result.error.is_none());
    assert!(result.error_kind.is_none());
}

#[tokio::test]
async fn test_fetch_http_error_is_retried_then_folded() {
    let mock_server = MockServer::start().await;

    // Every attempt hits the server
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(3)
        .mount(&mock_server)
        .await;

    let fetcher = HttpFetcher::new(&create_test_config(5)).unwrap();
    let url = format!("{}/missing", mock_server.uri());

    let result = fetch_with_retry(&fetcher, &fetch_retry(3), &url).await;

    assert!(!result.success);
    assert_eq!(result.url, url);
    assert!(result.title.is_empty());
    assert!(result.content.is_empty());
    assert!(result.error.as_deref().unwrap_or_default().contains("404"));
    assert_eq!(result.error_kind, Some(ErrorKind::Fetch));
}

#[tokio::test]
async fn test_fetch_timeout_is_classified() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body>late</body></html>")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;

    let fetcher = HttpFetcher::new(&create_test_config(1)).unwrap();
    let url = format!("{}/slow", mock_server.uri());

    let result = fetch_with_retry(&fetcher, &fetch_retry(1), &url).await;

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::Timeout));
}

#[tokio::test]
async fn test_fetch_rejects_non_http_scheme_without_request() {
    let fetcher = HttpFetcher::new(&create_test_config(5)).unwrap();

    let result = fetch_with_retry(&fetcher, &fetch_retry(3), "ftp://example.com/file").await;

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::Unknown));
}

#[tokio::test]
async fn test_pool_mixed_batch_over_http() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><head><title>Ok</title></head><body>fine</body></html>")
                .insert_header("content-type", "text/html"),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let fetcher = Arc::new(HttpFetcher::new(&create_test_config(5)).unwrap());
    let pool = FetchPool::new(fetcher, fetch_retry(2), 2);
    let urls = vec![
        format!("{}/ok", mock_server.uri()),
        format!("{}/broken", mock_server.uri()),
        format!("{}/ok", mock_server.uri()),
    ];

    let results = pool.fetch_many(&urls).await;

    assert_eq!(results.len(), 3);
    for (result, url) in results.iter().zip(&urls) {
        assert_eq!(&result.url, url);
    }
    assert!(results[0].success);
    assert!(!results[1].success);
    assert!(results[2].success);

    let summary = BatchSummary::of(&results);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
}

#[tokio::test]
async fn test_pool_bounds_concurrency_and_wall_time() {
    let fetcher = Arc::new(SlowFetcher::new(Duration::from_millis(100)));
    let pool = FetchPool::new(fetcher.clone(), fetch_retry(1), 2);
    let urls: Vec<String> = (0..5)
        .map(|i| format!("https://example.com/page{}", i))
        .collect();

    let started = Instant::now();
    let results = pool.fetch_many(&urls).await;
    let elapsed = started.elapsed();

    assert_eq!(results.len(), 5);
    assert!(results.iter().all(|r| r.success));
    assert_eq!(fetcher.peak(), 2);
    // Three waves of 100 ms
    assert!(elapsed >= Duration::from_millis(290), "too fast: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(600), "too slow: {:?}", elapsed);
}

#[tokio::test]
async fn test_pool_empty_batch() {
    let fetcher = Arc::new(SlowFetcher::new(Duration::from_millis(10)));
    let pool = FetchPool::new(fetcher.clone(), fetch_retry(1), 3);

    let results = pool.fetch_many(&[]).await;

    assert!(results.is_empty());
    assert_eq!(fetcher.calls(), 0);
}
