//! Production collaborators against mock servers, and configuration loading

use market_scout::config::{load_config_with_hash, LlmConfig, LogFormat, SearchConfig};
use market_scout::llm::{generate, CachedGenerator, GenerationRequest, OpenAiGenerator};
use market_scout::pipeline::state::{ResearchMode, ResearchPlan};
use market_scout::search::DuckDuckGoSearch;
use market_scout::{Classify, ConfigError, ErrorKind, GenerationError, RetryPolicy, SearchProvider, StructuredGenerator};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn llm_config(api_base: &str) -> LlmConfig {
    LlmConfig {
        api_base: api_base.to_string(),
        ..Default::default()
    }
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
    })
}

fn plan_content() -> String {
    json!({
        "research_mode": "B",
        "mode_confidence": 0.7,
        "mode_reason": "market question",
        "feasibility_assessment": "plenty of analyst coverage",
        "entity_type": "company",
        "excluded_types": [],
        "entity_model_mapping": [{"entity": "Acme", "representative_model": "Acme One"}],
        "search_keywords": ["acme market share"],
        "risk_note": "estimates vary"
    })
    .to_string()
}

fn no_retry() -> RetryPolicy {
    RetryPolicy::new(
        "generation",
        1,
        Duration::ZERO,
        Duration::ZERO,
        vec![ErrorKind::Generation, ErrorKind::Timeout],
    )
}

#[tokio::test]
async fn test_openai_generator_decodes_plan() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({"response_format": {"type": "json_object"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(&plan_content())))
        .expect(1)
        .mount(&mock_server)
        .await;

    let generator = OpenAiGenerator::new(&llm_config(&mock_server.uri()), "sk-test").unwrap();

    let plan: ResearchPlan = generate(&generator, &no_retry(), "You plan research.", "Acme market")
        .await
        .unwrap();

    assert_eq!(plan.research_mode, ResearchMode::B);
    assert_eq!(plan.canonical_entities(), vec!["Acme".to_string()]);
    assert_eq!(plan.search_keywords, vec!["acme market share".to_string()]);
}

#[tokio::test]
async fn test_openai_generator_surfaces_api_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&mock_server)
        .await;

    let generator = OpenAiGenerator::new(&llm_config(&mock_server.uri()), "sk-test").unwrap();
    let request = GenerationRequest::for_type::<ResearchPlan>("system", "prompt");

    let err = generator.generate_value(&request).await.unwrap_err();

    assert!(matches!(err, GenerationError::Api { status: 429, ref message } if message == "rate limited"));
}

#[tokio::test]
async fn test_openai_generator_rejects_non_json_content() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("not json at all")))
        .mount(&mock_server)
        .await;

    let generator = OpenAiGenerator::new(&llm_config(&mock_server.uri()), "sk-test").unwrap();
    let request = GenerationRequest::for_type::<ResearchPlan>("system", "prompt");

    let err = generator.generate_value(&request).await.unwrap_err();

    assert!(matches!(err, GenerationError::InvalidShape { .. }));
}

#[tokio::test]
async fn test_cached_generator_calls_upstream_once() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(&plan_content())))
        .expect(1)
        .mount(&mock_server)
        .await;

    let upstream = OpenAiGenerator::new(&llm_config(&mock_server.uri()), "sk-test").unwrap();
    let cached = CachedGenerator::new(Arc::new(upstream), Duration::from_secs(60));
    let request = GenerationRequest::for_type::<ResearchPlan>("system", "Acme market");

    let first = cached.generate_value(&request).await.unwrap();
    let second = cached.generate_value(&request).await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_duckduckgo_search_unwraps_and_filters() {
    let mock_server = MockServer::start().await;

    let page = r#"<html><body>
        <div class="result">
          <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Facme.example%2Fpricing&rut=x">Acme pricing</a>
          <a class="result__snippet">Plans from $19</a>
        </div>
        <div class="result">
          <a class="result__a" href="https://www.linkedin.com/company/acme">Acme on LinkedIn</a>
        </div>
        <div class="result">
          <a class="result__a" href="https://globex.example/">Globex</a>
        </div>
        <div class="result">
          <a class="result__a" href="https://acme.example/pricing">Acme pricing again</a>
        </div>
    </body></html>"#;

    Mock::given(method("GET"))
        .and(path("/html/"))
        .and(query_param("q", "acme pricing"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(page)
                .insert_header("content-type", "text/html"),
        )
        .mount(&mock_server)
        .await;

    let config = SearchConfig {
        endpoint: format!("{}/html/", mock_server.uri()),
        timeout_seconds: 5,
    };
    let search = DuckDuckGoSearch::new(&config).unwrap();

    let hits = search.search("acme pricing", 10).await.unwrap();

    let urls: Vec<&str> = hits.iter().map(|h| h.url.as_str()).collect();
    assert_eq!(urls, vec!["https://acme.example/pricing", "https://globex.example/"]);
    assert_eq!(hits[0].title, "Acme pricing");
    assert_eq!(hits[0].snippet, "Plans from $19");
}

#[tokio::test]
async fn test_duckduckgo_search_http_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let config = SearchConfig {
        endpoint: format!("{}/html/", mock_server.uri()),
        timeout_seconds: 5,
    };
    let search = DuckDuckGoSearch::new(&config).unwrap();

    let err = search.search("acme", 5).await.unwrap_err();

    assert_eq!(err, market_scout::SearchError::Status(503));
}

#[tokio::test]
async fn test_duckduckgo_search_timeout_is_classified() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body></body></html>")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;

    let config = SearchConfig {
        endpoint: format!("{}/html/", mock_server.uri()),
        timeout_seconds: 1,
    };
    let search = DuckDuckGoSearch::new(&config).unwrap();

    let err = search.search("acme", 5).await.unwrap_err();

    assert_eq!(err, market_scout::SearchError::Timeout);
    assert_eq!(err.kind(), ErrorKind::Timeout);
}

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_config_file_overrides_defaults() {
    let file = write_config(
        r#"
[pipeline]
max-steps = 5
max-urls = 8

[crawler]
max-concurrency = 4
min-delay-ms = 0
max-delay-ms = 100

[llm]
model = "gpt-4o"

[logging]
format = "json"
"#,
    );

    let (config, hash) = load_config_with_hash(file.path()).unwrap();

    assert_eq!(config.pipeline.max_steps, 5);
    assert_eq!(config.pipeline.max_urls, 8);
    assert_eq!(config.crawler.max_concurrency, 4);
    assert_eq!(config.llm.model, "gpt-4o");
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(hash.len(), 64);
}

#[test]
fn test_config_rejects_out_of_range_steps() {
    let file = write_config("[pipeline]\nmax-steps = 0\n");

    let err = load_config_with_hash(file.path()).unwrap_err();

    assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("max_steps")));
}
