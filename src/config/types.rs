use serde::Deserialize;

/// Main configuration structure for Market-Scout
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Guardrails applied to every job
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of stages a single job may execute
    #[serde(rename = "max-steps", default = "default_max_steps")]
    pub max_steps: u32,

    /// Maximum number of URLs handed to the crawl stage
    #[serde(rename = "max-urls", default = "default_max_urls")]
    pub max_urls: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_urls: default_max_urls(),
        }
    }
}

/// Fetch behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of concurrent page fetches within one job
    #[serde(rename = "max-concurrency", default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-seconds", default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Lower bound of the randomized pre-request delay (milliseconds)
    #[serde(rename = "min-delay-ms", default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Upper bound of the randomized pre-request delay (milliseconds)
    #[serde(rename = "max-delay-ms", default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            timeout_seconds: default_timeout_seconds(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Retry configuration shared by the fetch and generation policies
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per operation, including the first one
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "BackoffConfig::fetch")]
    pub fetch: BackoffConfig,

    #[serde(default = "BackoffConfig::generation")]
    pub generation: BackoffConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            fetch: BackoffConfig::fetch(),
            generation: BackoffConfig::generation(),
        }
    }
}

/// Exponential backoff bounds (milliseconds)
#[derive(Debug, Clone, Deserialize)]
pub struct BackoffConfig {
    #[serde(rename = "min-wait-ms")]
    pub min_wait_ms: u64,

    #[serde(rename = "max-wait-ms")]
    pub max_wait_ms: u64,
}

impl BackoffConfig {
    /// Short waits for transient network failures
    pub fn fetch() -> Self {
        Self {
            min_wait_ms: 1_000,
            max_wait_ms: 10_000,
        }
    }

    /// Longer waits for generation failures
    pub fn generation() -> Self {
        Self {
            min_wait_ms: 2_000,
            max_wait_ms: 30_000,
        }
    }
}

/// Structured-generation endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Model name sent with every request
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of an OpenAI-compatible API
    #[serde(rename = "api-base", default = "default_api_base")]
    pub api_base: String,

    /// Name of the environment variable holding the API key
    #[serde(rename = "api-key-env", default = "default_api_key_env")]
    pub api_key_env: String,

    /// Maximum tokens per completion
    #[serde(rename = "max-tokens", default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-seconds", default = "default_llm_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_base: default_api_base(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_llm_timeout_seconds(),
        }
    }
}

/// Search provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// HTML search endpoint
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-seconds", default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// Generation cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(rename = "ttl-seconds", default = "default_cache_ttl_seconds")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: default_cache_ttl_seconds(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite job database
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,

    /// Directory that exported reports are written into
    #[serde(rename = "report-dir", default = "default_report_dir")]
    pub report_dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            report_dir: default_report_dir(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Console,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

fn default_max_steps() -> u32 {
    20
}

fn default_max_urls() -> usize {
    10
}

fn default_max_concurrency() -> usize {
    3
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_min_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    2_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    4_096
}

fn default_llm_timeout_seconds() -> u64 {
    120
}

fn default_search_endpoint() -> String {
    "https://html.duckduckgo.com/html/".to_string()
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl_seconds() -> u64 {
    3_600
}

fn default_database_path() -> String {
    "./market_scout.db".to_string()
}

fn default_report_dir() -> String {
    "./reports".to_string()
}
