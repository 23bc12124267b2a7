use crate::config::types::{
    BackoffConfig, CacheConfig, Config, CrawlerConfig, LlmConfig, OutputConfig, PipelineConfig,
    RetryConfig, SearchConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_pipeline_config(&config.pipeline)?;
    validate_crawler_config(&config.crawler)?;
    validate_retry_config(&config.retry)?;
    validate_llm_config(&config.llm)?;
    validate_search_config(&config.search)?;
    validate_cache_config(&config.cache)?;
    validate_output_config(&config.output)?;
    Ok(())
}

fn validate_pipeline_config(config: &PipelineConfig) -> Result<(), ConfigError> {
    if config.max_steps < 1 || config.max_steps > 100 {
        return Err(ConfigError::Validation(format!(
            "max_steps must be between 1 and 100, got {}",
            config.max_steps
        )));
    }

    if config.max_urls < 1 || config.max_urls > 100 {
        return Err(ConfigError::Validation(format!(
            "max_urls must be between 1 and 100, got {}",
            config.max_urls
        )));
    }

    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrency < 1 || config.max_concurrency > 64 {
        return Err(ConfigError::Validation(format!(
            "max_concurrency must be between 1 and 64, got {}",
            config.max_concurrency
        )));
    }

    if config.timeout_seconds < 1 {
        return Err(ConfigError::Validation(format!(
            "crawler timeout_seconds must be >= 1, got {}",
            config.timeout_seconds
        )));
    }

    if config.min_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "min_delay_ms ({}) must not exceed max_delay_ms ({})",
            config.min_delay_ms, config.max_delay_ms
        )));
    }

    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    validate_backoff("fetch", &config.fetch)?;
    validate_backoff("generation", &config.generation)?;
    Ok(())
}

fn validate_backoff(name: &str, config: &BackoffConfig) -> Result<(), ConfigError> {
    if config.min_wait_ms > config.max_wait_ms {
        return Err(ConfigError::Validation(format!(
            "retry.{} min_wait_ms ({}) must not exceed max_wait_ms ({})",
            name, config.min_wait_ms, config.max_wait_ms
        )));
    }
    Ok(())
}

fn validate_llm_config(config: &LlmConfig) -> Result<(), ConfigError> {
    if config.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm model cannot be empty".to_string()));
    }

    if config.api_key_env.trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm api_key_env cannot be empty".to_string(),
        ));
    }

    if config.max_tokens < 1 {
        return Err(ConfigError::Validation(
            "llm max_tokens must be >= 1".to_string(),
        ));
    }

    validate_http_url("llm api_base", &config.api_base)
}

fn validate_search_config(config: &SearchConfig) -> Result<(), ConfigError> {
    validate_http_url("search endpoint", &config.endpoint)
}

fn validate_cache_config(config: &CacheConfig) -> Result<(), ConfigError> {
    if config.enabled && config.ttl_seconds < 1 {
        return Err(ConfigError::Validation(
            "cache ttl_seconds must be >= 1 when the cache is enabled".to_string(),
        ));
    }
    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.report_dir.is_empty() {
        return Err(ConfigError::Validation(
            "report_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates that a configured endpoint is an absolute HTTP(S) URL
fn validate_http_url(name: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", name, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            name, value
        )));
    }

    Ok(())
}
