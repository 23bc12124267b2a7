//! OpenAI-compatible chat-completions generator
//!
//! Uses JSON mode (`response_format: json_object`) and embeds the requested schema in
//! the user message, which works against any OpenAI-compatible endpoint including
//! ones that do not implement strict structured outputs.

use super::{GenerationRequest, StructuredGenerator};
use crate::config::LlmConfig;
use crate::{ConfigError, GenerationError};
use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const STRUCTURED_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Structured generator backed by `/chat/completions`
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    client: Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiGenerator {
    /// Builds a generator with an explicit API key
    pub fn new(config: &LlmConfig, api_key: &str) -> Result<Self, ConfigError> {
        if api_key.trim().is_empty() {
            return Err(ConfigError::MissingEnv(config.api_key_env.clone()));
        }

        let mut headers = reqwest::header::HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| ConfigError::Validation("API key is not a valid header value".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .build()
            .map_err(|e| ConfigError::Validation(format!("failed to build LLM HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    /// Builds a generator reading the API key from the configured environment variable
    pub fn from_env(config: &LlmConfig) -> Result<Self, ConfigError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| ConfigError::MissingEnv(config.api_key_env.clone()))?;
        Self::new(config, &api_key)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Appends the schema and the JSON-only instruction to the caller's prompt
    fn user_message(request: &GenerationRequest) -> String {
        let schema = serde_json::to_string_pretty(&request.schema).unwrap_or_default();
        format!(
            "{}\n\nRespond with a single JSON object holding actual values (not the schema itself) \
             that conforms to this JSON schema named {}:\n{}\n\nReturn ONLY the JSON object.",
            request.prompt, request.schema_name, schema
        )
    }
}

#[async_trait]
impl StructuredGenerator for OpenAiGenerator {
    async fn generate_value(&self, request: &GenerationRequest) -> Result<Value, GenerationError> {
        let user_message = Self::user_message(request);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &user_message,
                },
            ],
            temperature: STRUCTURED_TEMPERATURE,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout
                } else {
                    GenerationError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout
            } else {
                GenerationError::Request(format!("failed to decode completion: {}", e))
            }
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(GenerationError::Empty)?;

        tracing::debug!(
            "{} generation returned {} chars from {}",
            request.schema_name,
            content.len(),
            self.model
        );

        serde_json::from_str(&content).map_err(|e| GenerationError::InvalidShape {
            shape: request.schema_name.clone(),
            message: format!("response is not JSON: {}", e),
        })
    }
}
