//! Structured generation
//!
//! The pipeline never talks to a model directly. Stages ask for a value of a Rust type
//! through [`generate`], which:
//! 1. Derives a JSON schema for the type with `schemars`
//! 2. Sends prompt and schema to a [`StructuredGenerator`] under a retry policy
//! 3. Deserializes the returned JSON and runs the type's [`Validate`] check
//!
//! Empty output, output that does not deserialize and output that fails validation are
//! all [`GenerationError`]s, and all of them are retried by the generation policy.

mod cache;
mod openai;

pub use cache::CachedGenerator;
pub use openai::OpenAiGenerator;

use crate::retry::RetryPolicy;
use crate::GenerationError;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// One structured-generation call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub prompt: String,
    /// Name of the requested result shape, used for logging, caching and test fakes
    pub schema_name: String,
    /// JSON schema the result must satisfy
    pub schema: Value,
}

impl GenerationRequest {
    /// Builds a request for result type `T`
    pub fn for_type<T: JsonSchema>(system_prompt: impl Into<String>, prompt: impl Into<String>) -> Self {
        let schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null);
        Self {
            system_prompt: system_prompt.into(),
            prompt: prompt.into(),
            schema_name: <T as JsonSchema>::schema_name(),
            schema,
        }
    }
}

/// The structured-generation collaborator
#[async_trait]
pub trait StructuredGenerator: Send + Sync {
    /// Returns the raw JSON value produced for `request`
    async fn generate_value(&self, request: &GenerationRequest) -> Result<Value, GenerationError>;

    /// Forgets any stored result for `request` after it failed to decode
    fn discard(&self, _request: &GenerationRequest) {}
}

/// Semantic checks applied after deserialization
pub trait Validate {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Turns a raw JSON value into a validated `T`
pub fn decode<T>(schema_name: &str, value: Value) -> Result<T, GenerationError>
where
    T: DeserializeOwned + Validate,
{
    let is_empty = match &value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    };
    if is_empty {
        return Err(GenerationError::Empty);
    }

    let parsed: T = serde_json::from_value(value).map_err(|e| GenerationError::InvalidShape {
        shape: schema_name.to_string(),
        message: e.to_string(),
    })?;

    parsed
        .validate()
        .map_err(|message| GenerationError::InvalidShape {
            shape: schema_name.to_string(),
            message,
        })?;

    Ok(parsed)
}

/// Generates a validated value of type `T`, retrying under `retry`
///
/// # Returns
///
/// * `Ok(T)` - A value that deserialized and passed [`Validate`]
/// * `Err(GenerationError)` - The last failure once retries are exhausted
pub async fn generate<T>(
    generator: &dyn StructuredGenerator,
    retry: &RetryPolicy,
    system_prompt: &str,
    prompt: &str,
) -> Result<T, GenerationError>
where
    T: JsonSchema + DeserializeOwned + Validate,
{
    let request = GenerationRequest::for_type::<T>(system_prompt, prompt);

    retry
        .execute(|| async {
            let value = generator.generate_value(&request).await?;
            decode::<T>(&request.schema_name, value).map_err(|e| {
                generator.discard(&request);
                e
            })
        })
        .await
}
