//! In-memory TTL cache in front of a structured generator
//!
//! Keys are `generation:` followed by the first 16 hex characters of a SHA-256 over the
//! schema name, system prompt and prompt. Only successful results are cached, and a result
//! the caller could not decode is discarded again so the next attempt reaches upstream.
//! Expired entries are swept on every insert.

use super::{GenerationRequest, StructuredGenerator};
use crate::GenerationError;
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct CacheEntry {
    stored_at: Instant,
    value: Value,
}

/// Caching decorator for any [`StructuredGenerator`]
pub struct CachedGenerator {
    inner: Arc<dyn StructuredGenerator>,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl CachedGenerator {
    pub fn new(inner: Arc<dyn StructuredGenerator>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Computes the cache key for a request
    pub fn cache_key(request: &GenerationRequest) -> String {
        let mut hasher = Sha256::new();
        for part in [
            request.schema_name.as_str(),
            request.system_prompt.as_str(),
            request.prompt.as_str(),
        ] {
            hasher.update(part.as_bytes());
            // Separator so ("ab", "c") and ("a", "bc") hash differently
            hasher.update([0u8]);
        }
        let digest = hex::encode(hasher.finalize());
        format!("generation:{}", &digest[..16])
    }

    /// Number of live (unexpired) entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        match self.entries.lock() {
            Ok(entries) => entries
                .values()
                .filter(|entry| now.duration_since(entry.stored_at) < self.ttl)
                .count(),
            Err(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock().ok()?;
        let fresh = entries
            .get(key)
            .map(|entry| entry.stored_at.elapsed() < self.ttl)?;

        if fresh {
            entries.get(key).map(|entry| entry.value.clone())
        } else {
            entries.remove(key);
            None
        }
    }

    fn store(&self, key: String, value: Value) {
        if let Ok(mut entries) = self.entries.lock() {
            let ttl = self.ttl;
            entries.retain(|_, entry| entry.stored_at.elapsed() < ttl);
            entries.insert(
                key,
                CacheEntry {
                    stored_at: Instant::now(),
                    value,
                },
            );
        }
    }
}

#[async_trait]
impl StructuredGenerator for CachedGenerator {
    async fn generate_value(&self, request: &GenerationRequest) -> Result<Value, GenerationError> {
        let key = Self::cache_key(request);

        if let Some(value) = self.lookup(&key) {
            tracing::debug!("Generation cache hit for {} ({})", request.schema_name, key);
            return Ok(value);
        }

        let value = self.inner.generate_value(request).await?;
        self.store(key, value.clone());
        Ok(value)
    }

    fn discard(&self, request: &GenerationRequest) {
        let key = Self::cache_key(request);
        if let Ok(mut entries) = self.entries.lock() {
            if entries.remove(&key).is_some() {
                tracing::debug!("Dropped undecodable {} result ({})", request.schema_name, key);
            }
        }
        self.inner.discard(request);
    }
}
