use crate::pipeline::nodes::StageNode;
use crate::pipeline::{RunState, Services, Stage, StageDelta};
use crate::{GuardrailError, ScoutError};
use async_trait::async_trait;
use std::collections::HashSet;

/// Deduplicates `urls` and keeps the first `max_urls`
///
/// # Returns
///
/// The kept URLs and the number of distinct URLs seen before truncation
pub fn filter_urls(urls: &[String], max_urls: usize) -> (Vec<String>, usize) {
    let mut seen = HashSet::new();
    let unique: Vec<String> = urls
        .iter()
        .filter(|url| seen.insert(url.as_str()))
        .cloned()
        .collect();
    let found = unique.len();
    (unique.into_iter().take(max_urls).collect(), found)
}

/// Applies the URL ceiling
pub struct FilterNode;

#[async_trait]
impl StageNode for FilterNode {
    fn stage(&self) -> Stage {
        Stage::Filter
    }

    async fn execute(&self, state: &RunState, _services: &Services) -> Result<StageDelta, ScoutError> {
        let (filtered, found) = filter_urls(&state.urls, state.max_urls);

        if found > state.max_urls {
            let guardrail = GuardrailError::UrlLimitExceeded {
                found,
                max_urls: state.max_urls,
            };
            tracing::warn!("{}", guardrail);
        }

        let progress = format!("Kept {} of {} URLs", filtered.len(), state.urls.len());
        Ok(StageDelta::next(state, progress).with_filtered_urls(filtered))
    }
}
