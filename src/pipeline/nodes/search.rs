use crate::pipeline::nodes::StageNode;
use crate::pipeline::{ErrorRecord, RunState, Services, Stage, StageDelta};
use crate::ScoutError;
use async_trait::async_trait;
use std::collections::HashSet;

/// Maximum number of plan keywords searched per job
pub const MAX_KEYWORDS: usize = 3;

/// Keywords to search: the plan's first [`MAX_KEYWORDS`], or the raw query
pub fn search_keywords(state: &RunState) -> Vec<String> {
    let keywords: Vec<String> = state
        .plan
        .as_ref()
        .map(|plan| {
            plan.search_keywords
                .iter()
                .map(|k| k.trim())
                .filter(|k| !k.is_empty())
                .take(MAX_KEYWORDS)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if keywords.is_empty() {
        vec![state.query.trim().to_string()]
    } else {
        keywords
    }
}

/// Runs every keyword through the search provider and collects URLs
pub struct SearchNode;

#[async_trait]
impl StageNode for SearchNode {
    fn stage(&self) -> Stage {
        Stage::Search
    }

    async fn execute(&self, state: &RunState, services: &Services) -> Result<StageDelta, ScoutError> {
        let keywords = search_keywords(state);
        let mut seen = HashSet::new();
        let mut urls = Vec::new();
        let mut errors = Vec::new();

        for keyword in &keywords {
            match services.search.search(keyword, state.max_urls).await {
                Ok(hits) => {
                    tracing::debug!("Keyword {:?} returned {} hits", keyword, hits.len());
                    for hit in hits {
                        if seen.insert(hit.url.clone()) {
                            urls.push(hit.url);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Search failed for keyword {:?}: {}", keyword, e);
                    errors.push(ErrorRecord::from_error(Stage::Search, &e));
                }
            }
        }

        let progress = format!("Found {} URLs from {} keywords", urls.len(), keywords.len());
        Ok(StageDelta::next(state, progress)
            .with_urls(urls)
            .with_errors(errors))
    }
}
