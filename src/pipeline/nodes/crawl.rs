use crate::crawler::{BatchSummary, FetchPool};
use crate::pipeline::nodes::StageNode;
use crate::pipeline::{ErrorRecord, RunState, Services, Stage, StageDelta};
use crate::{ErrorKind, ScoutError};
use async_trait::async_trait;
use std::sync::Arc;

/// Fetches every filtered URL through a bounded pool
pub struct CrawlNode;

#[async_trait]
impl StageNode for CrawlNode {
    fn stage(&self) -> Stage {
        Stage::Crawl
    }

    async fn execute(&self, state: &RunState, services: &Services) -> Result<StageDelta, ScoutError> {
        let pool = FetchPool::new(
            Arc::clone(&services.fetcher),
            services.fetch_retry.clone(),
            services.crawl_concurrency,
        );
        let pages = pool.fetch_many(&state.filtered_urls).await;

        let errors: Vec<ErrorRecord> = pages
            .iter()
            .filter(|page| !page.success)
            .map(|page| {
                let message = page.error.as_deref().unwrap_or("fetch failed");
                ErrorRecord::new(
                    Stage::Crawl,
                    format!("{}: {}", page.url, message),
                    page.error_kind.unwrap_or(ErrorKind::Fetch),
                )
            })
            .collect();

        let summary = BatchSummary::of(&pages);
        let progress = format!(
            "Crawled {} pages ({} succeeded, {} failed)",
            summary.total, summary.succeeded, summary.failed
        );
        Ok(StageDelta::next(state, progress)
            .with_pages(pages)
            .with_errors(errors))
    }
}
