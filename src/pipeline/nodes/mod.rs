//! Stage nodes
//!
//! Each node reads the run state, calls collaborators through [`Services`] and returns
//! a [`StageDelta`]. Nodes recover their own expected failures into error records;
//! anything that still escapes `execute` is caught by [`run_node`], which turns it into
//! the node's fallback delta. The step machine never sees an error.

mod compare;
mod crawl;
mod extract;
mod filter;
mod plan;
mod report;
mod search;

pub use compare::{build_comparison_table, dimensions_for, CompareNode, MISSING_VALUE};
pub use crawl::CrawlNode;
pub use extract::{matches_locked_entity, ExtractNode, NO_MATCH};
pub use filter::{filter_urls, FilterNode};
pub use plan::PlanNode;
pub use report::{render_json, render_markdown, ReportNode, ReportSummary};
pub use search::{search_keywords, SearchNode, MAX_KEYWORDS};

use crate::pipeline::{ErrorRecord, RunState, Services, Stage, StageDelta};
use crate::ScoutError;
use async_trait::async_trait;

/// One unit of the pipeline
#[async_trait]
pub trait StageNode: Send + Sync {
    fn stage(&self) -> Stage;

    /// Runs the stage against a snapshot of the state
    async fn execute(&self, state: &RunState, services: &Services) -> Result<StageDelta, ScoutError>;

    /// Delta used when `execute` returned an error
    fn fallback(&self, state: &RunState, error: &ScoutError) -> StageDelta {
        StageDelta::next(state, format!("{} failed: {}", self.stage(), error))
            .with_error(ErrorRecord::from_error(self.stage(), error))
    }
}

/// Returns the node implementing `stage`
pub fn node_for(stage: Stage) -> Box<dyn StageNode> {
    match stage {
        Stage::Plan => Box::new(PlanNode),
        Stage::Search => Box::new(SearchNode),
        Stage::Filter => Box::new(FilterNode),
        Stage::Crawl => Box::new(CrawlNode),
        Stage::Extract => Box::new(ExtractNode),
        Stage::Compare => Box::new(CompareNode),
        Stage::Report => Box::new(ReportNode),
    }
}

/// Runs `node` behind the fail-soft boundary
///
/// The returned delta always advances `step_count` by exactly one.
pub async fn run_node(node: &dyn StageNode, state: &RunState, services: &Services) -> StageDelta {
    let stage = node.stage();
    tracing::info!("Stage {} started (step {}/{})", stage, state.step_count + 1, state.max_steps);

    let mut delta = match node.execute(state, services).await {
        Ok(delta) => delta,
        Err(e) => {
            tracing::error!("Stage {} failed: {}", stage, e);
            node.fallback(state, &e)
        }
    };
    delta.step_count = state.step_count + 1;

    tracing::info!(
        "Stage {} finished: {} ({} new errors)",
        stage,
        delta.progress,
        delta.errors.len()
    );
    delta
}
