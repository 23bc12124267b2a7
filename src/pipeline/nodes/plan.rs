use crate::llm::generate;
use crate::pipeline::nodes::StageNode;
use crate::pipeline::state::ResearchPlan;
use crate::pipeline::{RunState, Services, Stage, StageDelta};
use crate::ScoutError;
use async_trait::async_trait;

const SYSTEM_PROMPT: &str = "You are a senior industry research planner. \
Classify the research question, lock the list of entities to study and propose search \
keywords. Never invent companies that are not relevant to the question.";

fn build_prompt(query: &str) -> String {
    format!(
        "Research question: {query}\n\n\
         1. Choose research_mode:\n\
         - A: comparison of known, named competitors\n\
         - B: market analysis of an established category\n\
         - C: concept or early-stage market with few mature products\n\
         - D: recommendation of a solution for a concrete need\n\
         - E: macro framework or industry structure\n\
         2. Give mode_confidence (0 to 1) and a one-sentence mode_reason.\n\
         3. Assess feasibility of researching this from public web pages.\n\
         4. Name the entity_type under study and the excluded_types that must be ignored.\n\
         5. Lock 3 to 8 entities in entity_model_mapping, each with its representative \
         product or model (leave it empty if there is none).\n\
         6. Propose up to 3 search_keywords, most useful first.\n\
         7. Add a risk_note if the question is ambiguous or the data is likely thin."
    )
}

/// Classifies the query and locks the entity list
pub struct PlanNode;

#[async_trait]
impl StageNode for PlanNode {
    fn stage(&self) -> Stage {
        Stage::Plan
    }

    async fn execute(&self, state: &RunState, services: &Services) -> Result<StageDelta, ScoutError> {
        let plan: ResearchPlan = generate(
            services.generator.as_ref(),
            &services.generation_retry,
            SYSTEM_PROMPT,
            &build_prompt(&state.query),
        )
        .await?;

        tracing::info!(
            "Research plan: mode {} ({:.0}%), {} locked entities, {} keywords",
            plan.research_mode,
            plan.mode_confidence * 100.0,
            plan.entity_model_mapping.len(),
            plan.search_keywords.len()
        );

        let progress = format!(
            "Planned {} research with {} entities",
            plan.research_mode.description(),
            plan.entity_model_mapping.len()
        );
        Ok(StageDelta::next(state, progress).with_plan(plan))
    }
}
