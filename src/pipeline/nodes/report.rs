//! Report stage
//!
//! Produces the two final payloads from everything the run accumulated:
//! - A markdown report whose sections depend on the research mode
//! - A JSON document carrying the same data in structured form
//!
//! The only collaborator call is a short summary request. When it fails the report is
//! still written, without the summary, and an error record is added.

use crate::crawler::BatchSummary;
use crate::llm::{generate, Validate};
use crate::pipeline::nodes::compare::{build_comparison_table, MISSING_VALUE};
use crate::pipeline::nodes::StageNode;
use crate::pipeline::state::{ComparisonTable, ResearchMode};
use crate::pipeline::{ErrorRecord, RunState, Services, Stage, StageDelta};
use crate::ScoutError;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Concept-mode runs need this many entities before a comparison table is shown
const MIN_CONCEPT_TABLE_ENTITIES: usize = 3;

const SYSTEM_PROMPT: &str = "You are a market research editor. Summarize findings \
strictly from the data provided; do not add facts.";

/// Generated summary shown in the conclusions section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ReportSummary {
    /// One-sentence answer to the research question
    pub headline: String,
    #[serde(default)]
    pub key_findings: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
}

impl Validate for ReportSummary {
    fn validate(&self) -> Result<(), String> {
        if self.headline.trim().is_empty() {
            return Err("headline is empty".to_string());
        }
        Ok(())
    }
}

fn mode_of(state: &RunState) -> Option<ResearchMode> {
    state.plan.as_ref().map(|plan| plan.research_mode)
}

fn conclusion_heading(mode: Option<ResearchMode>) -> &'static str {
    match mode {
        Some(ResearchMode::A) => "Key Differences",
        Some(ResearchMode::B) | None => "Key Trends",
        Some(ResearchMode::C) => "Concept Assessment",
        Some(ResearchMode::D) => "Recommendation",
        Some(ResearchMode::E) => "Framework View",
    }
}

fn build_prompt(state: &RunState, table: &ComparisonTable) -> String {
    let table_json = serde_json::to_string(table).unwrap_or_default();
    let mode = mode_of(state)
        .map(|m| m.description())
        .unwrap_or("Market analysis");
    format!(
        "Research question: {}\nResearch mode: {}\n\nComparison data:\n{}\n\n\
         Write a one-sentence headline, up to 5 key findings and up to 3 risks.",
        state.query, mode, table_json
    )
}

/// Escapes a value for use inside a markdown table cell
fn cell(value: &str) -> String {
    value.replace('|', "\\|").replace(['\r', '\n'], " ")
}

fn push_table(md: &mut String, table: &ComparisonTable) {
    let entities = table.entities();
    md.push_str("| Dimension |");
    for entity in &entities {
        md.push_str(&format!(" {} |", cell(entity)));
    }
    md.push('\n');
    md.push_str("|-----------|");
    for _ in &entities {
        md.push_str("------|");
    }
    md.push('\n');

    for row in &table.rows {
        md.push_str(&format!("| {} |", cell(&row.dimension)));
        for entity in &entities {
            let value = row
                .values
                .get(entity)
                .map(String::as_str)
                .unwrap_or(MISSING_VALUE);
            md.push_str(&format!(" {} |", cell(value)));
        }
        md.push('\n');
    }
    md.push('\n');
}

/// Renders the markdown report
pub fn render_markdown(
    state: &RunState,
    table: &ComparisonTable,
    summary: Option<&ReportSummary>,
) -> String {
    let mode = mode_of(state);
    let mut md = String::new();

    md.push_str(&format!("# {}\n\n", state.query));

    // Classification
    md.push_str("## Research Classification\n\n");
    match &state.plan {
        Some(plan) => {
            md.push_str(&format!(
                "- **Mode**: {} ({}, confidence {:.0}%)\n",
                plan.research_mode,
                plan.research_mode.description(),
                plan.mode_confidence * 100.0
            ));
            if !plan.mode_reason.is_empty() {
                md.push_str(&format!("- **Reason**: {}\n", plan.mode_reason));
            }
            if !plan.feasibility_assessment.is_empty() {
                md.push_str(&format!("- **Feasibility**: {}\n", plan.feasibility_assessment));
            }
            if !plan.risk_note.is_empty() {
                md.push_str(&format!("- **Risk note**: {}\n", plan.risk_note));
            }
        }
        None => md.push_str("- **Mode**: not determined\n"),
    }
    md.push('\n');

    // Locked entities
    if let Some(plan) = &state.plan {
        if !plan.entity_model_mapping.is_empty() {
            md.push_str("## Entities\n\n");
            if !plan.entity_type.is_empty() {
                md.push_str(&format!("**Entity type**: {}\n\n", plan.entity_type));
            }
            md.push_str("| # | Entity | Representative model |\n");
            md.push_str("|---|--------|----------------------|\n");
            for (i, mapping) in plan.entity_model_mapping.iter().enumerate() {
                let model = if mapping.representative_model.is_empty() {
                    "-"
                } else {
                    mapping.representative_model.as_str()
                };
                md.push_str(&format!(
                    "| {} | {} | {} |\n",
                    i + 1,
                    cell(&mapping.entity),
                    cell(model)
                ));
            }
            md.push('\n');
        }
    }

    // Comparison
    let entity_count = table.entities().len();
    match mode {
        Some(ResearchMode::D) | Some(ResearchMode::E) => {}
        Some(ResearchMode::C) if entity_count < MIN_CONCEPT_TABLE_ENTITIES => {
            md.push_str("## Comparison\n\n");
            md.push_str(&format!(
                "Only {} mature product(s) found; a side-by-side comparison would be misleading.\n\n",
                entity_count
            ));
        }
        _ => {
            md.push_str("## Comparison\n\n");
            if table.is_empty() {
                md.push_str("_No entities could be extracted from the crawled pages._\n\n");
            } else {
                push_table(&mut md, table);
            }
        }
    }

    // Conclusions
    md.push_str(&format!("## {}\n\n", conclusion_heading(mode)));
    match summary {
        Some(summary) => {
            md.push_str(&format!("{}\n\n", summary.headline));
            if !summary.key_findings.is_empty() {
                md.push_str("### Key Findings\n\n");
                for finding in &summary.key_findings {
                    md.push_str(&format!("- {}\n", finding));
                }
                md.push('\n');
            }
            if !summary.risks.is_empty() {
                md.push_str("### Risks and Uncertainties\n\n");
                for risk in &summary.risks {
                    md.push_str(&format!("- {}\n", risk));
                }
                md.push('\n');
            }
        }
        None => md.push_str("_Summary unavailable._\n\n"),
    }

    // Sources
    let crawl = BatchSummary::of(&state.pages);
    md.push_str("## Sources\n\n");
    for page in state.successful_pages() {
        let title = if page.title.is_empty() {
            page.url.as_str()
        } else {
            page.title.as_str()
        };
        md.push_str(&format!("- [{}]({})\n", title, page.url));
    }
    if crawl.failed > 0 {
        md.push_str(&format!("\n{} of {} pages could not be fetched.\n", crawl.failed, crawl.total));
    }
    md.push('\n');

    if !state.errors.is_empty() {
        md.push_str("## Errors\n\n");
        for error in &state.errors {
            md.push_str(&format!("- [{}/{}] {}\n", error.stage, error.kind, error.message));
        }
        md.push('\n');
    }

    md
}

/// Renders the JSON report
pub fn render_json(
    state: &RunState,
    table: &ComparisonTable,
    summary: Option<&ReportSummary>,
    errors: &[ErrorRecord],
) -> Result<Value, serde_json::Error> {
    let crawl = BatchSummary::of(&state.pages);
    let sources: Vec<Value> = state
        .successful_pages()
        .map(|page| json!({"url": page.url, "title": page.title}))
        .collect();

    Ok(json!({
        "query": state.query,
        "research_mode": mode_of(state).map(|m| m.as_str()),
        "plan": serde_json::to_value(&state.plan)?,
        "comparison_table": serde_json::to_value(table)?,
        "entities": serde_json::to_value(&state.entities)?,
        "summary": serde_json::to_value(summary)?,
        "sources": sources,
        "errors": serde_json::to_value(errors)?,
        "stats": {
            "urls_found": state.urls.len(),
            "urls_filtered": state.filtered_urls.len(),
            "pages_crawled": crawl.total,
            "pages_succeeded": crawl.succeeded,
            "entities": state.entities.len(),
            "errors": errors.len(),
        },
    }))
}

/// Writes the final markdown and JSON payloads
pub struct ReportNode;

#[async_trait]
impl StageNode for ReportNode {
    fn stage(&self) -> Stage {
        Stage::Report
    }

    async fn execute(&self, state: &RunState, services: &Services) -> Result<StageDelta, ScoutError> {
        let mode = mode_of(state).unwrap_or(ResearchMode::B);
        let table = match &state.comparison_table {
            Some(table) => table.clone(),
            None => build_comparison_table(&state.entities, mode),
        };

        let mut new_errors = Vec::new();
        let summary = match generate::<ReportSummary>(
            services.generator.as_ref(),
            &services.generation_retry,
            SYSTEM_PROMPT,
            &build_prompt(state, &table),
        )
        .await
        {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::warn!("Report summary unavailable: {}", e);
                new_errors.push(ErrorRecord::from_error(Stage::Report, &e));
                None
            }
        };

        // The report lists its own summary failure too
        let mut view = state.clone();
        view.errors.extend(new_errors.iter().cloned());

        let report_md = render_markdown(&view, &table, summary.as_ref());
        let report_json = render_json(&view, &table, summary.as_ref(), &view.errors)?;

        let progress = format!("Report generated ({} chars)", report_md.len());
        Ok(StageDelta::next(state, progress)
            .with_reports(report_md, report_json)
            .with_errors(new_errors))
    }

    fn fallback(&self, state: &RunState, error: &ScoutError) -> StageDelta {
        let record = ErrorRecord::from_error(Stage::Report, error);
        let report_md = format!(
            "# {}\n\nReport generation failed: {}\n",
            state.query, error
        );
        let report_json = json!({
            "query": state.query,
            "error": error.to_string(),
        });
        StageDelta::next(state, "Report generation failed")
            .with_reports(report_md, report_json)
            .with_error(record)
    }
}
