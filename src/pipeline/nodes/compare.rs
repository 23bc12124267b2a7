use crate::pipeline::nodes::StageNode;
use crate::pipeline::state::{ComparisonRow, ComparisonTable, ExtractedEntity, ResearchMode};
use crate::pipeline::{RunState, Services, Stage, StageDelta};
use crate::ScoutError;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Placeholder for a dimension the sources did not cover
pub const MISSING_VALUE: &str = "Unknown";

/// Product-centred dimensions for competitor comparisons: (label, entity field)
const COMPETITOR_DIMENSIONS: &[(&str, &str)] = &[
    ("Company", "company"),
    ("Representative product", "product_name"),
    ("Positioning", "positioning"),
    ("Core features", "tech_specs"),
    ("Collaboration", "business_model"),
    ("Target users", "target_users"),
    ("Best fit", "market_judgment"),
    ("Pricing", "pricing"),
    ("Strengths", "advantages"),
    ("Weaknesses", "disadvantages"),
];

const MARKET_DIMENSIONS: &[(&str, &str)] = &[
    ("Company", "company"),
    ("Representative product", "product_name"),
    ("Release date", "release_date"),
    ("Positioning", "positioning"),
    ("Technical specs", "tech_specs"),
    ("Business model", "business_model"),
    ("Pricing", "pricing"),
    ("Strengths", "advantages"),
    ("Weaknesses", "disadvantages"),
    ("Target users", "target_users"),
    ("Market judgment", "market_judgment"),
];

/// Fixed dimension set for a research mode
pub fn dimensions_for(mode: ResearchMode) -> &'static [(&'static str, &'static str)] {
    match mode {
        ResearchMode::A => COMPETITOR_DIMENSIONS,
        _ => MARKET_DIMENSIONS,
    }
}

fn is_missing(value: &str) -> bool {
    value.trim().is_empty() || value == MISSING_VALUE
}

/// Builds the comparison table
///
/// Every dimension of the mode is present, in order. Entities are keyed by company
/// name; when several records share a name the first non-missing value per dimension
/// wins. The result depends only on the inputs.
pub fn build_comparison_table(entities: &[ExtractedEntity], mode: ResearchMode) -> ComparisonTable {
    let rows = dimensions_for(mode)
        .iter()
        .map(|(label, field)| {
            let mut values: BTreeMap<String, String> = BTreeMap::new();
            for entity in entities {
                let name = entity.company.trim();
                if name.is_empty() {
                    continue;
                }
                let value = entity
                    .field(field)
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .unwrap_or(MISSING_VALUE);

                let slot = values
                    .entry(name.to_string())
                    .or_insert_with(|| value.to_string());
                if is_missing(slot) && !is_missing(value) {
                    *slot = value.to_string();
                }
            }
            ComparisonRow {
                dimension: label.to_string(),
                values,
            }
        })
        .collect();

    ComparisonTable { rows }
}

/// Aligns extracted entities on the mode's dimensions
pub struct CompareNode;

#[async_trait]
impl StageNode for CompareNode {
    fn stage(&self) -> Stage {
        Stage::Compare
    }

    async fn execute(&self, state: &RunState, _services: &Services) -> Result<StageDelta, ScoutError> {
        let mode = state
            .plan
            .as_ref()
            .map(|plan| plan.research_mode)
            .unwrap_or(ResearchMode::B);
        let table = build_comparison_table(&state.entities, mode);

        let progress = if state.entities.is_empty() {
            "No entities to compare".to_string()
        } else {
            format!(
                "Compared {} entities on {} dimensions",
                table.entities().len(),
                table.rows.len()
            )
        };
        Ok(StageDelta::next(state, progress).with_comparison_table(table))
    }
}
