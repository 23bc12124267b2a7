//! Run state and the records that flow through it
//!
//! [`RunState`] is created once per job with identity and control fields only. Every
//! stage returns a [`StageDelta`]; the runner merges it field by field with
//! [`RunState::apply`]. Fields a delta leaves as `None` keep their previous value, and
//! error records are only ever appended.

use crate::crawler::FetchResult;
use crate::llm::Validate;
use crate::pipeline::Stage;
use crate::{Classify, ErrorKind};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// One recorded failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Name of the stage that recorded it
    pub stage: String,
    pub message: String,
    pub kind: ErrorKind,
}

impl ErrorRecord {
    pub fn new(stage: Stage, message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            stage: stage.as_str().to_string(),
            message: message.into(),
            kind,
        }
    }

    /// Records `err` against `stage`, keeping the kind it was raised with
    pub fn from_error<E: Classify + fmt::Display>(stage: Stage, err: &E) -> Self {
        Self::new(stage, err.to_string(), err.kind())
    }
}

/// How a query should be researched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ResearchMode {
    /// Comparison of known, named competitors
    A,
    /// Market analysis of an established category
    B,
    /// Concept or early-stage market
    C,
    /// Solution recommendation for a concrete need
    D,
    /// Macro framework or industry structure
    E,
}

impl ResearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::A => "Known competitor comparison",
            Self::B => "Market analysis",
            Self::C => "Concept / early-stage market",
            Self::D => "Solution recommendation",
            Self::E => "Macro framework",
        }
    }
}

impl fmt::Display for ResearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One locked entity and the product that represents it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EntityModelMapping {
    /// Company or organization name
    pub entity: String,
    /// Flagship product or model, empty when there is none
    #[serde(default)]
    pub representative_model: String,
}

fn default_mode_confidence() -> f64 {
    0.8
}

/// Output of the plan stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResearchPlan {
    pub research_mode: ResearchMode,

    /// Confidence in the chosen mode, between 0 and 1
    #[serde(default = "default_mode_confidence")]
    pub mode_confidence: f64,

    #[serde(default)]
    pub mode_reason: String,

    #[serde(default)]
    pub feasibility_assessment: String,

    /// Kind of thing being compared, for example "AI coding assistant"
    #[serde(default)]
    pub entity_type: String,

    /// Kinds of thing that must not be extracted
    #[serde(default)]
    pub excluded_types: Vec<String>,

    /// The locked entity list; extraction never introduces entities outside it
    #[serde(default)]
    pub entity_model_mapping: Vec<EntityModelMapping>,

    /// Search queries, best first
    #[serde(default)]
    pub search_keywords: Vec<String>,

    #[serde(default)]
    pub risk_note: String,
}

impl ResearchPlan {
    /// Names of the locked entities, trimmed, blanks dropped
    pub fn canonical_entities(&self) -> Vec<String> {
        self.entity_model_mapping
            .iter()
            .map(|m| m.entity.trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl Validate for ResearchPlan {
    fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.mode_confidence) {
            return Err(format!(
                "mode_confidence must be within [0, 1], got {}",
                self.mode_confidence
            ));
        }
        if self
            .entity_model_mapping
            .iter()
            .any(|m| m.entity.trim().is_empty())
        {
            return Err("entity_model_mapping contains an empty entity name".to_string());
        }
        Ok(())
    }
}

/// Structured facts about one entity, taken from one page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedEntity {
    /// Company or organization, "NO_MATCH" when the page covers no locked entity
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub release_date: String,
    #[serde(default)]
    pub positioning: String,
    #[serde(default)]
    pub tech_specs: String,
    #[serde(default)]
    pub business_model: String,
    #[serde(default)]
    pub pricing: String,
    #[serde(default)]
    pub advantages: String,
    #[serde(default)]
    pub disadvantages: String,
    #[serde(default)]
    pub target_users: String,
    #[serde(default)]
    pub market_judgment: String,

    #[serde(default)]
    #[schemars(skip)]
    pub source_url: String,

    #[serde(default)]
    #[schemars(skip)]
    pub source_title: String,
}

impl ExtractedEntity {
    /// Looks up a descriptive field by name
    pub fn field(&self, name: &str) -> Option<&str> {
        let value = match name {
            "company" => &self.company,
            "product_name" => &self.product_name,
            "release_date" => &self.release_date,
            "positioning" => &self.positioning,
            "tech_specs" => &self.tech_specs,
            "business_model" => &self.business_model,
            "pricing" => &self.pricing,
            "advantages" => &self.advantages,
            "disadvantages" => &self.disadvantages,
            "target_users" => &self.target_users,
            "market_judgment" => &self.market_judgment,
            _ => return None,
        };
        Some(value.as_str())
    }
}

impl Validate for ExtractedEntity {}

/// One dimension of the comparison table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub dimension: String,
    /// Entity name to value, ordered by entity name
    pub values: BTreeMap<String, String>,
}

/// Dimension → entity → value, dimensions in their fixed order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonTable {
    pub rows: Vec<ComparisonRow>,
}

impl ComparisonTable {
    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|row| row.values.is_empty())
    }

    /// Entity names that appear in any row, sorted
    pub fn entities(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .rows
            .iter()
            .flat_map(|row| row.values.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn row(&self, dimension: &str) -> Option<&ComparisonRow> {
        self.rows.iter().find(|row| row.dimension == dimension)
    }
}

/// The mutable record threaded through one job
#[derive(Debug, Clone, PartialEq)]
pub struct RunState {
    pub job_id: String,
    pub trace_id: String,
    pub query: String,

    /// Stages run so far; never decreases
    pub step_count: u32,
    pub max_steps: u32,
    pub max_urls: usize,

    pub plan: Option<ResearchPlan>,
    pub urls: Vec<String>,
    pub filtered_urls: Vec<String>,
    pub pages: Vec<FetchResult>,
    pub entities: Vec<ExtractedEntity>,
    pub comparison_table: Option<ComparisonTable>,
    pub report_md: Option<String>,
    pub report_json: Option<Value>,

    /// Chronological, append-only
    pub errors: Vec<ErrorRecord>,
    pub progress: String,
}

impl RunState {
    /// Creates the initial state: identity and control fields only
    pub fn new(
        job_id: impl Into<String>,
        trace_id: impl Into<String>,
        query: impl Into<String>,
        max_steps: u32,
        max_urls: usize,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            trace_id: trace_id.into(),
            query: query.into(),
            step_count: 0,
            max_steps,
            max_urls,
            plan: None,
            urls: Vec::new(),
            filtered_urls: Vec::new(),
            pages: Vec::new(),
            entities: Vec::new(),
            comparison_table: None,
            report_md: None,
            report_json: None,
            errors: Vec::new(),
            progress: String::new(),
        }
    }

    /// Merges a stage's delta into the state
    ///
    /// `step_count` only ever moves forward; a delta carrying a lower count is ignored
    /// for that field.
    pub fn apply(&mut self, delta: StageDelta) {
        self.step_count = self.step_count.max(delta.step_count);
        self.progress = delta.progress;

        if let Some(plan) = delta.plan {
            self.plan = Some(plan);
        }
        if let Some(urls) = delta.urls {
            self.urls = urls;
        }
        if let Some(filtered_urls) = delta.filtered_urls {
            self.filtered_urls = filtered_urls;
        }
        if let Some(pages) = delta.pages {
            self.pages = pages;
        }
        if let Some(entities) = delta.entities {
            self.entities = entities;
        }
        if let Some(table) = delta.comparison_table {
            self.comparison_table = Some(table);
        }
        if let Some(report_md) = delta.report_md {
            self.report_md = Some(report_md);
        }
        if let Some(report_json) = delta.report_json {
            self.report_json = Some(report_json);
        }
        self.errors.extend(delta.errors);
    }

    /// Pages fetched successfully, in crawl order
    pub fn successful_pages(&self) -> impl Iterator<Item = &FetchResult> {
        self.pages.iter().filter(|page| page.success)
    }
}

/// Partial update returned by one stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageDelta {
    pub step_count: u32,
    pub progress: String,
    pub plan: Option<ResearchPlan>,
    pub urls: Option<Vec<String>>,
    pub filtered_urls: Option<Vec<String>>,
    pub pages: Option<Vec<FetchResult>>,
    pub entities: Option<Vec<ExtractedEntity>>,
    pub comparison_table: Option<ComparisonTable>,
    pub report_md: Option<String>,
    pub report_json: Option<Value>,
    /// Records to append, not a replacement list
    pub errors: Vec<ErrorRecord>,
}

impl StageDelta {
    /// Empty delta for the stage that runs on `state`, advancing the step count by one
    pub fn next(state: &RunState, progress: impl Into<String>) -> Self {
        Self {
            step_count: state.step_count + 1,
            progress: progress.into(),
            ..Default::default()
        }
    }

    pub fn with_plan(mut self, plan: ResearchPlan) -> Self {
        self.plan = Some(plan);
        self
    }

    pub fn with_urls(mut self, urls: Vec<String>) -> Self {
        self.urls = Some(urls);
        self
    }

    pub fn with_filtered_urls(mut self, urls: Vec<String>) -> Self {
        self.filtered_urls = Some(urls);
        self
    }

    pub fn with_pages(mut self, pages: Vec<FetchResult>) -> Self {
        self.pages = Some(pages);
        self
    }

    pub fn with_entities(mut self, entities: Vec<ExtractedEntity>) -> Self {
        self.entities = Some(entities);
        self
    }

    pub fn with_comparison_table(mut self, table: ComparisonTable) -> Self {
        self.comparison_table = Some(table);
        self
    }

    pub fn with_reports(mut self, report_md: String, report_json: Value) -> Self {
        self.report_md = Some(report_md);
        self.report_json = Some(report_json);
        self
    }

    pub fn with_error(mut self, error: ErrorRecord) -> Self {
        self.errors.push(error);
        self
    }

    pub fn with_errors(mut self, errors: impl IntoIterator<Item = ErrorRecord>) -> Self {
        self.errors.extend(errors);
        self
    }
}
