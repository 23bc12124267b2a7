use crate::crawler::{truncate_chars, FetchResult};
use crate::llm::generate;
use crate::pipeline::nodes::StageNode;
use crate::pipeline::state::{ExtractedEntity, ResearchPlan};
use crate::pipeline::{ErrorRecord, RunState, Services, Stage, StageDelta};
use crate::{Classify, ScoutError};
use async_trait::async_trait;

/// Company value the generator returns for pages about none of the locked entities
pub const NO_MATCH: &str = "NO_MATCH";

/// Page text sent per extraction request
const PAGE_CONTENT_CHARS: usize = 4_000;

const SYSTEM_PROMPT: &str = "You are an entity-driven research analyst. Extract facts \
only about the locked entities and discard everything else.";

fn build_prompt(plan: Option<&ResearchPlan>, page: &FetchResult) -> String {
    let locked = plan
        .map(ResearchPlan::canonical_entities)
        .filter(|names| !names.is_empty())
        .map(|names| names.join(", "))
        .unwrap_or_else(|| "none".to_string());
    let entity_type = plan
        .map(|p| p.entity_type.as_str())
        .filter(|t| !t.is_empty())
        .unwrap_or("product or service");
    let excluded = plan
        .map(|p| p.excluded_types.iter().take(5).cloned().collect::<Vec<_>>())
        .filter(|types| !types.is_empty())
        .map(|types| types.join(", "))
        .unwrap_or_else(|| "none".to_string());

    format!(
        "Extract information about the locked entities from the web page below.\n\n\
         Locked entities: {locked}\n\
         Entity type: {entity_type}\n\
         Excluded types: {excluded}\n\n\
         Rules:\n\
         - Only describe a locked entity; never introduce a new company.\n\
         - If the page covers none of them, set company to \"{NO_MATCH}\".\n\
         - Fill every field; write \"undisclosed\" when the page does not say.\n\n\
         Page title: {title}\n\
         URL: {url}\n\n\
         Content:\n{content}",
        title = page.title,
        url = page.url,
        content = truncate_chars(&page.content, PAGE_CONTENT_CHARS),
    )
}

/// Matches `company` against the locked list, case-insensitively, by substring either way
///
/// # Returns
///
/// The locked name that matched, or `None`
pub fn matches_locked_entity<'a>(company: &str, locked: &'a [String]) -> Option<&'a str> {
    let company = company.trim().to_lowercase();
    if company.is_empty() {
        return None;
    }
    locked
        .iter()
        .find(|name| {
            let name = name.to_lowercase();
            name.contains(&company) || company.contains(&name)
        })
        .map(String::as_str)
}

/// Extracts one entity record per successful page
pub struct ExtractNode;

#[async_trait]
impl StageNode for ExtractNode {
    fn stage(&self) -> Stage {
        Stage::Extract
    }

    async fn execute(&self, state: &RunState, services: &Services) -> Result<StageDelta, ScoutError> {
        let plan = state.plan.as_ref();
        let locked = plan.map(ResearchPlan::canonical_entities).unwrap_or_default();
        let pages: Vec<&FetchResult> = state.successful_pages().collect();

        let mut entities = Vec::new();
        let mut errors = Vec::new();

        for page in &pages {
            let prompt = build_prompt(plan, page);
            let result = generate::<ExtractedEntity>(
                services.generator.as_ref(),
                &services.generation_retry,
                SYSTEM_PROMPT,
                &prompt,
            )
            .await;

            let mut entity = match result {
                Ok(entity) => entity,
                Err(e) => {
                    tracing::warn!("Extraction failed for {}: {}", page.url, e);
                    errors.push(ErrorRecord::new(
                        Stage::Extract,
                        format!("{}: {}", page.url, e),
                        e.kind(),
                    ));
                    continue;
                }
            };

            let company = entity.company.trim().to_string();
            if company.is_empty() || company.eq_ignore_ascii_case(NO_MATCH) {
                tracing::debug!("No locked entity on {}", page.url);
                continue;
            }
            if !locked.is_empty() {
                match matches_locked_entity(&company, &locked) {
                    Some(name) => entity.company = name.to_string(),
                    None => {
                        tracing::debug!("Discarding {:?} from {}: not a locked entity", company, page.url);
                        continue;
                    }
                }
            } else {
                entity.company = company;
            }

            entity.source_url = page.url.clone();
            entity.source_title = page.title.clone();
            tracing::info!("Extracted {} from {}", entity.company, page.url);
            entities.push(entity);
        }

        let progress = format!(
            "Extracted {} entities from {} pages",
            entities.len(),
            pages.len()
        );
        Ok(StageDelta::next(state, progress)
            .with_entities(entities)
            .with_errors(errors))
    }
}
