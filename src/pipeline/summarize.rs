//! Summarization stage: prose summary plus highlight bullets.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;

use super::classify::{Category, leading_context};
use super::orchestrator::PipelineStage;
use super::types::{ProcessingState, Stage, StageError, StateDelta};
use crate::generation::{PromptTemplates, TextGenerator, render_template};

/// Upper bound on highlights kept from a reply.
pub const MAX_HIGHLIGHTS: usize = 10;

static NUMBERED_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[.)]\s+").expect("valid numbered-list regex"));

const BULLET_MARKERS: &[char] = &['-', '*', '•', '–', '·'];

/// Split a model reply into clean highlight lines.
///
/// Blank lines are dropped, list markers stripped, and at most [`MAX_HIGHLIGHTS`] kept.
pub(crate) fn parse_highlights(reply: &str) -> Vec<String> {
    reply
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(strip_list_markers)
        .filter(|line| !line.is_empty())
        .take(MAX_HIGHLIGHTS)
        .collect()
}

/// Remove bullets, list numbers, and the whitespace between them until none lead the line.
fn strip_list_markers(line: &str) -> String {
    let mut current = line.trim();
    loop {
        let unbulleted = current.trim_start_matches(BULLET_MARKERS).trim_start();
        let next = match NUMBERED_PREFIX.find(unbulleted) {
            Some(prefix) => unbulleted[prefix.end()..].trim_start(),
            None => unbulleted,
        };
        if next.len() == current.len() {
            return next.trim_end().to_string();
        }
        current = next;
    }
}

/// Produces the summary and highlights with two concurrent generator calls.
pub struct SummarizeStage {
    generator: Arc<dyn TextGenerator>,
    prompts: Arc<PromptTemplates>,
    context_chunks: usize,
}

impl SummarizeStage {
    /// Build the stage.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        prompts: Arc<PromptTemplates>,
        context_chunks: usize,
    ) -> Self {
        Self {
            generator,
            prompts,
            context_chunks,
        }
    }
}

#[async_trait]
impl PipelineStage for SummarizeStage {
    fn stage(&self) -> Stage {
        Stage::Summarize
    }

    async fn run(&self, state: &ProcessingState) -> Result<StateDelta, StageError> {
        let context = leading_context(state, self.context_chunks)?;
        let category = state.category.unwrap_or(Category::Other);
        let max_highlights = MAX_HIGHLIGHTS.to_string();

        let summary_prompt = render_template(
            &self.prompts.summary,
            &[
                ("category", category.label()),
                ("file_name", state.source_name.as_str()),
                ("context", context.as_str()),
            ],
        );
        let highlights_prompt = render_template(
            &self.prompts.highlights,
            &[
                ("category", category.label()),
                ("max_highlights", max_highlights.as_str()),
                ("context", context.as_str()),
            ],
        );

        let (summary, highlights_reply) = tokio::try_join!(
            self.generator.invoke(&summary_prompt),
            self.generator.invoke(&highlights_prompt),
        )?;
        let highlights = parse_highlights(&highlights_reply);

        tracing::info!(
            doc_id = %state.doc_id,
            summary_chars = summary.chars().count(),
            highlights = highlights.len(),
            "Summarized document"
        );

        Ok(StateDelta {
            summary: Some(summary.trim().to_string()),
            highlights: Some(highlights),
            ..Default::default()
        })
    }
}
