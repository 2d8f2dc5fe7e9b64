//! Classification stage and the closed category set.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::orchestrator::PipelineStage;
use super::types::{ProcessingState, Stage, StageError, StateDelta};
use crate::generation::{PromptTemplates, TextGenerator, render_template};

/// Document categories a classifier may choose from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Category {
    /// Peer-reviewed or preprint research.
    #[serde(rename = "research paper")]
    ResearchPaper,
    /// Internal or public business reporting.
    #[serde(rename = "business report")]
    BusinessReport,
    /// End-user product instructions.
    #[serde(rename = "user manual")]
    UserManual,
    /// Agreements and contracts.
    #[serde(rename = "legal contract")]
    LegalContract,
    /// Balance sheets, filings, statements.
    #[serde(rename = "financial statement")]
    FinancialStatement,
    /// Journalism.
    #[serde(rename = "news article")]
    NewsArticle,
    /// Developer and API documentation.
    #[serde(rename = "technical documentation")]
    TechnicalDocumentation,
    /// Dissertations and theses.
    #[serde(rename = "academic thesis")]
    AcademicThesis,
    /// Anything else, and the fallback for unrecognized replies.
    #[default]
    #[serde(rename = "other")]
    Other,
}

impl Category {
    /// Every category in match priority order.
    pub const ALL: [Category; 9] = [
        Category::ResearchPaper,
        Category::BusinessReport,
        Category::UserManual,
        Category::LegalContract,
        Category::FinancialStatement,
        Category::NewsArticle,
        Category::TechnicalDocumentation,
        Category::AcademicThesis,
        Category::Other,
    ];

    /// Lowercase label used in prompts and storage.
    pub const fn label(self) -> &'static str {
        match self {
            Category::ResearchPaper => "research paper",
            Category::BusinessReport => "business report",
            Category::UserManual => "user manual",
            Category::LegalContract => "legal contract",
            Category::FinancialStatement => "financial statement",
            Category::NewsArticle => "news article",
            Category::TechnicalDocumentation => "technical documentation",
            Category::AcademicThesis => "academic thesis",
            Category::Other => "other",
        }
    }

    /// Map free-form model output onto a category.
    ///
    /// The reply is trimmed and lowercased; the first label in [`Category::ALL`] order found as
    /// a substring wins. Anything unrecognized becomes [`Category::Other`].
    pub fn from_reply(reply: &str) -> Self {
        let normalized = reply.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|category| normalized.contains(category.label()))
            .unwrap_or_default()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Joins the first `limit` chunk texts into a prompt context.
pub(crate) fn leading_context(state: &ProcessingState, limit: usize) -> Result<String, StageError> {
    if state.chunks.is_empty() {
        return Err(StageError::MissingInput("chunks"));
    }
    Ok(state
        .chunks
        .iter()
        .take(limit.max(1))
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n"))
}

/// Asks the generator to pick a category from the leading chunks.
pub struct ClassifyStage {
    generator: Arc<dyn TextGenerator>,
    prompts: Arc<PromptTemplates>,
    context_chunks: usize,
}

impl ClassifyStage {
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
impl PipelineStage for ClassifyStage {
    fn stage(&self) -> Stage {
        Stage::Classify
    }

    async fn run(&self, state: &ProcessingState) -> Result<StateDelta, StageError> {
        let context = leading_context(state, self.context_chunks)?;
        let categories = Category::ALL
            .iter()
            .map(|category| format!("- {category}"))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = render_template(
            &self.prompts.classify,
            &[
                ("categories", categories.as_str()),
                ("file_name", state.source_name.as_str()),
                ("context", context.as_str()),
            ],
        );

        let reply = self.generator.invoke(&prompt).await?;
        let category = Category::from_reply(&reply);
        tracing::info!(doc_id = %state.doc_id, %category, "Classified document");

        Ok(StateDelta {
            category: Some(category),
            ..Default::default()
        })
    }
}
