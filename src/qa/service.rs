use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use super::QaSettings;
use super::normalize::normalize_question;
use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use crate::generation::{GenerationError, PromptTemplates, TextGenerator, render_template};
use crate::metrics::DocsiftMetrics;
use crate::repository::{
    ChunkRepository, QueryRecord, QueryRepository, QuerySource, RepositoryError, ScoredChunk,
};

/// Fixed answer when the document cannot support an answer.
pub const NO_ANSWER: &str =
    "The document does not contain sufficient information to answer this question.";

const SNIPPET_CHARS: usize = 200;

/// Errors surfaced by [`QaService::answer`].
#[derive(Debug, Error)]
pub enum QaError {
    /// Question exceeded the configured length limit.
    #[error("question is {length} characters long; the limit is {max}")]
    QuestionTooLong {
        /// Characters in the question.
        length: usize,
        /// Configured limit.
        max: usize,
    },
    /// Question was blank.
    #[error("question must not be empty")]
    EmptyQuestion,
    /// Question could not be embedded.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Answer could not be generated.
    #[error(transparent)]
    Generation(#[from] GenerationError),
    /// Chunk lookup or audit logging failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl QaError {
    /// Whether the caller supplied an unusable question.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::QuestionTooLong { .. } | Self::EmptyQuestion)
    }
}

/// Answer plus the page ranges that back it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaResponse {
    /// Generated answer or [`NO_ANSWER`].
    pub answer: String,
    /// Supporting chunks; empty for the no-answer sentinel.
    pub sources: Vec<QuerySource>,
}

/// Answers questions against one document's chunks.
///
/// Uses the same embedding capability as ingestion so question and chunk vectors share a space.
pub struct QaService {
    embedder: Arc<dyn EmbeddingClient>,
    generator: Arc<dyn TextGenerator>,
    chunks: Arc<dyn ChunkRepository>,
    queries: Arc<dyn QueryRepository>,
    prompts: Arc<PromptTemplates>,
    settings: QaSettings,
    metrics: Option<Arc<DocsiftMetrics>>,
}

impl QaService {
    /// Build the service.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        generator: Arc<dyn TextGenerator>,
        chunks: Arc<dyn ChunkRepository>,
        queries: Arc<dyn QueryRepository>,
        prompts: Arc<PromptTemplates>,
        settings: QaSettings,
    ) -> Self {
        Self {
            embedder,
            generator,
            chunks,
            queries,
            prompts,
            settings,
            metrics: None,
        }
    }

    /// Record answered and gated questions on `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<DocsiftMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Answer `question` from the chunks stored for `doc_id`.
    ///
    /// Every successful call appends one [`QueryRecord`] holding the question as asked.
    pub async fn answer(&self, doc_id: &str, question: &str) -> Result<QaResponse, QaError> {
        let length = question.chars().count();
        if length > self.settings.max_question_chars {
            return Err(QaError::QuestionTooLong {
                length,
                max: self.settings.max_question_chars,
            });
        }
        if question.trim().is_empty() {
            return Err(QaError::EmptyQuestion);
        }

        match self.answer_inner(doc_id, question).await {
            Ok(response) => Ok(response),
            Err(error) => {
                tracing::error!(doc_id, error = %error, "Question answering failed");
                Err(error)
            }
        }
    }

    async fn answer_inner(&self, doc_id: &str, question: &str) -> Result<QaResponse, QaError> {
        let normalized = normalize_question(question);
        let query_vector = self.embedder.embed_text(&normalized).await?;
        let ranked = self
            .chunks
            .find_similar_chunks(doc_id, &query_vector, self.settings.top_k)
            .await?;

        let relevant: Vec<ScoredChunk> = ranked
            .into_iter()
            .filter(|hit| hit.score >= self.settings.relevance_threshold)
            .collect();

        if relevant.is_empty() {
            tracing::info!(doc_id, question = %normalized, "No chunk cleared the relevance gate");
            if let Some(metrics) = &self.metrics {
                metrics.record_question_gated();
            }
            return self.record(doc_id, question, NO_ANSWER.to_string(), Vec::new()).await;
        }

        let context = build_context(&relevant);
        let prompt = render_template(
            &self.prompts.answer,
            &[
                ("context", context.as_str()),
                ("question", normalized.as_str()),
                ("no_answer", NO_ANSWER),
            ],
        );
        let answer = self.generator.invoke(&prompt).await?.trim().to_string();

        let sources = if is_no_answer(&answer) {
            Vec::new()
        } else {
            relevant.iter().map(source_for).collect()
        };

        tracing::info!(
            doc_id,
            used_chunks = relevant.len(),
            top_score = relevant[0].score,
            "Answered question"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_question_answered();
        }

        self.record(doc_id, question, answer, sources).await
    }

    async fn record(
        &self,
        doc_id: &str,
        question: &str,
        answer: String,
        sources: Vec<QuerySource>,
    ) -> Result<QaResponse, QaError> {
        let record = self
            .queries
            .create(QueryRecord {
                doc_id: doc_id.to_string(),
                question: question.to_string(),
                answer,
                sources,
                created_at: OffsetDateTime::now_utc(),
            })
            .await?;

        Ok(QaResponse {
            answer: record.answer,
            sources: record.sources,
        })
    }
}

fn is_no_answer(answer: &str) -> bool {
    answer.trim_end_matches('.') == NO_ANSWER.trim_end_matches('.')
}

/// `"[Pages {start}-{end}]: {text}"` blocks separated by blank lines.
fn build_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|hit| {
            format!(
                "[Pages {}-{}]: {}",
                hit.chunk.page_start, hit.chunk.page_end, hit.chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn source_for(hit: &ScoredChunk) -> QuerySource {
    QuerySource {
        page_numbers: (hit.chunk.page_start..=hit.chunk.page_end).collect(),
        snippet: snippet(&hit.chunk.text),
    }
}

fn snippet(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= SNIPPET_CHARS {
        return trimmed.to_string();
    }
    let head: String = trimmed.chars().take(SNIPPET_CHARS).collect();
    format!("{}...", head.trim_end())
}
