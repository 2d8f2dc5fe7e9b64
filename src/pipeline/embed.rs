//! Embedding stage.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt, stream};
use uuid::Uuid;

use super::orchestrator::PipelineStage;
use super::types::{ChunkEmbedding, ProcessingState, Stage, StageError, StateDelta};
use crate::embedding::EmbeddingClient;

/// Requests in flight at once unless overridden.
pub const DEFAULT_EMBED_CONCURRENCY: usize = 8;

/// Computes one vector per chunk, with a bounded number of concurrent requests.
pub struct EmbedStage {
    embedder: Arc<dyn EmbeddingClient>,
    concurrency: usize,
}

impl EmbedStage {
    /// Build the stage around an embedding capability.
    pub fn new(embedder: Arc<dyn EmbeddingClient>) -> Self {
        Self {
            embedder,
            concurrency: DEFAULT_EMBED_CONCURRENCY,
        }
    }

    /// Cap concurrent embedding requests at `limit` (at least one).
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit.max(1);
        self
    }
}

#[async_trait]
impl PipelineStage for EmbedStage {
    fn stage(&self) -> Stage {
        Stage::Embed
    }

    async fn run(&self, state: &ProcessingState) -> Result<StateDelta, StageError> {
        if state.chunks.is_empty() {
            return Err(StageError::NoChunks);
        }

        // `buffered` yields results in input order regardless of completion order.
        let requests: Vec<_> = state
            .chunks
            .iter()
            .map(|chunk| self.embedder.embed_text(&chunk.text))
            .collect();
        let vectors: Vec<Vec<f32>> = stream::iter(requests)
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let embeddings: Vec<ChunkEmbedding> = state
            .chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| ChunkEmbedding {
                chunk_id: Uuid::new_v4().to_string(),
                text: chunk.text.clone(),
                vector,
                page_start: chunk.page_start,
                page_end: chunk.page_end,
                token_count: chunk.token_count,
            })
            .collect();

        tracing::debug!(doc_id = %state.doc_id, count = embeddings.len(), "Embedded chunks");

        Ok(StateDelta {
            embeddings: Some(embeddings),
            ..Default::default()
        })
    }
}
