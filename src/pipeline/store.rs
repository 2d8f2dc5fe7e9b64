//! Storage stage.

use std::sync::Arc;

use async_trait::async_trait;

use super::orchestrator::PipelineStage;
use super::types::{ProcessingState, Stage, StageError, StateDelta};
use crate::metrics::DocsiftMetrics;
use crate::repository::{ChunkRepository, StoredChunk};

/// Persists chunk embeddings.
///
/// Storage is best-effort by default: backend errors and refused records are logged and the
/// pipeline continues. With `fatal_failures` set, either one fails the stage.
pub struct StoreStage {
    repository: Arc<dyn ChunkRepository>,
    fatal_failures: bool,
    metrics: Option<Arc<DocsiftMetrics>>,
}

impl StoreStage {
    /// Build the stage around a chunk repository.
    pub fn new(repository: Arc<dyn ChunkRepository>, fatal_failures: bool) -> Self {
        Self {
            repository,
            fatal_failures,
            metrics: None,
        }
    }

    /// Record stored chunk counts on `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<DocsiftMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

#[async_trait]
impl PipelineStage for StoreStage {
    fn stage(&self) -> Stage {
        Stage::Store
    }

    async fn run(&self, state: &ProcessingState) -> Result<StateDelta, StageError> {
        let records: Vec<StoredChunk> = state
            .embeddings
            .iter()
            .map(|embedding| StoredChunk {
                doc_id: state.doc_id.clone(),
                chunk_id: embedding.chunk_id.clone(),
                text: embedding.text.clone(),
                vector: embedding.vector.clone(),
                page_start: embedding.page_start,
                page_end: embedding.page_end,
                token_count: embedding.token_count,
            })
            .collect();
        let total = records.len();

        match self.repository.insert_many(records).await {
            Ok(report) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_chunks_stored(report.inserted as u64);
                }
                if report.failed > 0 {
                    tracing::warn!(
                        doc_id = %state.doc_id,
                        inserted = report.inserted,
                        failed = report.failed,
                        "Some chunk records were not stored"
                    );
                    if self.fatal_failures {
                        return Err(StageError::PartialStore {
                            failed: report.failed,
                            total,
                        });
                    }
                } else {
                    tracing::debug!(
                        doc_id = %state.doc_id,
                        inserted = report.inserted,
                        "Stored chunks"
                    );
                }
            }
            Err(error) => {
                if self.fatal_failures {
                    return Err(error.into());
                }
                tracing::warn!(
                    doc_id = %state.doc_id,
                    error = %error,
                    "Chunk storage failed; continuing without stored chunks"
                );
            }
        }

        Ok(StateDelta::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{ChunkEmbedding, DocumentSource};
    use crate::repository::{InMemoryChunkRepository, InsertReport, RepositoryError};

    struct BrokenRepository;

    #[async_trait]
    impl ChunkRepository for BrokenRepository {
        async fn insert_many(
            &self,
            _records: Vec<StoredChunk>,
        ) -> Result<InsertReport, RepositoryError> {
            Err(RepositoryError::Backend("connection refused".into()))
        }

        async fn find_by_document(
            &self,
            _doc_id: &str,
        ) -> Result<Vec<StoredChunk>, RepositoryError> {
            Ok(Vec::new())
        }
    }

    fn state_with(ids: &[&str]) -> ProcessingState {
        let mut state = ProcessingState::new("doc", "a.pdf", DocumentSource::Released);
        state.embeddings = ids
            .iter()
            .map(|id| ChunkEmbedding {
                chunk_id: (*id).into(),
                text: format!("text {id}"),
                vector: vec![1.0, 0.0],
                page_start: 1,
                page_end: 1,
                token_count: 2,
            })
            .collect();
        state
    }

    #[tokio::test]
    async fn stores_every_embedding_under_document() {
        let repository = Arc::new(InMemoryChunkRepository::new());
        let metrics = Arc::new(DocsiftMetrics::new());
        let stage = StoreStage::new(repository.clone(), false).with_metrics(metrics.clone());
        stage.run(&state_with(&["a", "b"])).await.expect("store");

        let stored = repository.find_by_document("doc").await.expect("rows");
        assert_eq!(stored.len(), 2);
        assert_eq!(metrics.snapshot().chunks_stored, 2);
    }

    #[tokio::test]
    async fn backend_errors_are_swallowed_by_default() {
        let stage = StoreStage::new(Arc::new(BrokenRepository), false);
        let delta = stage.run(&state_with(&["a"])).await.expect("best effort");
        assert!(delta.embeddings.is_none());
    }

    #[tokio::test]
    async fn backend_errors_fail_in_strict_mode() {
        let stage = StoreStage::new(Arc::new(BrokenRepository), true);
        let error = stage.run(&state_with(&["a"])).await.unwrap_err();
        assert!(matches!(error, StageError::Storage(_)));
    }

    #[tokio::test]
    async fn partial_failures_follow_strictness() {
        let lenient = StoreStage::new(Arc::new(InMemoryChunkRepository::new()), false);
        lenient.run(&state_with(&["a", "a"])).await.expect("lenient");

        let strict = StoreStage::new(Arc::new(InMemoryChunkRepository::new()), true);
        let error = strict.run(&state_with(&["a", "a"])).await.unwrap_err();
        assert!(matches!(error, StageError::PartialStore { failed: 1, total: 2 }));
    }
}
