//! [`ChunkRepository`] backed by a Qdrant collection.

use async_trait::async_trait;
use tokio::sync::OnceCell;

use super::client::QdrantService;
use super::filters::document_filter;
use super::payload::{build_point, chunk_from_point};
use super::types::QdrantError;
use crate::repository::{ChunkRepository, InsertReport, RepositoryError, StoredChunk};

/// Stores chunks as Qdrant points keyed by `(doc_id, chunk_id)`.
///
/// The collection and its `doc_id` index are created on first write. Similarity ranking runs
/// in-process over the document's scrolled points.
pub struct QdrantChunkRepository {
    service: QdrantService,
    collection: String,
    vector_size: usize,
    ready: OnceCell<()>,
}

impl QdrantChunkRepository {
    /// Build a repository over `collection` holding vectors of `vector_size` dimensions.
    pub fn new(service: QdrantService, collection: impl Into<String>, vector_size: usize) -> Self {
        Self {
            service,
            collection: collection.into(),
            vector_size,
            ready: OnceCell::new(),
        }
    }

    async fn ensure_collection(&self) -> Result<(), QdrantError> {
        self.ready
            .get_or_try_init(|| async {
                self.service
                    .create_collection_if_not_exists(&self.collection, self.vector_size as u64)
                    .await?;
                self.service
                    .ensure_keyword_index(&self.collection, "doc_id")
                    .await
            })
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl ChunkRepository for QdrantChunkRepository {
    async fn insert_many(
        &self,
        records: Vec<StoredChunk>,
    ) -> Result<InsertReport, RepositoryError> {
        self.ensure_collection().await?;

        let total = records.len();
        let points: Vec<_> = records
            .iter()
            .filter(|record| record.vector.len() == self.vector_size)
            .map(build_point)
            .collect();
        let skipped = total - points.len();
        if skipped > 0 {
            tracing::warn!(
                collection = %self.collection,
                skipped,
                expected = self.vector_size,
                "Skipping chunks with mismatched vector dimension"
            );
        }

        let inserted = self.service.upsert_points(&self.collection, points).await?;
        Ok(InsertReport {
            inserted,
            failed: skipped,
        })
    }

    async fn find_by_document(&self, doc_id: &str) -> Result<Vec<StoredChunk>, RepositoryError> {
        let points = self
            .service
            .scroll_points(&self.collection, document_filter(doc_id), true)
            .await?;

        points.into_iter().map(chunk_from_point).collect()
    }
}
