//! Process-local repository implementations.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    ChunkRepository, DocumentMetadata, DocumentRepository, DocumentStatus, InsertReport,
    QueryRecord, QueryRepository, RepositoryError, StoredChunk,
};

/// Chunk store held in memory, grouped by document.
///
/// Rows are append-only; a record whose `(doc_id, chunk_id)` already exists is counted as a
/// failed insert while the rest of the batch still lands.
#[derive(Default)]
pub struct InMemoryChunkRepository {
    rows: RwLock<HashMap<String, Vec<StoredChunk>>>,
}

impl InMemoryChunkRepository {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored chunks across all documents.
    pub async fn len(&self) -> usize {
        self.rows.read().await.values().map(Vec::len).sum()
    }

    /// Whether no chunks are stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ChunkRepository for InMemoryChunkRepository {
    async fn insert_many(
        &self,
        records: Vec<StoredChunk>,
    ) -> Result<InsertReport, RepositoryError> {
        let mut rows = self.rows.write().await;
        let mut report = InsertReport::default();

        for record in records {
            let bucket = rows.entry(record.doc_id.clone()).or_default();
            if bucket.iter().any(|row| row.chunk_id == record.chunk_id) {
                tracing::debug!(
                    doc_id = %record.doc_id,
                    chunk_id = %record.chunk_id,
                    "Duplicate chunk key rejected"
                );
                report.failed += 1;
                continue;
            }
            bucket.push(record);
            report.inserted += 1;
        }

        Ok(report)
    }

    async fn find_by_document(&self, doc_id: &str) -> Result<Vec<StoredChunk>, RepositoryError> {
        Ok(self
            .rows
            .read()
            .await
            .get(doc_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Query audit log held in memory.
#[derive(Default)]
pub struct InMemoryQueryRepository {
    records: RwLock<Vec<QueryRecord>>,
}

impl InMemoryQueryRepository {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueryRepository for InMemoryQueryRepository {
    async fn create(&self, record: QueryRecord) -> Result<QueryRecord, RepositoryError> {
        self.records.write().await.push(record.clone());
        Ok(record)
    }

    async fn list_for_document(&self, doc_id: &str) -> Result<Vec<QueryRecord>, RepositoryError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|record| record.doc_id == doc_id)
            .cloned()
            .collect())
    }
}

/// Document metadata held in memory.
#[derive(Default)]
pub struct InMemoryDocumentRepository {
    documents: RwLock<HashMap<String, DocumentMetadata>>,
}

impl InMemoryDocumentRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifiers of every known document.
    pub async fn ids(&self) -> HashSet<String> {
        self.documents.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    async fn create_document(&self, record: DocumentMetadata) -> Result<(), RepositoryError> {
        self.documents
            .write()
            .await
            .insert(record.doc_id.clone(), record);
        Ok(())
    }

    async fn get_document(
        &self,
        doc_id: &str,
    ) -> Result<Option<DocumentMetadata>, RepositoryError> {
        Ok(self.documents.read().await.get(doc_id).cloned())
    }

    async fn set_error_state(&self, doc_id: &str, message: &str) -> Result<(), RepositoryError> {
        let mut documents = self.documents.write().await;
        let document = documents
            .get_mut(doc_id)
            .ok_or_else(|| RepositoryError::NotFound(doc_id.to_string()))?;
        document.status = DocumentStatus::Error;
        document.error_message = Some(message.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::rank_by_similarity;
    use time::OffsetDateTime;

    fn chunk(doc: &str, id: &str, vector: Vec<f32>) -> StoredChunk {
        StoredChunk {
            doc_id: doc.into(),
            chunk_id: id.into(),
            text: format!("{doc}/{id}"),
            vector,
            page_start: 1,
            page_end: 2,
            token_count: 3,
        }
    }

    #[tokio::test]
    async fn insert_many_is_best_effort_on_duplicate_keys() {
        let repo = InMemoryChunkRepository::new();
        let report = repo
            .insert_many(vec![
                chunk("doc-a", "1", vec![1.0]),
                chunk("doc-a", "1", vec![1.0]),
                chunk("doc-a", "2", vec![1.0]),
            ])
            .await
            .expect("insert");

        assert_eq!(report, InsertReport { inserted: 2, failed: 1 });
        assert_eq!(repo.len().await, 2);
    }

    #[tokio::test]
    async fn chunks_are_scoped_by_document() {
        let repo = InMemoryChunkRepository::new();
        repo.insert_many(vec![
            chunk("doc-a", "1", vec![1.0, 0.0]),
            chunk("doc-b", "1", vec![1.0, 0.0]),
            chunk("doc-a", "2", vec![0.0, 1.0]),
        ])
        .await
        .expect("insert");

        let hits = repo
            .find_similar_chunks("doc-a", &[0.0, 1.0], 5)
            .await
            .expect("search");
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|hit| hit.chunk.doc_id == "doc-a"));
        assert_eq!(hits[0].chunk.chunk_id, "2");

        let expected = rank_by_similarity(
            repo.find_by_document("doc-a").await.expect("rows"),
            &[0.0, 1.0],
            5,
        );
        assert_eq!(hits, expected);
    }

    #[tokio::test]
    async fn query_log_is_append_only_per_document() {
        let repo = InMemoryQueryRepository::new();
        for (doc, question) in [("doc-a", "first"), ("doc-b", "other"), ("doc-a", "second")] {
            repo.create(QueryRecord {
                doc_id: doc.into(),
                question: question.into(),
                answer: "answer".into(),
                sources: Vec::new(),
                created_at: OffsetDateTime::now_utc(),
            })
            .await
            .expect("create");
        }

        let records = repo.list_for_document("doc-a").await.expect("list");
        let questions: Vec<_> = records.iter().map(|r| r.question.as_str()).collect();
        assert_eq!(questions, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn set_error_state_marks_document() {
        let repo = InMemoryDocumentRepository::new();
        repo.create_document(DocumentMetadata {
            doc_id: "doc-a".into(),
            file_name: "a.pdf".into(),
            content_hash: "abc".into(),
            category: "other".into(),
            page_count: 1,
            summary: String::new(),
            highlights: Vec::new(),
            status: DocumentStatus::Ready,
            error_message: None,
        })
        .await
        .expect("create");

        repo.set_error_state("doc-a", "Embedding failed: boom")
            .await
            .expect("set error");
        let doc = repo.get_document("doc-a").await.expect("get").expect("doc");
        assert_eq!(doc.status, DocumentStatus::Error);
        assert_eq!(doc.error_message.as_deref(), Some("Embedding failed: boom"));

        let missing = repo.set_error_state("nope", "x").await;
        assert!(matches!(missing, Err(RepositoryError::NotFound(_))));
    }
}
