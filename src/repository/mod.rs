//! Persistence contracts for chunks, question audits, and document metadata.

mod memory;
pub mod similarity;

pub use memory::{InMemoryChunkRepository, InMemoryDocumentRepository, InMemoryQueryRepository};
pub use similarity::{cosine_similarity, rank_by_similarity};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

/// Errors returned by repository backends.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Backend could not be reached or rejected the request.
    #[error("Repository backend failed: {0}")]
    Backend(String),
    /// Record addressed by id does not exist.
    #[error("Record not found: {0}")]
    NotFound(String),
    /// Stored data could not be decoded into the expected shape.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl From<crate::qdrant::QdrantError> for RepositoryError {
    fn from(error: crate::qdrant::QdrantError) -> Self {
        Self::Backend(error.to_string())
    }
}

/// One persisted chunk, keyed by `(doc_id, chunk_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    /// Owning document.
    pub doc_id: String,
    /// Chunk identifier assigned at embedding time.
    pub chunk_id: String,
    /// Chunk text.
    pub text: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
    /// First page the chunk touches (1-based).
    pub page_start: u32,
    /// Last page the chunk touches (1-based).
    pub page_end: u32,
    /// Estimated token count.
    pub token_count: usize,
}

/// A stored chunk paired with its similarity to a query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// The matching chunk.
    pub chunk: StoredChunk,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

/// Outcome of a best-effort bulk insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertReport {
    /// Records that were persisted.
    pub inserted: usize,
    /// Records the backend refused.
    pub failed: usize,
}

/// Page range and excerpt backing an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySource {
    /// Every page the chunk spans, ascending.
    pub page_numbers: Vec<u32>,
    /// Leading excerpt of the chunk text.
    pub snippet: String,
}

/// Append-only audit entry, one per question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRecord {
    /// Document the question was asked against.
    pub doc_id: String,
    /// Question text exactly as asked.
    pub question: String,
    /// Answer returned to the caller.
    pub answer: String,
    /// Sources returned to the caller.
    pub sources: Vec<QuerySource>,
    /// When the question was answered.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Lifecycle status of a processed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Pipeline is running.
    Processing,
    /// Pipeline completed.
    Ready,
    /// Pipeline failed; see `error_message`.
    Error,
}

/// Metadata persisted for every uploaded document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    /// Document identifier.
    pub doc_id: String,
    /// Original file name.
    pub file_name: String,
    /// SHA-256 of the uploaded bytes, hex encoded.
    pub content_hash: String,
    /// Category label, empty when processing failed.
    pub category: String,
    /// Page count, zero when unknown.
    pub page_count: usize,
    /// Prose summary.
    pub summary: String,
    /// Highlight bullets.
    pub highlights: Vec<String>,
    /// Current status.
    pub status: DocumentStatus,
    /// Failure message for `error` documents.
    pub error_message: Option<String>,
}

/// Chunk persistence used by the store stage and the QA service.
#[async_trait]
pub trait ChunkRepository: Send + Sync {
    /// Persist records without ordering guarantees; individual failures do not abort the rest.
    async fn insert_many(&self, records: Vec<StoredChunk>) -> Result<InsertReport, RepositoryError>;

    /// Every chunk stored for `doc_id`.
    async fn find_by_document(&self, doc_id: &str) -> Result<Vec<StoredChunk>, RepositoryError>;

    /// The `top_k` chunks of `doc_id` most similar to `query_vector`, best first.
    ///
    /// The default loads all of the document's chunks and ranks them in memory.
    async fn find_similar_chunks(
        &self,
        doc_id: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, RepositoryError> {
        let chunks = self.find_by_document(doc_id).await?;
        Ok(rank_by_similarity(chunks, query_vector, top_k))
    }
}

/// Append-only audit log of answered questions.
#[async_trait]
pub trait QueryRepository: Send + Sync {
    /// Persist one record and return it.
    async fn create(&self, record: QueryRecord) -> Result<QueryRecord, RepositoryError>;

    /// Records for `doc_id`, oldest first.
    async fn list_for_document(&self, doc_id: &str) -> Result<Vec<QueryRecord>, RepositoryError>;
}

/// Document metadata persistence owned by the upload flow.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Insert or replace the metadata for `record.doc_id`.
    async fn create_document(&self, record: DocumentMetadata) -> Result<(), RepositoryError>;

    /// Look up a document.
    async fn get_document(&self, doc_id: &str) -> Result<Option<DocumentMetadata>, RepositoryError>;

    /// Mark a document as failed with `message`.
    async fn set_error_state(&self, doc_id: &str, message: &str) -> Result<(), RepositoryError>;
}
