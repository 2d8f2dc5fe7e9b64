//! State, deltas, and error definitions for the ingestion pipeline.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use super::classify::Category;
use super::embed::DEFAULT_EMBED_CONCURRENCY;
use super::pdf::ExtractionError;
use crate::embedding::EmbeddingClientError;
use crate::generation::GenerationError;
use crate::repository::RepositoryError;

/// Tunables shared by the pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Characters carried over from the previous chunk.
    pub chunk_overlap: usize,
    /// Documents with more pages are rejected.
    pub max_pages: usize,
    /// Leading chunks sampled by the classifier.
    pub classifier_context_chunks: usize,
    /// Leading chunks sampled by the summarizer.
    pub summarizer_context_chunks: usize,
    /// Turn storage failures into pipeline errors instead of logging them.
    pub store_failures_fatal: bool,
    /// Embedding requests in flight at once.
    pub embed_concurrency: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            max_pages: 100,
            classifier_context_chunks: 8,
            summarizer_context_chunks: 20,
            store_failures_fatal: false,
            embed_concurrency: DEFAULT_EMBED_CONCURRENCY,
        }
    }
}

/// Where the document bytes come from.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// In-memory upload.
    Buffer(Arc<[u8]>),
    /// File on local disk.
    Path(PathBuf),
    /// The extractor already consumed the input.
    Released,
}

impl DocumentSource {
    /// Wrap an owned buffer.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::Buffer(Arc::from(bytes))
    }
}

/// A slice of the document text with its page attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Chunk text, possibly starting with overlap from the previous chunk.
    pub text: String,
    /// First page the chunk touches (1-based).
    pub page_start: u32,
    /// Last page the chunk touches (1-based), never below `page_start`.
    pub page_end: u32,
    /// `ceil(chars / 4)` estimate.
    pub token_count: usize,
}

/// A chunk paired with its vector and a freshly assigned identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkEmbedding {
    /// Random identifier, not derived from content.
    pub chunk_id: String,
    /// Chunk text.
    pub text: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
    /// First page the chunk touches.
    pub page_start: u32,
    /// Last page the chunk touches.
    pub page_end: u32,
    /// Estimated token count.
    pub token_count: usize,
}

/// Running state of one pipeline invocation.
///
/// Owned by a single run. Stages read it by reference and return a [`StateDelta`]; the
/// orchestrator folds each delta into a new state value.
#[derive(Debug, Clone)]
pub struct ProcessingState {
    /// Document identifier, fixed for the run.
    pub doc_id: String,
    /// Original file name.
    pub source_name: String,
    /// Input bytes, released after extraction.
    pub source: DocumentSource,
    /// Full extracted text.
    pub text: Option<String>,
    /// Ordered chunks.
    pub chunks: Vec<TextChunk>,
    /// One embedding per chunk, same order as `chunks`.
    pub embeddings: Vec<ChunkEmbedding>,
    /// Classified category.
    pub category: Option<Category>,
    /// Prose summary.
    pub summary: Option<String>,
    /// At most ten single-line highlights.
    pub highlights: Vec<String>,
    /// Total page count.
    pub page_count: Option<usize>,
    /// Stage-qualified failure message; once set no further stage runs.
    pub error: Option<String>,
}

impl ProcessingState {
    /// Fresh state for a run.
    pub fn new(
        doc_id: impl Into<String>,
        source_name: impl Into<String>,
        source: DocumentSource,
    ) -> Self {
        Self {
            doc_id: doc_id.into(),
            source_name: source_name.into(),
            source,
            text: None,
            chunks: Vec::new(),
            embeddings: Vec::new(),
            category: None,
            summary: None,
            highlights: Vec::new(),
            page_count: None,
            error: None,
        }
    }

    /// Fold a stage's delta into a new state value.
    pub fn apply(self, delta: StateDelta) -> Self {
        let StateDelta {
            text,
            chunks,
            page_count,
            embeddings,
            category,
            summary,
            highlights,
            release_source,
        } = delta;

        Self {
            source: if release_source {
                DocumentSource::Released
            } else {
                self.source
            },
            text: text.or(self.text),
            chunks: chunks.unwrap_or(self.chunks),
            page_count: page_count.or(self.page_count),
            embeddings: embeddings.unwrap_or(self.embeddings),
            category: category.or(self.category),
            summary: summary.or(self.summary),
            highlights: highlights.unwrap_or(self.highlights),
            ..self
        }
    }

    /// Move into the absorbing error state.
    pub fn fail(self, message: String) -> Self {
        Self {
            error: Some(message),
            ..self
        }
    }
}

/// Fields a stage wants to change; `None` leaves the current value alone.
#[derive(Debug, Clone, Default)]
pub struct StateDelta {
    /// Extracted text.
    pub text: Option<String>,
    /// Chunks.
    pub chunks: Option<Vec<TextChunk>>,
    /// Page count.
    pub page_count: Option<usize>,
    /// Embeddings.
    pub embeddings: Option<Vec<ChunkEmbedding>>,
    /// Category.
    pub category: Option<Category>,
    /// Summary.
    pub summary: Option<String>,
    /// Highlights.
    pub highlights: Option<Vec<String>>,
    /// Drop the input bytes.
    pub release_source: bool,
}

/// The pipeline's stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// PDF parsing and chunking.
    Extract,
    /// Vector computation.
    Embed,
    /// Chunk persistence.
    Store,
    /// Category selection.
    Classify,
    /// Summary and highlights.
    Summarize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Extract => "Extraction",
            Self::Embed => "Embedding",
            Self::Store => "Storage",
            Self::Classify => "Classification",
            Self::Summarize => "Summarization",
        };
        f.write_str(label)
    }
}

/// Failure raised by a single stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// PDF could not be read or parsed.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// Document exceeds the configured page cap.
    #[error("document has {pages} pages, exceeding the limit of {max}")]
    TooManyPages {
        /// Pages reported by the parser.
        pages: usize,
        /// Configured maximum.
        max: usize,
    },
    /// Parsing succeeded but produced no text.
    #[error("no extractable text found in document")]
    EmptyDocument,
    /// Input file could not be read.
    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),
    /// Input was already consumed.
    #[error("document source is no longer available")]
    SourceReleased,
    /// Embedding stage received no chunks.
    #[error("no chunks to embed")]
    NoChunks,
    /// A prerequisite field was never populated.
    #[error("missing {0} in processing state")]
    MissingInput(&'static str),
    /// Embedding provider failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Generation provider failed.
    #[error(transparent)]
    Generation(#[from] GenerationError),
    /// Chunk repository failed.
    #[error(transparent)]
    Storage(#[from] RepositoryError),
    /// Some records were refused while strict storage is enabled.
    #[error("{failed} of {total} chunk records were not stored")]
    PartialStore {
        /// Refused records.
        failed: usize,
        /// Records submitted.
        total: usize,
    },
    /// Background task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

/// Stage-qualified pipeline failure, displayed as `"<Stage> failed: <detail>"`.
#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    /// Stage that failed.
    pub stage: Stage,
    /// Underlying failure.
    #[source]
    pub source: StageError,
}

impl PipelineError {
    /// Whether the document was rejected for exceeding the page cap.
    pub fn is_too_many_pages(&self) -> bool {
        matches!(self.source, StageError::TooManyPages { .. })
    }

    /// Whether the input itself was unusable (bad PDF, no text, oversized).
    pub fn is_input_rejection(&self) -> bool {
        matches!(
            self.source,
            StageError::TooManyPages { .. }
                | StageError::EmptyDocument
                | StageError::Extraction(_)
        )
    }
}

/// Failed run: the error plus the state reached before it.
#[derive(Debug)]
pub struct PipelineFailure {
    /// What went wrong.
    pub error: PipelineError,
    /// State at the moment of failure, with `error` set.
    pub state: Box<ProcessingState>,
}

/// Values returned from a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    /// Document identifier.
    pub doc_id: String,
    /// Classified category.
    pub category: Category,
    /// Prose summary.
    pub summary: String,
    /// Highlight bullets.
    pub highlights: Vec<String>,
    /// Total page count.
    pub page_count: usize,
    /// Number of chunks produced.
    pub chunk_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ProcessingState {
        ProcessingState::new("doc-1", "a.pdf", DocumentSource::from_bytes(vec![1, 2, 3]))
    }

    #[test]
    fn apply_merges_only_present_fields() {
        let first = state().apply(StateDelta {
            text: Some("hello".into()),
            page_count: Some(3),
            release_source: true,
            ..Default::default()
        });
        assert_eq!(first.text.as_deref(), Some("hello"));
        assert_eq!(first.page_count, Some(3));
        assert!(matches!(first.source, DocumentSource::Released));

        let second = first.apply(StateDelta {
            summary: Some("short".into()),
            ..Default::default()
        });
        assert_eq!(second.text.as_deref(), Some("hello"));
        assert_eq!(second.summary.as_deref(), Some("short"));
        assert_eq!(second.doc_id, "doc-1");
    }

    #[test]
    fn pipeline_error_is_stage_qualified() {
        let error = PipelineError {
            stage: Stage::Extract,
            source: StageError::TooManyPages { pages: 101, max: 100 },
        };
        assert_eq!(
            error.to_string(),
            "Extraction failed: document has 101 pages, exceeding the limit of 100"
        );
        assert!(error.is_too_many_pages());
        assert!(error.is_input_rejection());

        let embed = PipelineError {
            stage: Stage::Embed,
            source: StageError::NoChunks,
        };
        assert_eq!(embed.to_string(), "Embedding failed: no chunks to embed");
        assert!(!embed.is_input_rejection());
    }
}
