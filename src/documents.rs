//! Upload-facing document service.
//!
//! Assigns document ids, runs the ingestion pipeline under a timeout, persists the resulting
//! metadata, and maps failures onto the structured rejections returned to callers. Questions
//! are answered by the wrapped [`QaService`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::ser::SerializeStruct;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use uuid::Uuid;

use crate::config::{ChunkStoreKind, Config};
use crate::embedding::{EmbeddingClientError, get_embedding_client};
use crate::generation::{GenerationError, PromptTemplates, get_text_generator};
use crate::metrics::{DocsiftMetrics, MetricsSnapshot};
use crate::pipeline::{Capabilities, DocumentSource, Orchestrator, PipelineError, PipelineOutcome};
use crate::qa::{QaError, QaResponse, QaService};
use crate::qdrant::{QdrantChunkRepository, QdrantError, QdrantService};
use crate::repository::{
    ChunkRepository, DocumentMetadata, DocumentRepository, DocumentStatus,
    InMemoryChunkRepository, InMemoryDocumentRepository, InMemoryQueryRepository,
    RepositoryError,
};

/// Structured rejection returned from an upload.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Document exceeds the page cap.
    #[error("{0}")]
    TooManyPages(String),
    /// Processing ran past the configured timeout.
    #[error("document processing exceeded {0} seconds")]
    ProcessingTimeout(u64),
    /// Bytes were not a usable PDF or contained no text.
    #[error("{0}")]
    InvalidDocument(String),
    /// Any other failure.
    #[error("{0}")]
    ProcessingFailed(String),
}

impl UploadError {
    /// Machine-readable error kind.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TooManyPages(_) => "too_many_pages",
            Self::ProcessingTimeout(_) => "processing_timeout",
            Self::InvalidDocument(_) => "invalid_document",
            Self::ProcessingFailed(_) => "processing_failed",
        }
    }
}

impl From<&PipelineError> for UploadError {
    fn from(error: &PipelineError) -> Self {
        let message = error.to_string();
        if error.is_too_many_pages() {
            Self::TooManyPages(message)
        } else if error.is_input_rejection() {
            Self::InvalidDocument(message)
        } else {
            Self::ProcessingFailed(message)
        }
    }
}

impl From<RepositoryError> for UploadError {
    fn from(error: RepositoryError) -> Self {
        Self::ProcessingFailed(error.to_string())
    }
}

impl Serialize for UploadError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut body = serializer.serialize_struct("UploadError", 2)?;
        body.serialize_field("error", self.kind())?;
        body.serialize_field("message", &self.to_string())?;
        body.end()
    }
}

/// Failures while wiring the service from configuration.
#[derive(Debug, Error)]
pub enum StartupError {
    /// Embedding provider could not be constructed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Generation provider could not be constructed.
    #[error(transparent)]
    Generation(#[from] GenerationError),
    /// Qdrant client could not be constructed.
    #[error(transparent)]
    Qdrant(#[from] QdrantError),
    /// Qdrant chunk store selected without a URL.
    #[error("CHUNK_STORE=qdrant requires QDRANT_URL")]
    MissingQdrantUrl,
}

/// Operations exposed to the HTTP layer and the CLI.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    /// Process an uploaded PDF.
    async fn upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<DocumentMetadata, UploadError>;

    /// Process a PDF on local disk.
    async fn ingest_path(&self, path: &Path) -> Result<DocumentMetadata, UploadError>;

    /// Look up a document's metadata.
    async fn get_document(
        &self,
        doc_id: &str,
    ) -> Result<Option<DocumentMetadata>, RepositoryError>;

    /// Answer a question about a processed document.
    async fn ask(&self, doc_id: &str, question: &str) -> Result<QaResponse, QaError>;

    /// Current activity counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Default [`DocumentApi`] implementation.
pub struct DocumentService {
    orchestrator: Orchestrator,
    documents: Arc<dyn DocumentRepository>,
    qa: QaService,
    metrics: Arc<DocsiftMetrics>,
    timeout: Duration,
}

impl DocumentService {
    /// Assemble the service from already-built parts.
    pub fn new(
        orchestrator: Orchestrator,
        documents: Arc<dyn DocumentRepository>,
        qa: QaService,
        metrics: Arc<DocsiftMetrics>,
        timeout: Duration,
    ) -> Self {
        Self {
            orchestrator,
            documents,
            qa,
            metrics,
            timeout,
        }
    }

    /// Wire providers, repositories, pipeline, and QA from configuration.
    pub fn from_config(config: &Config) -> Result<Self, StartupError> {
        let embedder = get_embedding_client(config)?;
        let generator = get_text_generator(config)?;
        let chunks: Arc<dyn ChunkRepository> = match config.chunk_store {
            ChunkStoreKind::Memory => Arc::new(InMemoryChunkRepository::new()),
            ChunkStoreKind::Qdrant => {
                let url = config
                    .qdrant_url
                    .as_deref()
                    .ok_or(StartupError::MissingQdrantUrl)?;
                let service = QdrantService::new(url, config.qdrant_api_key.clone())?;
                Arc::new(QdrantChunkRepository::new(
                    service,
                    config.qdrant_collection_name.clone(),
                    config.embedding_dimension,
                ))
            }
        };
        let prompts = Arc::new(PromptTemplates::default());
        let metrics = Arc::new(DocsiftMetrics::new());

        let orchestrator = Orchestrator::new(
            Capabilities {
                embedder: Arc::clone(&embedder),
                generator: Arc::clone(&generator),
                chunks: Arc::clone(&chunks),
                prompts: Arc::clone(&prompts),
                metrics: Some(Arc::clone(&metrics)),
            },
            config.pipeline_settings(),
        );
        let qa = QaService::new(
            embedder,
            generator,
            chunks,
            Arc::new(InMemoryQueryRepository::new()),
            prompts,
            config.qa_settings(),
        )
        .with_metrics(Arc::clone(&metrics));

        tracing::info!(
            embedding_provider = ?config.embedding_provider,
            generation_provider = ?config.generation_provider,
            chunk_store = ?config.chunk_store,
            "Document service ready"
        );

        Ok(Self::new(
            orchestrator,
            Arc::new(InMemoryDocumentRepository::new()),
            qa,
            metrics,
            config.processing_timeout(),
        ))
    }

    async fn process(
        &self,
        file_name: &str,
        source: DocumentSource,
        content_hash: String,
    ) -> Result<DocumentMetadata, UploadError> {
        let doc_id = Uuid::new_v4().to_string();
        let mut metadata = DocumentMetadata {
            doc_id: doc_id.clone(),
            file_name: file_name.to_string(),
            content_hash,
            category: String::new(),
            page_count: 0,
            summary: String::new(),
            highlights: Vec::new(),
            status: DocumentStatus::Processing,
            error_message: None,
        };
        self.documents.create_document(metadata.clone()).await?;
        tracing::info!(doc_id = %doc_id, file_name, "Processing document");

        let run = self.orchestrator.run(&doc_id, file_name, source);
        let failure = match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(outcome)) => {
                apply_outcome(&mut metadata, outcome);
                self.documents.create_document(metadata.clone()).await?;
                self.metrics.record_document_processed();
                tracing::info!(
                    doc_id = %doc_id,
                    category = %metadata.category,
                    pages = metadata.page_count,
                    "Document ready"
                );
                return Ok(metadata);
            }
            Ok(Err(error)) => UploadError::from(&error),
            Err(_) => UploadError::ProcessingTimeout(self.timeout.as_secs()),
        };

        self.metrics.record_document_failed();
        tracing::warn!(
            doc_id = %doc_id,
            kind = failure.kind(),
            error = %failure,
            "Document failed"
        );
        if let Err(error) = self
            .documents
            .set_error_state(&doc_id, &failure.to_string())
            .await
        {
            tracing::error!(
                doc_id = %doc_id,
                error = %error,
                "Failed to record document error state"
            );
        }
        Err(failure)
    }
}

fn apply_outcome(metadata: &mut DocumentMetadata, outcome: PipelineOutcome) {
    metadata.category = outcome.category.label().to_string();
    metadata.page_count = outcome.page_count;
    metadata.summary = outcome.summary;
    metadata.highlights = outcome.highlights;
    metadata.status = DocumentStatus::Ready;
}

/// Hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

async fn file_hash(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[async_trait]
impl DocumentApi for DocumentService {
    async fn upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<DocumentMetadata, UploadError> {
        if bytes.is_empty() {
            return Err(UploadError::InvalidDocument("uploaded document is empty".into()));
        }
        let hash = content_hash(&bytes);
        self.process(file_name, DocumentSource::from_bytes(bytes), hash)
            .await
    }

    async fn ingest_path(&self, path: &Path) -> Result<DocumentMetadata, UploadError> {
        let hash = file_hash(path)
            .await
            .map_err(|err| UploadError::InvalidDocument(format!("{}: {err}", path.display())))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.process(&file_name, DocumentSource::Path(path.to_path_buf()), hash)
            .await
    }

    async fn get_document(
        &self,
        doc_id: &str,
    ) -> Result<Option<DocumentMetadata>, RepositoryError> {
        self.documents.get_document(doc_id).await
    }

    async fn ask(&self, doc_id: &str, question: &str) -> Result<QaResponse, QaError> {
        self.qa.answer(doc_id, question).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
