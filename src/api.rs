//! HTTP surface for Docsift.
//!
//! - `POST /documents` – Upload a PDF as the raw request body. The original file name travels
//!   in the `x-file-name` header. Returns the stored document metadata.
//! - `GET /documents/:id` – Fetch a document's metadata and status.
//! - `POST /documents/:id/questions` – Ask a question (`{"question": "..."}`) and receive
//!   `{answer, sources}`.
//! - `GET /metrics` – Observe ingestion and question counters.

use crate::documents::{DocumentApi, UploadError};
use crate::metrics::MetricsSnapshot;
use crate::qa::{QaError, QaResponse};
use crate::repository::{DocumentMetadata, RepositoryError};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;
const FILE_NAME_HEADER: &str = "x-file-name";
const DEFAULT_FILE_NAME: &str = "document.pdf";

/// Build the HTTP router exposing the document API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: DocumentApi + 'static,
{
    Router::new()
        .route("/documents", post(upload_document::<S>))
        .route("/documents/:id", get(get_document::<S>))
        .route("/documents/:id/questions", post(ask_question::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(service)
}

/// Run an uploaded PDF through the pipeline.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<DocumentMetadata>), AppError>
where
    S: DocumentApi,
{
    let file_name = headers
        .get(FILE_NAME_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_FILE_NAME)
        .to_string();

    let metadata = service.upload(&file_name, body.to_vec()).await?;
    tracing::info!(
        doc_id = %metadata.doc_id,
        file_name,
        category = %metadata.category,
        "Upload request completed"
    );
    Ok((StatusCode::CREATED, Json(metadata)))
}

async fn get_document<S>(
    State(service): State<Arc<S>>,
    Path(doc_id): Path<String>,
) -> Result<Json<DocumentMetadata>, AppError>
where
    S: DocumentApi,
{
    service
        .get_document(&doc_id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound(doc_id))
}

/// Request body for `POST /documents/:id/questions`.
#[derive(Deserialize)]
struct QuestionRequest {
    question: String,
}

async fn ask_question<S>(
    State(service): State<Arc<S>>,
    Path(doc_id): Path<String>,
    Json(request): Json<QuestionRequest>,
) -> Result<Json<QaResponse>, AppError>
where
    S: DocumentApi,
{
    if service.get_document(&doc_id).await?.is_none() {
        return Err(AppError::NotFound(doc_id));
    }
    let response = service.ask(&doc_id, &request.question).await?;
    Ok(Json(response))
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: DocumentApi,
{
    Json(service.metrics_snapshot())
}

enum AppError {
    Upload(UploadError),
    Question(QaError),
    Repository(RepositoryError),
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::Upload(error) => {
                let status = match error {
                    UploadError::TooManyPages(_) => StatusCode::PAYLOAD_TOO_LARGE,
                    UploadError::ProcessingTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
                    UploadError::InvalidDocument(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    UploadError::ProcessingFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, Json(error)).into_response()
            }
            Self::Question(error) if error.is_rejection() => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid_question", "message": error.to_string() })),
            )
                .into_response(),
            Self::Question(error) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "question_failed", "message": error.to_string() })),
            )
                .into_response(),
            Self::Repository(error) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "storage_failed", "message": error.to_string() })),
            )
                .into_response(),
            Self::NotFound(doc_id) => (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "error": "not_found",
                    "message": format!("document {doc_id} not found"),
                })),
            )
                .into_response(),
        }
    }
}

impl From<UploadError> for AppError {
    fn from(inner: UploadError) -> Self {
        Self::Upload(inner)
    }
}

impl From<QaError> for AppError {
    fn from(inner: QaError) -> Self {
        Self::Question(inner)
    }
}

impl From<RepositoryError> for AppError {
    fn from(inner: RepositoryError) -> Self {
        Self::Repository(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::create_router;
    use crate::documents::{DocumentApi, UploadError};
    use crate::metrics::MetricsSnapshot;
    use crate::qa::{NO_ANSWER, QaError, QaResponse};
    use crate::repository::{DocumentMetadata, DocumentStatus, QuerySource, RepositoryError};
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{Value, json};
    use std::path::Path;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct StubDocumentService {
        uploads: Mutex<Vec<(String, Vec<u8>)>>,
        reject_with: Option<fn() -> UploadError>,
    }

    fn metadata(doc_id: &str, file_name: &str) -> DocumentMetadata {
        DocumentMetadata {
            doc_id: doc_id.into(),
            file_name: file_name.into(),
            content_hash: "hash".into(),
            category: "user manual".into(),
            page_count: 3,
            summary: "A manual.".into(),
            highlights: vec!["Install first".into()],
            status: DocumentStatus::Ready,
            error_message: None,
        }
    }

    #[async_trait]
    impl DocumentApi for StubDocumentService {
        async fn upload(
            &self,
            file_name: &str,
            bytes: Vec<u8>,
        ) -> Result<DocumentMetadata, UploadError> {
            if let Some(reject) = self.reject_with {
                return Err(reject());
            }
            self.uploads.lock().await.push((file_name.to_string(), bytes));
            Ok(metadata("doc-1", file_name))
        }

        async fn ingest_path(&self, path: &Path) -> Result<DocumentMetadata, UploadError> {
            Ok(metadata("doc-path", &path.display().to_string()))
        }

        async fn get_document(
            &self,
            doc_id: &str,
        ) -> Result<Option<DocumentMetadata>, RepositoryError> {
            Ok((doc_id == "doc-1").then(|| metadata("doc-1", "manual.pdf")))
        }

        async fn ask(&self, _doc_id: &str, question: &str) -> Result<QaResponse, QaError> {
            if question.len() > 10 {
                return Err(QaError::QuestionTooLong {
                    length: question.len(),
                    max: 10,
                });
            }
            if question.contains("zzz") {
                return Ok(QaResponse {
                    answer: NO_ANSWER.into(),
                    sources: Vec::new(),
                });
            }
            Ok(QaResponse {
                answer: "Press the button.".into(),
                sources: vec![QuerySource {
                    page_numbers: vec![2, 3],
                    snippet: "Press the button".into(),
                }],
            })
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                documents_processed: 4,
                documents_failed: 1,
                chunks_stored: 40,
                questions_answered: 2,
                questions_gated: 1,
            }
        }
    }

    async fn send(
        service: Arc<StubDocumentService>,
        request: Request<Body>,
    ) -> (StatusCode, Value) {
        let response = create_router(service)
            .oneshot(request)
            .await
            .expect("router response");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn upload_passes_raw_body_and_file_name() {
        let service = Arc::new(StubDocumentService::default());
        let (status, body) = send(
            service.clone(),
            Request::builder()
                .method(Method::POST)
                .uri("/documents")
                .header("x-file-name", "manual.pdf")
                .body(Body::from(b"%PDF-1.5 bytes".to_vec()))
                .expect("request"),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["docId"], "doc-1");
        assert_eq!(body["status"], "ready");
        assert_eq!(body["category"], "user manual");

        let uploads = service.uploads.lock().await;
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, "manual.pdf");
        assert_eq!(uploads[0].1, b"%PDF-1.5 bytes".to_vec());
    }

    #[tokio::test]
    async fn upload_rejections_are_structured() {
        let service = Arc::new(StubDocumentService {
            reject_with: Some(|| {
                UploadError::TooManyPages(
                    "Extraction failed: document has 150 pages, exceeding the limit of 100".into(),
                )
            }),
            ..Default::default()
        });
        let (status, body) = send(
            service,
            Request::builder()
                .method(Method::POST)
                .uri("/documents")
                .body(Body::from("x"))
                .expect("request"),
        )
        .await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"], "too_many_pages");
        assert!(body["message"].as_str().unwrap_or_default().contains("150 pages"));
    }

    #[tokio::test]
    async fn document_lookup_returns_404_for_unknown_ids() {
        let service = Arc::new(StubDocumentService::default());
        let (status, body) = send(
            service.clone(),
            Request::get("/documents/doc-1").body(Body::empty()).expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["fileName"], "manual.pdf");

        let (status, body) = send(
            service,
            Request::get("/documents/missing").body(Body::empty()).expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn questions_return_answer_and_sources() {
        let service = Arc::new(StubDocumentService::default());
        let request = |question: &str| {
            Request::builder()
                .method(Method::POST)
                .uri("/documents/doc-1/questions")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "question": question }).to_string()))
                .expect("request")
        };

        let (status, body) = send(service.clone(), request("how?")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["answer"], "Press the button.");
        assert_eq!(body["sources"][0]["pageNumbers"], json!([2, 3]));

        let (status, body) = send(service.clone(), request("zzz")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["answer"], NO_ANSWER);
        assert_eq!(body["sources"], json!([]));

        let (status, body) = send(service, request("this is far too long")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_question");
    }

    #[tokio::test]
    async fn questions_for_unknown_documents_are_404() {
        let service = Arc::new(StubDocumentService::default());
        let (status, _) = send(
            service,
            Request::builder()
                .method(Method::POST)
                .uri("/documents/nope/questions")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"question":"hi"}"#))
                .expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_expose_counters() {
        let service = Arc::new(StubDocumentService::default());
        let (status, body) = send(
            service,
            Request::get("/metrics").body(Body::empty()).expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["documentsProcessed"], 4);
        assert_eq!(body["questionsGated"], 1);
    }
}
