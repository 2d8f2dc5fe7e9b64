//! Extraction stage: PDF bytes to page-attributed chunks.

use std::sync::Arc;

use async_trait::async_trait;

use super::chunking::{attribute_pages, estimate_tokens, split_text};
use super::orchestrator::PipelineStage;
use super::pdf::{ParsedPdf, PdfParser};
use super::types::{
    DocumentSource, PipelineSettings, ProcessingState, Stage, StageError, StateDelta, TextChunk,
};

/// Reads the source, enforces the page cap, and chunks the text.
pub struct ExtractStage {
    parser: Arc<dyn PdfParser>,
    settings: PipelineSettings,
}

impl ExtractStage {
    /// Build the stage around a parser.
    pub fn new(parser: Arc<dyn PdfParser>, settings: PipelineSettings) -> Self {
        Self { parser, settings }
    }

    async fn load_bytes(source: &DocumentSource) -> Result<Arc<[u8]>, StageError> {
        match source {
            DocumentSource::Buffer(bytes) => Ok(Arc::clone(bytes)),
            DocumentSource::Path(path) => Ok(Arc::from(tokio::fs::read(path).await?)),
            DocumentSource::Released => Err(StageError::SourceReleased),
        }
    }

    async fn parse(&self, bytes: Arc<[u8]>) -> Result<ParsedPdf, StageError> {
        let parser = Arc::clone(&self.parser);
        let limit = self.settings.max_pages;
        let parsed = tokio::task::spawn_blocking(move || parser.parse(&bytes, limit))
            .await
            .map_err(|err| StageError::Task(err.to_string()))??;
        Ok(parsed)
    }
}

#[async_trait]
impl PipelineStage for ExtractStage {
    fn stage(&self) -> Stage {
        Stage::Extract
    }

    async fn run(&self, state: &ProcessingState) -> Result<StateDelta, StageError> {
        let bytes = Self::load_bytes(&state.source).await?;
        let parsed = self.parse(bytes).await?;

        if parsed.page_count > self.settings.max_pages {
            return Err(StageError::TooManyPages {
                pages: parsed.page_count,
                max: self.settings.max_pages,
            });
        }

        let text = parsed.pages.join("\n\n");
        if text.trim().is_empty() {
            return Err(StageError::EmptyDocument);
        }

        let raw_chunks = split_text(&text, self.settings.chunk_size, self.settings.chunk_overlap);
        let chunks = if raw_chunks.is_empty() {
            vec![TextChunk {
                token_count: estimate_tokens(&text),
                text: text.clone(),
                page_start: 1,
                page_end: parsed.page_count.max(1) as u32,
            }]
        } else {
            attribute_pages(raw_chunks, &parsed.pages)
        };

        tracing::info!(
            doc_id = %state.doc_id,
            pages = parsed.page_count,
            chunks = chunks.len(),
            chars = text.chars().count(),
            "Extracted document text"
        );

        Ok(StateDelta {
            text: Some(text),
            chunks: Some(chunks),
            page_count: Some(parsed.page_count),
            release_source: true,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::pdf::{ExtractionError, LopdfParser, test_support::pdf_with_pages};

    struct FakeParser {
        parsed: ParsedPdf,
    }

    impl PdfParser for FakeParser {
        fn parse(&self, _bytes: &[u8], _page_limit: usize) -> Result<ParsedPdf, ExtractionError> {
            Ok(self.parsed.clone())
        }
    }

    fn stage_with(pages: Vec<&str>, page_count: usize, settings: PipelineSettings) -> ExtractStage {
        let parser = FakeParser {
            parsed: ParsedPdf {
                page_count,
                pages: pages.into_iter().map(String::from).collect(),
            },
        };
        ExtractStage::new(Arc::new(parser), settings)
    }

    fn state() -> ProcessingState {
        ProcessingState::new("doc-1", "a.pdf", DocumentSource::from_bytes(b"%PDF".to_vec()))
    }

    #[tokio::test]
    async fn rejects_documents_over_page_cap() {
        let stage = stage_with(Vec::new(), 101, PipelineSettings::default());
        let error = stage.run(&state()).await.unwrap_err();
        assert!(matches!(error, StageError::TooManyPages { pages: 101, max: 100 }));
    }

    #[tokio::test]
    async fn accepts_documents_at_page_cap() {
        let pages: Vec<&str> = std::iter::repeat_n("page text", 100).collect();
        let stage = stage_with(pages, 100, PipelineSettings::default());
        let delta = stage.run(&state()).await.expect("extract");
        assert_eq!(delta.page_count, Some(100));
    }

    #[tokio::test]
    async fn rejects_documents_without_text() {
        let stage = stage_with(vec!["", "   "], 2, PipelineSettings::default());
        let error = stage.run(&state()).await.unwrap_err();
        assert!(matches!(error, StageError::EmptyDocument));
    }

    #[tokio::test]
    async fn produces_attributed_chunks_and_releases_source() {
        let settings = PipelineSettings {
            chunk_size: 40,
            chunk_overlap: 0,
            ..PipelineSettings::default()
        };
        let stage = stage_with(
            vec!["The first page talks about apples.", "The second page talks about pears."],
            2,
            settings,
        );
        let delta = stage.run(&state()).await.expect("extract");

        let chunks = delta.chunks.expect("chunks");
        assert_eq!(chunks.len(), 2);
        assert_eq!((chunks[0].page_start, chunks[0].page_end), (1, 1));
        assert_eq!((chunks[1].page_start, chunks[1].page_end), (2, 2));
        assert!(delta.release_source);
        assert_eq!(
            delta.text.as_deref(),
            Some("The first page talks about apples.\n\nThe second page talks about pears.")
        );
    }

    #[tokio::test]
    async fn released_source_is_an_error() {
        let stage = stage_with(vec!["text"], 1, PipelineSettings::default());
        let mut state = state();
        state.source = DocumentSource::Released;
        let error = stage.run(&state).await.unwrap_err();
        assert!(matches!(error, StageError::SourceReleased));
    }

    #[tokio::test]
    async fn reads_pdf_from_disk() {
        let path = std::env::temp_dir().join(format!("docsift-{}.pdf", uuid::Uuid::new_v4()));
        std::fs::write(&path, pdf_with_pages(&["only page"])).expect("write pdf");

        let stage = ExtractStage::new(Arc::new(LopdfParser), PipelineSettings::default());
        let state = ProcessingState::new("doc-2", "disk.pdf", DocumentSource::Path(path.clone()));
        let result = stage.run(&state).await;
        let _ = std::fs::remove_file(&path);

        match result {
            Ok(delta) => assert_eq!(delta.page_count, Some(1)),
            Err(StageError::EmptyDocument) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let stage = ExtractStage::new(Arc::new(LopdfParser), PipelineSettings::default());
        let state = ProcessingState::new(
            "doc-3",
            "missing.pdf",
            DocumentSource::Path("/nonexistent/docsift/missing.pdf".into()),
        );
        let error = stage.run(&state).await.unwrap_err();
        assert!(matches!(error, StageError::Io(_)));
    }
}
