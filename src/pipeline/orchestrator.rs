//! Sequential stage runner.

use std::sync::Arc;

use async_trait::async_trait;

use super::classify::ClassifyStage;
use super::embed::EmbedStage;
use super::extract::ExtractStage;
use super::pdf::{LopdfParser, PdfParser};
use super::store::StoreStage;
use super::summarize::SummarizeStage;
use super::types::{
    DocumentSource, PipelineError, PipelineFailure, PipelineOutcome, PipelineSettings,
    ProcessingState, Stage, StageError, StateDelta,
};
use crate::embedding::EmbeddingClient;
use crate::generation::{PromptTemplates, TextGenerator};
use crate::metrics::DocsiftMetrics;
use crate::repository::ChunkRepository;

/// One step of the pipeline.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    /// Which stage this is, used to qualify errors.
    fn stage(&self) -> Stage;

    /// Compute this stage's changes from the current state.
    async fn run(&self, state: &ProcessingState) -> Result<StateDelta, StageError>;
}

/// Injected collaborators shared by the default stages.
#[derive(Clone)]
pub struct Capabilities {
    /// Vector provider for the embed stage.
    pub embedder: Arc<dyn EmbeddingClient>,
    /// Text provider for classification and summarization.
    pub generator: Arc<dyn TextGenerator>,
    /// Destination for chunk embeddings.
    pub chunks: Arc<dyn ChunkRepository>,
    /// Prompt wording.
    pub prompts: Arc<PromptTemplates>,
    /// Optional activity counters.
    pub metrics: Option<Arc<DocsiftMetrics>>,
}

/// Runs extract, embed, store, classify, and summarize in order, stopping at the first error.
pub struct Orchestrator {
    stages: Vec<Box<dyn PipelineStage>>,
}

impl Orchestrator {
    /// Default stage list with the `lopdf` parser.
    pub fn new(capabilities: Capabilities, settings: PipelineSettings) -> Self {
        Self::with_parser(capabilities, settings, Arc::new(LopdfParser))
    }

    /// Default stage list with a caller-supplied PDF parser.
    pub fn with_parser(
        capabilities: Capabilities,
        settings: PipelineSettings,
        parser: Arc<dyn PdfParser>,
    ) -> Self {
        let Capabilities {
            embedder,
            generator,
            chunks,
            prompts,
            metrics,
        } = capabilities;

        let mut store = StoreStage::new(chunks, settings.store_failures_fatal);
        if let Some(metrics) = metrics {
            store = store.with_metrics(metrics);
        }

        Self::from_stages(vec![
            Box::new(ExtractStage::new(parser, settings)),
            Box::new(EmbedStage::new(embedder).with_concurrency(settings.embed_concurrency)),
            Box::new(store),
            Box::new(ClassifyStage::new(
                Arc::clone(&generator),
                Arc::clone(&prompts),
                settings.classifier_context_chunks,
            )),
            Box::new(SummarizeStage::new(
                generator,
                prompts,
                settings.summarizer_context_chunks,
            )),
        ])
    }

    /// Arbitrary stage list, run in the given order.
    pub fn from_stages(stages: Vec<Box<dyn PipelineStage>>) -> Self {
        Self { stages }
    }

    /// Process one document end to end.
    pub async fn run(
        &self,
        doc_id: &str,
        source_name: &str,
        source: DocumentSource,
    ) -> Result<PipelineOutcome, PipelineError> {
        let state = ProcessingState::new(doc_id, source_name, source);
        let state = self.execute(state).await.map_err(|failure| failure.error)?;
        Ok(outcome_from(state))
    }

    /// Run every stage over `state`, returning the final state or the failure with the partial
    /// state reached.
    ///
    /// A state that already carries an error is returned untouched.
    pub async fn execute(
        &self,
        mut state: ProcessingState,
    ) -> Result<ProcessingState, PipelineFailure> {
        for stage in &self.stages {
            if state.error.is_some() {
                break;
            }

            let label = stage.stage();
            tracing::debug!(doc_id = %state.doc_id, stage = %label, "Running stage");

            match stage.run(&state).await {
                Ok(delta) => state = state.apply(delta),
                Err(source) => {
                    let error = PipelineError {
                        stage: label,
                        source,
                    };
                    tracing::warn!(doc_id = %state.doc_id, error = %error, "Pipeline halted");
                    let state = state.fail(error.to_string());
                    return Err(PipelineFailure {
                        error,
                        state: Box::new(state),
                    });
                }
            }
        }

        Ok(state)
    }
}

fn outcome_from(state: ProcessingState) -> PipelineOutcome {
    PipelineOutcome {
        chunk_count: state.chunks.len(),
        doc_id: state.doc_id,
        category: state.category.unwrap_or_default(),
        summary: state.summary.unwrap_or_default(),
        highlights: state.highlights,
        page_count: state.page_count.unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::classify::Category;
    use std::sync::Mutex;

    struct Recording {
        stage: Stage,
        log: Arc<Mutex<Vec<Stage>>>,
        fail: bool,
    }

    #[async_trait]
    impl PipelineStage for Recording {
        fn stage(&self) -> Stage {
            self.stage
        }

        async fn run(&self, _state: &ProcessingState) -> Result<StateDelta, StageError> {
            self.log.lock().expect("lock").push(self.stage);
            if self.fail {
                return Err(StageError::NoChunks);
            }
            Ok(match self.stage {
                Stage::Classify => StateDelta {
                    category: Some(Category::NewsArticle),
                    ..Default::default()
                },
                Stage::Summarize => StateDelta {
                    summary: Some("summary".into()),
                    highlights: Some(vec!["one".into()]),
                    ..Default::default()
                },
                _ => StateDelta::default(),
            })
        }
    }

    fn pipeline(failing: Option<Stage>) -> (Orchestrator, Arc<Mutex<Vec<Stage>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stages = [
            Stage::Extract,
            Stage::Embed,
            Stage::Store,
            Stage::Classify,
            Stage::Summarize,
        ]
        .into_iter()
        .map(|stage| {
            Box::new(Recording {
                stage,
                log: log.clone(),
                fail: failing == Some(stage),
            }) as Box<dyn PipelineStage>
        })
        .collect();
        (Orchestrator::from_stages(stages), log)
    }

    #[tokio::test]
    async fn runs_stages_in_order() {
        let (orchestrator, log) = pipeline(None);
        let outcome = orchestrator
            .run("doc", "a.pdf", DocumentSource::Released)
            .await
            .expect("run");

        assert_eq!(
            *log.lock().expect("lock"),
            vec![
                Stage::Extract,
                Stage::Embed,
                Stage::Store,
                Stage::Classify,
                Stage::Summarize
            ]
        );
        assert_eq!(outcome.category, Category::NewsArticle);
        assert_eq!(outcome.summary, "summary");
        assert_eq!(outcome.highlights, vec!["one"]);
    }

    #[tokio::test]
    async fn halts_at_first_failure() {
        let (orchestrator, log) = pipeline(Some(Stage::Embed));
        let state = ProcessingState::new("doc", "a.pdf", DocumentSource::Released);
        let failure = orchestrator.execute(state).await.unwrap_err();

        assert_eq!(*log.lock().expect("lock"), vec![Stage::Extract, Stage::Embed]);
        assert_eq!(failure.error.stage, Stage::Embed);
        assert_eq!(failure.error.to_string(), "Embedding failed: no chunks to embed");
        assert_eq!(
            failure.state.error.as_deref(),
            Some("Embedding failed: no chunks to embed")
        );
    }

    #[tokio::test]
    async fn errored_state_is_absorbing() {
        let (orchestrator, log) = pipeline(None);
        let state = ProcessingState::new("doc", "a.pdf", DocumentSource::Released)
            .fail("Extraction failed: earlier".into());
        let result = orchestrator.execute(state).await.expect("passthrough");

        assert!(log.lock().expect("lock").is_empty());
        assert_eq!(result.error.as_deref(), Some("Extraction failed: earlier"));
    }
}
