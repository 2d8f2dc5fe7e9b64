//! Document ingestion pipeline.
//!
//! A run threads a [`ProcessingState`] through five stages: extract, embed, store, classify,
//! and summarize. Each stage reads the state by reference and returns a [`StateDelta`]; the
//! [`Orchestrator`] folds deltas in order and stops at the first failure, reporting it as a
//! stage-qualified [`PipelineError`].

mod chunking;
mod classify;
mod embed;
mod extract;
mod orchestrator;
mod pdf;
mod store;
mod summarize;
mod types;

pub use classify::{Category, ClassifyStage};
pub use embed::{DEFAULT_EMBED_CONCURRENCY, EmbedStage};
pub use extract::ExtractStage;
pub use orchestrator::{Capabilities, Orchestrator, PipelineStage};
pub use pdf::{ExtractionError, LopdfParser, ParsedPdf, PdfParser};
pub use store::StoreStage;
pub use summarize::{MAX_HIGHLIGHTS, SummarizeStage};
pub use types::{
    ChunkEmbedding, DocumentSource, PipelineError, PipelineFailure, PipelineOutcome,
    PipelineSettings, ProcessingState, Stage, StageError, StateDelta, TextChunk,
};
