//! Retrieval-augmented question answering over a document's stored chunks.

mod normalize;
mod service;

pub use normalize::normalize_question;
pub use service::{NO_ANSWER, QaError, QaResponse, QaService};

/// Retrieval and gating knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QaSettings {
    /// Chunks kept after ranking.
    pub top_k: usize,
    /// Minimum cosine similarity for a chunk to be used as context.
    pub relevance_threshold: f32,
    /// Longer questions are rejected before any work.
    pub max_question_chars: usize,
}

impl Default for QaSettings {
    fn default() -> Self {
        Self {
            top_k: 8,
            relevance_threshold: 0.65,
            max_question_chars: 1000,
        }
    }
}
