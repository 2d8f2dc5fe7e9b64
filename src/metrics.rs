use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and question activity.
#[derive(Default)]
pub struct DocsiftMetrics {
    documents_processed: AtomicU64,
    documents_failed: AtomicU64,
    chunks_stored: AtomicU64,
    questions_answered: AtomicU64,
    questions_gated: AtomicU64,
}

impl DocsiftMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a document whose pipeline completed.
    pub fn record_document_processed(&self) {
        self.documents_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a document whose pipeline failed or timed out.
    pub fn record_document_failed(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record chunks persisted by the store stage.
    pub fn record_chunks_stored(&self, count: u64) {
        self.chunks_stored.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a question answered by the generator.
    pub fn record_question_answered(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a question short-circuited because nothing cleared the relevance gate.
    pub fn record_question_gated(&self) {
        self.questions_gated.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_processed: self.documents_processed.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            chunks_stored: self.chunks_stored.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            questions_gated: self.questions_gated.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Documents processed successfully since startup.
    pub documents_processed: u64,
    /// Documents that failed or timed out.
    pub documents_failed: u64,
    /// Chunks persisted across all documents.
    pub chunks_stored: u64,
    /// Questions answered with generated text.
    pub questions_answered: u64,
    /// Questions answered with the no-answer sentinel without calling the generator.
    pub questions_gated: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_documents_and_chunks() {
        let metrics = DocsiftMetrics::new();
        metrics.record_document_processed();
        metrics.record_document_failed();
        metrics.record_chunks_stored(2);
        metrics.record_chunks_stored(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_processed, 1);
        assert_eq!(snapshot.documents_failed, 1);
        assert_eq!(snapshot.chunks_stored, 5);
    }

    #[test]
    fn question_counters_are_independent() {
        let metrics = DocsiftMetrics::new();
        metrics.record_question_answered();
        metrics.record_question_gated();
        metrics.record_question_gated();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.questions_answered, 1);
        assert_eq!(snapshot.questions_gated, 2);
        assert_eq!(snapshot.documents_processed, 0);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let json = serde_json::to_value(DocsiftMetrics::new().snapshot()).expect("json");
        assert_eq!(json["chunksStored"], 0);
        assert_eq!(json["questionsGated"], 0);
    }
}
