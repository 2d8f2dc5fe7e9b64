//! Filter helpers for Qdrant scroll queries.

use serde_json::{Value, json};

/// Exact-match filter restricting points to one document.
pub fn document_filter(doc_id: &str) -> Value {
    json!({
        "must": [
            {
                "key": "doc_id",
                "match": { "value": doc_id }
            }
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_matches_doc_id_exactly() {
        let filter = document_filter("doc-42");
        assert_eq!(filter["must"][0]["key"], "doc_id");
        assert_eq!(filter["must"][0]["match"]["value"], "doc-42");
        assert_eq!(filter["must"].as_array().map(Vec::len), Some(1));
    }
}
