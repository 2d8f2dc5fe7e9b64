//! Conversions between stored chunks and Qdrant points.

use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::types::ScrollPoint;
use crate::repository::{RepositoryError, StoredChunk};

/// Deterministic point id for a `(doc_id, chunk_id)` key.
///
/// Qdrant only accepts UUIDs or integers, so the key is hashed and the first 16 bytes of the
/// digest become a UUID. Re-inserting the same key overwrites the same point.
pub(crate) fn point_id(doc_id: &str, chunk_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(doc_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(chunk_id.as_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}

/// Upsert body entry for one chunk.
pub(crate) fn build_point(chunk: &StoredChunk) -> Value {
    json!({
        "id": point_id(&chunk.doc_id, &chunk.chunk_id),
        "vector": chunk.vector,
        "payload": {
            "doc_id": chunk.doc_id,
            "chunk_id": chunk.chunk_id,
            "text": chunk.text,
            "page_start": chunk.page_start,
            "page_end": chunk.page_end,
            "token_count": chunk.token_count,
        }
    })
}

/// Rebuild a [`StoredChunk`] from a scrolled point.
pub(crate) fn chunk_from_point(point: ScrollPoint) -> Result<StoredChunk, RepositoryError> {
    let payload = point
        .payload
        .ok_or_else(|| RepositoryError::Corrupt("point has no payload".into()))?;
    let vector = point
        .vector
        .ok_or_else(|| RepositoryError::Corrupt("point has no vector".into()))?;

    Ok(StoredChunk {
        doc_id: string_field(&payload, "doc_id")?,
        chunk_id: string_field(&payload, "chunk_id")?,
        text: string_field(&payload, "text")?,
        vector,
        page_start: u32::try_from(number_field(&payload, "page_start")?)
            .map_err(|_| RepositoryError::Corrupt("page_start out of range".into()))?,
        page_end: u32::try_from(number_field(&payload, "page_end")?)
            .map_err(|_| RepositoryError::Corrupt("page_end out of range".into()))?,
        token_count: number_field(&payload, "token_count")? as usize,
    })
}

fn string_field(payload: &Map<String, Value>, key: &str) -> Result<String, RepositoryError> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RepositoryError::Corrupt(format!("payload field `{key}` missing")))
}

fn number_field(payload: &Map<String, Value>, key: &str) -> Result<u64, RepositoryError> {
    payload
        .get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| RepositoryError::Corrupt(format!("payload field `{key}` missing")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk() -> StoredChunk {
        StoredChunk {
            doc_id: "doc-1".into(),
            chunk_id: "chunk-1".into(),
            text: "Beta beta beta.".into(),
            vector: vec![0.5, 0.5],
            page_start: 2,
            page_end: 3,
            token_count: 4,
        }
    }

    #[test]
    fn point_id_is_stable_uuid() {
        let first = point_id("doc-1", "chunk-1");
        assert_eq!(first, point_id("doc-1", "chunk-1"));
        assert_ne!(first, point_id("doc-1", "chunk-2"));
        assert_ne!(point_id("ab", "c"), point_id("a", "bc"));
        assert!(Uuid::parse_str(&first).is_ok());
    }

    #[test]
    fn point_carries_full_payload() {
        let point = build_point(&chunk());
        assert_eq!(point["payload"]["doc_id"], "doc-1");
        assert_eq!(point["payload"]["page_end"], 3);
        assert_eq!(point["vector"][1], 0.5);
    }

    #[test]
    fn decodes_scrolled_point() {
        let point = build_point(&chunk());
        let scrolled = ScrollPoint {
            id: Some(point["id"].clone()),
            payload: point["payload"].as_object().cloned(),
            vector: Some(vec![0.5, 0.5]),
        };
        assert_eq!(chunk_from_point(scrolled).expect("decode"), chunk());
    }

    #[test]
    fn rejects_points_missing_fields() {
        let scrolled = ScrollPoint {
            id: None,
            payload: Some(Map::new()),
            vector: Some(vec![1.0]),
        };
        assert!(matches!(
            chunk_from_point(scrolled),
            Err(RepositoryError::Corrupt(message)) if message.contains("doc_id")
        ));
    }
}
