//! Qdrant vector store integration.

mod chunks;
pub mod client;
pub mod filters;
mod payload;
pub mod types;

pub use chunks::QdrantChunkRepository;
pub use client::QdrantService;
pub use filters::document_filter;
pub use types::{QdrantError, ScrollPoint};
