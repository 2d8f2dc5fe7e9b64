#![deny(missing_docs)]

//! Core library for Docsift: PDF ingestion, classification, summarization, and grounded
//! question answering.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Upload flow and document lifecycle.
pub mod documents;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Text generation abstraction, adapters, and prompt templates.
pub mod generation;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion and question counters.
pub mod metrics;
/// Staged document processing pipeline.
pub mod pipeline;
/// Retrieval-augmented question answering.
pub mod qa;
/// Qdrant vector store integration.
pub mod qdrant;
/// Persistence contracts and in-memory backends.
pub mod repository;
