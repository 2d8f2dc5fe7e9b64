//! Text generation capability shared by the classifier, summarizer, and QA service.
//!
//! The Ollama-backed client issues HTTP requests directly to the runtime. An echo client is
//! available for offline runs where no model is installed.

mod prompt;

pub use prompt::{PromptTemplates, render_template};

use crate::config::{Config, GenerationProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced while generating text.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Provider was explicitly disabled or unreachable.
    #[error("Generation provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate text: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by text generation providers.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Send a fully rendered prompt and return the model's reply.
    async fn invoke(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Alias for [`TextGenerator::invoke`].
    async fn generate_text(&self, prompt: &str) -> Result<String, GenerationError> {
        self.invoke(prompt).await
    }
}

/// Build a text generator based on configuration.
pub fn get_text_generator(config: &Config) -> Result<Arc<dyn TextGenerator>, GenerationError> {
    match config.generation_provider {
        GenerationProvider::Ollama => Ok(Arc::new(OllamaTextGenerator::new(
            config.ollama_url.clone(),
            config.generation_model.clone(),
        )?)),
        GenerationProvider::Echo => Ok(Arc::new(EchoTextGenerator)),
    }
}

/// Generator backed by Ollama's `/api/generate` endpoint.
pub struct OllamaTextGenerator {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaTextGenerator {
    /// Build a generator for the given runtime URL and model.
    pub fn new(base_url: String, model: String) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .user_agent("docsift/generate")
            .build()
            .map_err(|error| GenerationError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl TextGenerator for OllamaTextGenerator {
    async fn invoke(&self, prompt: &str) -> Result<String, GenerationError> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": 0.1,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(GenerationError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            GenerationError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(GenerationError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }
}

/// Offline generator that replies with the last non-empty prompt line.
pub struct EchoTextGenerator;

#[async_trait]
impl TextGenerator for EchoTextGenerator {
    async fn invoke(&self, prompt: &str) -> Result<String, GenerationError> {
        Ok(prompt
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default()
            .to_string())
    }
}
