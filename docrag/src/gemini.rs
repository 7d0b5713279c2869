//! Gemini backends for embedding and generation.
//!
//! This module is only available when the `gemini` feature is enabled.
//! Both clients call the Generative Language REST API directly with
//! `reqwest`; credentials are constructor arguments, never read from
//! ambient state inside the library.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generator::LanguageModel;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Default embedding model and its dimensionality.
const DEFAULT_EMBED_MODEL: &str = "text-embedding-004";
const DEFAULT_EMBED_DIMENSIONS: usize = 768;

/// Default generation model.
const DEFAULT_GEN_MODEL: &str = "gemini-flash-latest";

fn embedding_err(message: impl Into<String>) -> RagError {
    RagError::Embedding { provider: "gemini".to_string(), message: message.into() }
}

fn generation_err(message: impl Into<String>) -> RagError {
    RagError::Generation { provider: "gemini".to_string(), message: message.into() }
}

/// Extract a readable message from a Gemini error body, falling back to
/// the raw body.
fn api_error_detail(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorResponse {
        error: ErrorDetail,
    }
    #[derive(Deserialize)]
    struct ErrorDetail {
        message: String,
    }

    serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string())
}

// ── Embedding ──────────────────────────────────────────────────────

/// An [`EmbeddingProvider`] backed by the Gemini embedding API.
pub struct GeminiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl GeminiEmbedder {
    /// Create a new embedder with the given API key and the default
    /// model (`text-embedding-004`, 768 dimensions).
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(embedding_err("API key must not be empty"));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model: DEFAULT_EMBED_MODEL.to_string(),
            dimensions: DEFAULT_EMBED_DIMENSIONS,
        })
    }

    /// Set the embedding model and its dimensionality.
    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.model = model.into();
        self.dimensions = dimensions;
        self
    }

    fn url(&self, method: &str) -> String {
        format!("{API_BASE}/{}:{method}?key={}", self.model, self.api_key)
    }
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    content: Content<'a>,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<BatchEmbedEntry<'a>>,
}

#[derive(Serialize)]
struct BatchEmbedEntry<'a> {
    model: String,
    content: Content<'a>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(model = %self.model, text_len = text.len(), "embedding single text");

        let request = EmbedRequest { content: Content { parts: vec![Part { text }] } };
        let response = self
            .client
            .post(self.url("embedContent"))
            .json(&request)
            .send()
            .await
            .map_err(|e| embedding_err(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, "embedding API error");
            return Err(embedding_err(format!("API returned {status}: {}", api_error_detail(&body))));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| embedding_err(format!("failed to parse response: {e}")))?;
        Ok(parsed.embedding.values)
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(model = %self.model, batch_size = texts.len(), "embedding batch");

        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| BatchEmbedEntry {
                    model: format!("models/{}", self.model),
                    content: Content { parts: vec![Part { text }] },
                })
                .collect(),
        };

        let response = self
            .client
            .post(self.url("batchEmbedContents"))
            .json(&request)
            .send()
            .await
            .map_err(|e| embedding_err(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, "batch embedding API error");
            return Err(embedding_err(format!("API returned {status}: {}", api_error_detail(&body))));
        }

        let parsed: BatchEmbedResponse = response
            .json()
            .await
            .map_err(|e| embedding_err(format!("failed to parse response: {e}")))?;
        Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// ── Generation ─────────────────────────────────────────────────────

/// A [`LanguageModel`] backed by the Gemini generateContent API.
pub struct GeminiModel {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiModel {
    /// Create a new model client with the given API key and the default
    /// model (`gemini-flash-latest`).
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(generation_err("API key must not be empty"));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model: DEFAULT_GEN_MODEL.to_string(),
        })
    }

    /// Set the generation model (for example `gemini-2.0-flash`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl LanguageModel for GeminiModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(model = %self.model, prompt_len = prompt.len(), "generating");

        let request =
            GenerateRequest { contents: vec![Content { parts: vec![Part { text: prompt }] }] };
        let url = format!("{API_BASE}/{}:generateContent?key={}", self.model, self.api_key);

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| generation_err(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, "generation API error");
            return Err(generation_err(format!(
                "API returned {status}: {}",
                api_error_detail(&body)
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| generation_err(format!("failed to parse response: {e}")))?;

        let text: String = parsed
            .candidates
            .first()
            .map(|c| c.content.parts.iter().map(|p| p.text.as_str()).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(generation_err("API returned no candidates"));
        }
        Ok(text)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_api_keys_are_rejected() {
        assert!(GeminiEmbedder::new("").is_err());
        assert!(GeminiModel::new("").is_err());
    }

    #[test]
    fn error_bodies_are_unwrapped() {
        let body = r#"{"error":{"code":429,"message":"quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(api_error_detail(body), "quota exceeded");
        assert_eq!(api_error_detail("plain text"), "plain text");
    }
}
