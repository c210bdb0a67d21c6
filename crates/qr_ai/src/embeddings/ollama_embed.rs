use std::time::Duration;

use qr_core::error::AppError;
use serde::{Deserialize, Serialize};

use super::{truncate_chars, Embedder, MAX_EMBED_INPUT_CHARS};
use crate::http::call_error;
use crate::ollama::OllamaClient;

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: OllamaClient,
    model: String,
    timeout: Duration,
}

impl OllamaEmbedder {
    pub fn new(client: OllamaClient, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            model: model.into(),
            timeout,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

impl Embedder for OllamaEmbedder {
    fn id(&self) -> String {
        format!("ollama:{}", self.model)
    }

    fn embed(&self, input: &str) -> Result<Vec<f32>, AppError> {
        let prompt = truncate_chars(input, MAX_EMBED_INPUT_CHARS);

        let url = format!("{}/api/embeddings", self.client.base_url());
        let req = EmbeddingsRequest {
            model: &self.model,
            prompt,
        };
        let body = serde_json::to_value(req).map_err(|e| {
            AppError::new("EMBEDDING_FAILED", "Failed to encode embeddings request")
                .with_details(e.to_string())
        })?;
        let resp = ureq::post(&url)
            .timeout(self.timeout)
            .send_json(body)
            .map_err(|e| call_error("EMBEDDING_FAILED", "Failed to call Ollama embeddings", e))?;

        let v: EmbeddingsResponse = resp.into_json().map_err(|e| {
            AppError::new("EMBEDDING_FAILED", "Failed to decode embeddings response")
                .with_details(e.to_string())
        })?;
        if v.embedding.is_empty() {
            return Err(AppError::new(
                "EMBEDDING_FAILED",
                "Embeddings response was empty",
            ));
        }
        Ok(v.embedding)
    }
}
