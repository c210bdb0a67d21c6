use std::time::Duration;

use qr_core::error::AppError;
use serde::{Deserialize, Serialize};

use super::{truncate_chars, Embedder, MAX_EMBED_INPUT_CHARS};
use crate::http::call_error;
use crate::openai::OpenAiClient;

#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: OpenAiClient,
    model: String,
    timeout: Duration,
}

impl OpenAiEmbedder {
    pub fn new(client: OpenAiClient, model: impl Into<String>, timeout: Duration) -> Self {
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
    input: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl Embedder for OpenAiEmbedder {
    fn id(&self) -> String {
        format!("openai:{}", self.model)
    }

    fn embed(&self, input: &str) -> Result<Vec<f32>, AppError> {
        let url = format!("{}/v1/embeddings", self.client.base_url());
        let req = EmbeddingsRequest {
            model: &self.model,
            input: truncate_chars(input, MAX_EMBED_INPUT_CHARS),
        };
        let body = serde_json::to_value(req).map_err(|e| {
            AppError::new("EMBEDDING_FAILED", "Failed to encode embeddings request")
                .with_details(e.to_string())
        })?;
        let resp = ureq::post(&url)
            .set("Authorization", &self.client.authorization())
            .timeout(self.timeout)
            .send_json(body)
            .map_err(|e| call_error("EMBEDDING_FAILED", "Failed to call OpenAI embeddings", e))?;

        let v: EmbeddingsResponse = resp.into_json().map_err(|e| {
            AppError::new("EMBEDDING_FAILED", "Failed to decode embeddings response")
                .with_details(e.to_string())
        })?;
        match v.data.into_iter().next() {
            Some(d) if !d.embedding.is_empty() => Ok(d.embedding),
            _ => Err(AppError::new(
                "EMBEDDING_FAILED",
                "Embeddings response was empty",
            )),
        }
    }
}
