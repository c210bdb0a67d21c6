use std::time::Duration;

use qr_core::error::AppError;
use serde::{Deserialize, Serialize};

use super::Llm;
use crate::http::call_error;
use crate::ollama::OllamaClient;

#[derive(Debug, Clone)]
pub struct OllamaLlm {
    client: OllamaClient,
    model: String,
    timeout: Duration,
}

impl OllamaLlm {
    pub fn new(client: OllamaClient, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            model: model.into(),
            timeout,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Clone, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl Llm for OllamaLlm {
    fn id(&self) -> String {
        format!("ollama:{}", self.model)
    }

    fn generate(&self, prompt: &str) -> Result<String, AppError> {
        let url = format!("{}/api/generate", self.client.base_url());
        let req = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions { temperature: 0.0 },
        };
        let body = serde_json::to_value(req).map_err(|e| {
            AppError::new("GENERATION_FAILED", "Failed to encode generate request")
                .with_details(e.to_string())
        })?;

        let resp = ureq::post(&url)
            .timeout(self.timeout)
            .send_json(body)
            .map_err(|e| call_error("GENERATION_FAILED", "Failed to call Ollama generate", e))?;

        let v: GenerateResponse = resp.into_json().map_err(|e| {
            AppError::new("GENERATION_FAILED", "Failed to decode generate response")
                .with_details(e.to_string())
        })?;
        if v.response.trim().is_empty() {
            return Err(AppError::new(
                "GENERATION_FAILED",
                "Generate response was empty",
            ));
        }
        Ok(v.response)
    }
}
