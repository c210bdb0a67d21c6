use std::time::Duration;

use qr_core::error::AppError;
use serde::{Deserialize, Serialize};

use super::Llm;
use crate::http::call_error;
use crate::openai::OpenAiClient;

#[derive(Debug, Clone)]
pub struct OpenAiLlm {
    client: OpenAiClient,
    model: String,
    timeout: Duration,
}

impl OpenAiLlm {
    pub fn new(client: OpenAiClient, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            model: model.into(),
            timeout,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl Llm for OpenAiLlm {
    fn id(&self) -> String {
        format!("openai:{}", self.model)
    }

    fn generate(&self, prompt: &str) -> Result<String, AppError> {
        let url = format!("{}/v1/chat/completions", self.client.base_url());
        let req = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let body = serde_json::to_value(req).map_err(|e| {
            AppError::new("GENERATION_FAILED", "Failed to encode chat request")
                .with_details(e.to_string())
        })?;

        let resp = ureq::post(&url)
            .set("Authorization", &self.client.authorization())
            .timeout(self.timeout)
            .send_json(body)
            .map_err(|e| call_error("GENERATION_FAILED", "Failed to call chat completions", e))?;

        let v: ChatResponse = resp.into_json().map_err(|e| {
            AppError::new("GENERATION_FAILED", "Failed to decode chat response")
                .with_details(e.to_string())
        })?;
        let content = v
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AppError::new("GENERATION_FAILED", "Chat response was empty"))?;
        Ok(content)
    }
}
