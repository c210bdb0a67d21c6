use std::fmt;
use std::time::Duration;

use qr_core::error::AppError;

use crate::http::call_error;

/// Client for an OpenAI-compatible HTTP API. The key is sent as a bearer token
/// and never printed.
#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, AppError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(AppError::new(
                "CONFIG_INVALID",
                "OpenAI base URL must use http or https",
            )
            .with_details(format!("base_url={base_url}")));
        }
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(AppError::new("CONFIG_INVALID", "OpenAI API key is empty"));
        }
        Ok(Self {
            base_url,
            api_key: api_key.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn authorization(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    pub fn health_check(&self, timeout: Duration) -> Result<(), AppError> {
        let url = format!("{}/v1/models", self.base_url);
        match ureq::get(&url)
            .set("Authorization", &self.authorization())
            .timeout(timeout)
            .call()
        {
            Ok(_) => Ok(()),
            Err(e) => Err(call_error(
                "PROVIDER_UNREACHABLE",
                "OpenAI health check failed",
                e,
            )),
        }
    }
}
