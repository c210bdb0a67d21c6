use std::time::Duration;

use qr_core::error::AppError;

use crate::http::call_error;

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
}

impl OllamaClient {
    /// Create a client for Ollama. This is strictly limited to `127.0.0.1`.
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let base_url = base_url.trim_end_matches('/').to_string();

        let allowed = match base_url.strip_prefix("http://127.0.0.1") {
            Some("") => true,
            Some(rest) => rest.strip_prefix(':').is_some_and(valid_port),
            None => false,
        };
        if !allowed {
            return Err(AppError::new(
                "CONFIG_REMOTE_NOT_ALLOWED",
                "Ollama base URL must be localhost (127.0.0.1)",
            )
            .with_details(format!("base_url={base_url}")));
        }

        Ok(Self { base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn health_check(&self, timeout: Duration) -> Result<(), AppError> {
        let url = format!("{}/api/tags", self.base_url);
        match ureq::get(&url).timeout(timeout).call() {
            Ok(r) if r.status() == 200 => Ok(()),
            Ok(r) => Err(
                AppError::new("PROVIDER_UNHEALTHY", "Ollama health check failed")
                    .with_details(format!("status={}", r.status())),
            ),
            Err(e) => Err(call_error(
                "PROVIDER_UNREACHABLE",
                "Failed to reach Ollama on 127.0.0.1",
                e,
            )),
        }
    }
}

fn valid_port(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) && s.parse::<u16>().is_ok_and(|p| p > 0)
}
