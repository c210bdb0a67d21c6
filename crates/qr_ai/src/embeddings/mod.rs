use std::sync::Arc;
use std::time::Duration;

use qr_core::config::{EmbeddingMode, ResponderConfig};
use qr_core::error::AppError;

use crate::ollama::OllamaClient;
use crate::openai::OpenAiClient;

pub mod hashing;
pub mod ollama_embed;
pub mod openai_embed;

pub use hashing::HashingEmbedder;
pub use ollama_embed::OllamaEmbedder;
pub use openai_embed::OpenAiEmbedder;

/// Maps text to a fixed-length vector. The same instance embeds chunks and questions.
pub trait Embedder: Send + Sync {
    /// `provider:model[:dims]`, recorded in the index status.
    fn id(&self) -> String;
    fn embed(&self, input: &str) -> Result<Vec<f32>, AppError>;
}

/// Remote providers get at most this many characters per request.
pub(crate) const MAX_EMBED_INPUT_CHARS: usize = 12_000;

pub(crate) fn truncate_chars(input: &str, max_chars: usize) -> &str {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => &input[..idx],
        None => input,
    }
}

pub fn build_embedder(cfg: &ResponderConfig) -> Result<Arc<dyn Embedder>, AppError> {
    let model = cfg.embedding_model();
    let timeout = Duration::from_secs(cfg.embeddings.timeout_secs);
    let embedder: Arc<dyn Embedder> = match cfg.resolved_embeddings() {
        EmbeddingMode::Hashing => Arc::new(HashingEmbedder::new(cfg.embeddings.dims)?),
        EmbeddingMode::Ollama => Arc::new(OllamaEmbedder::new(
            OllamaClient::new(&cfg.providers.ollama_url)?,
            model,
            timeout,
        )),
        EmbeddingMode::OpenAi => {
            let key = cfg.providers.openai_api_key.as_deref().ok_or_else(|| {
                AppError::new("CONFIG_INVALID", "OpenAI embeddings require OPENAI_API_KEY")
            })?;
            Arc::new(OpenAiEmbedder::new(
                OpenAiClient::new(&cfg.providers.openai_base_url, key)?,
                model,
                timeout,
            ))
        }
    };
    tracing::debug!(embedder = %embedder.id(), "embedder selected");
    Ok(embedder)
}
