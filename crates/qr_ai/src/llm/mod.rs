use qr_core::error::AppError;

pub mod ollama_llm;
pub mod openai_llm;

pub use ollama_llm::OllamaLlm;
pub use openai_llm::OpenAiLlm;

/// Generative provider. Implementations bound every call with a timeout.
pub trait Llm: Send + Sync {
    fn id(&self) -> String;
    fn generate(&self, prompt: &str) -> Result<String, AppError>;
}
