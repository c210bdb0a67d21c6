use serde::{Deserialize, Serialize};
use std::fmt;

/// Single structured error shape used across the pipeline and surfaced by the CLI.
///
/// `code` is a stable SCREAMING_SNAKE identifier whose prefix selects the
/// [`ErrorClass`] and therefore the propagation policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

/// Coarse error classes. Per-document and per-question classes are isolated;
/// the rest are fatal at startup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Load,
    Embedding,
    Index,
    Retrieval,
    Generation,
    Config,
    Questionnaire,
    Storage,
    Other,
}

impl ErrorClass {
    /// Whether an error of this class must stop the process before any work begins.
    pub fn is_fatal_at_startup(self) -> bool {
        matches!(self, ErrorClass::Index | ErrorClass::Config | ErrorClass::Storage)
    }
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn class(&self) -> ErrorClass {
        let code = self.code.as_str();
        if code.starts_with("LOAD_") {
            ErrorClass::Load
        } else if code.starts_with("EMBEDDING_") {
            ErrorClass::Embedding
        } else if code.starts_with("INDEX_") {
            ErrorClass::Index
        } else if code.starts_with("RETRIEVAL_") {
            ErrorClass::Retrieval
        } else if code.starts_with("GENERATION_") {
            ErrorClass::Generation
        } else if code.starts_with("CONFIG_") {
            ErrorClass::Config
        } else if code.starts_with("QUESTIONNAIRE_") {
            ErrorClass::Questionnaire
        } else if code.starts_with("DB_") || code.starts_with("ANSWER_BANK_") {
            ErrorClass::Storage
        } else {
            ErrorClass::Other
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(d) = self.details.as_deref() {
            write!(f, " ({d})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}
