use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_CONFIG_FILE: &str = "qresponder.toml";

/// Immutable runtime configuration. Built once at startup and handed to each
/// component constructor; nothing below the CLI reads the environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResponderConfig {
    pub data_dir: PathBuf,
    pub index_dir: PathBuf,
    pub answer_bank: Option<PathBuf>,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub embeddings: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub answers: AnswerPolicyConfig,
    pub batch: BatchConfig,
    pub providers: ProviderConfig,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            index_dir: PathBuf::from("./vector_index"),
            answer_bank: None,
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embeddings: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            answers: AnswerPolicyConfig::default(),
            batch: BatchConfig::default(),
            providers: ProviderConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 1000,
            overlap_chars: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: u32,
    /// Minimum cosine similarity of the best hit for a question to count as answered.
    pub relevance_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            relevance_threshold: 0.25,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// OpenAI when an API key is configured, otherwise feature hashing.
    Auto,
    Hashing,
    Ollama,
    #[serde(rename = "openai", alias = "open_ai")]
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: Option<String>,
    /// Vector width for the hashing embedder. Ignored by remote providers.
    pub dims: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Auto,
            model: None,
            dims: 384,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GenerationProvider {
    /// OpenAI when an API key is configured, otherwise evidence-only.
    Auto,
    None,
    Ollama,
    #[serde(rename = "openai", alias = "open_ai")]
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: GenerationProvider,
    /// Unset means the resolved provider's default, see [`ResponderConfig::generation_model`].
    pub model: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: GenerationProvider::Auto,
            model: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OfflineStatus {
    ReviewRequired,
    SearchOnly,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OfflineAnswer {
    Best,
    Concat,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AnswerPolicyConfig {
    pub offline_status: OfflineStatus,
    pub offline_answer: OfflineAnswer,
}

impl Default for AnswerPolicyConfig {
    fn default() -> Self {
        Self {
            offline_status: OfflineStatus::ReviewRequired,
            offline_answer: OfflineAnswer::Best,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BatchConfig {
    pub workers: usize,
    pub question_column: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            question_column: "Question".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProviderConfig {
    pub ollama_url: String,
    pub openai_base_url: String,
    #[serde(skip)]
    pub openai_api_key: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://127.0.0.1:11434".to_string(),
            openai_base_url: "https://api.openai.com".to_string(),
            openai_api_key: None,
        }
    }
}

/// Generation mode after `auto` has been resolved against available credentials.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    EvidenceOnly,
    Ollama,
    #[serde(rename = "openai")]
    OpenAi,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingMode {
    Hashing,
    Ollama,
    #[serde(rename = "openai")]
    OpenAi,
}

impl ResponderConfig {
    /// Load from an explicit file, or `./qresponder.toml` when present, then apply env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let base = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        let cfg = base.with_env_overrides(|k| std::env::var(k).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            AppError::new("CONFIG_READ_FAILED", "Failed to read config file")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        Self::from_toml_str(&raw).map_err(|e| {
            let inner = e.details.clone().unwrap_or_default();
            e.with_details(format!("path={}; err={}", path.display(), inner))
        })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, AppError> {
        toml::from_str(raw).map_err(|e| {
            AppError::new("CONFIG_INVALID", "Failed to parse config TOML")
                .with_details(e.to_string())
        })
    }

    /// Overlay environment values. `lookup` is injected so tests never touch the process env.
    /// An unknown provider name is `CONFIG_INVALID`, like an unknown value in the TOML file.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(key) = non_empty("OPENAI_API_KEY") {
            self.providers.openai_api_key = Some(key);
        }
        if let Some(url) = non_empty("OPENAI_BASE_URL") {
            self.providers.openai_base_url = url;
        }
        if let Some(dir) = non_empty("QR_INDEX_DIR") {
            self.index_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty("QR_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        let unknown = |var: &str, value: &str, allowed: &str| {
            AppError::new("CONFIG_INVALID", format!("Unknown provider in {var}"))
                .with_details(format!("value={value}; expected one of {allowed}"))
        };
        if let Some(p) = non_empty("QR_GENERATION_PROVIDER") {
            self.generation.provider = match p.to_ascii_lowercase().as_str() {
                "auto" => GenerationProvider::Auto,
                "none" => GenerationProvider::None,
                "ollama" => GenerationProvider::Ollama,
                "openai" | "open_ai" => GenerationProvider::OpenAi,
                _ => {
                    return Err(unknown(
                        "QR_GENERATION_PROVIDER",
                        &p,
                        "auto, none, ollama, openai",
                    ))
                }
            };
        }
        if let Some(p) = non_empty("QR_EMBEDDING_PROVIDER") {
            self.embeddings.provider = match p.to_ascii_lowercase().as_str() {
                "auto" => EmbeddingProvider::Auto,
                "hashing" => EmbeddingProvider::Hashing,
                "ollama" => EmbeddingProvider::Ollama,
                "openai" | "open_ai" => EmbeddingProvider::OpenAi,
                _ => {
                    return Err(unknown(
                        "QR_EMBEDDING_PROVIDER",
                        &p,
                        "auto, hashing, ollama, openai",
                    ))
                }
            };
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let invalid = |msg: &str, details: String| {
            Err(AppError::new("CONFIG_INVALID", msg.to_string()).with_details(details))
        };

        if self.chunking.max_chars == 0 {
            return invalid("chunking.max_chars must be positive", "max_chars=0".to_string());
        }
        if self.chunking.overlap_chars >= self.chunking.max_chars {
            return invalid(
                "chunking.overlap_chars must be smaller than chunking.max_chars",
                format!(
                    "max_chars={}; overlap_chars={}",
                    self.chunking.max_chars, self.chunking.overlap_chars
                ),
            );
        }
        if self.retrieval.top_k == 0 || self.retrieval.top_k > 50 {
            return invalid(
                "retrieval.top_k must be between 1 and 50",
                format!("top_k={}", self.retrieval.top_k),
            );
        }
        let t = self.retrieval.relevance_threshold;
        if !t.is_finite() || !(-1.0..=1.0).contains(&t) {
            return invalid(
                "retrieval.relevance_threshold must be within [-1, 1]",
                format!("relevance_threshold={t}"),
            );
        }
        if self.embeddings.dims == 0 {
            return invalid("embeddings.dims must be positive", "dims=0".to_string());
        }
        if self.embeddings.timeout_secs == 0 || self.generation.timeout_secs == 0 {
            return invalid(
                "provider timeouts must be positive",
                format!(
                    "embeddings.timeout_secs={}; generation.timeout_secs={}",
                    self.embeddings.timeout_secs, self.generation.timeout_secs
                ),
            );
        }
        if self.batch.workers == 0 {
            return invalid("batch.workers must be positive", "workers=0".to_string());
        }
        if self.batch.question_column.trim().is_empty() {
            return invalid("batch.question_column must not be empty", String::new());
        }

        let key_missing = self.providers.openai_api_key.is_none();
        if self.generation.provider == GenerationProvider::OpenAi && key_missing {
            return invalid(
                "generation.provider = openai requires OPENAI_API_KEY",
                "set OPENAI_API_KEY or choose another provider".to_string(),
            );
        }
        if self.embeddings.provider == EmbeddingProvider::OpenAi && key_missing {
            return invalid(
                "embeddings.provider = openai requires OPENAI_API_KEY",
                "set OPENAI_API_KEY or choose another provider".to_string(),
            );
        }
        Ok(())
    }

    pub fn resolved_generation(&self) -> GenerationMode {
        match self.generation.provider {
            GenerationProvider::None => GenerationMode::EvidenceOnly,
            GenerationProvider::Ollama => GenerationMode::Ollama,
            GenerationProvider::OpenAi => GenerationMode::OpenAi,
            GenerationProvider::Auto => {
                if self.providers.openai_api_key.is_some() {
                    GenerationMode::OpenAi
                } else {
                    GenerationMode::EvidenceOnly
                }
            }
        }
    }

    pub fn resolved_embeddings(&self) -> EmbeddingMode {
        match self.embeddings.provider {
            EmbeddingProvider::Hashing => EmbeddingMode::Hashing,
            EmbeddingProvider::Ollama => EmbeddingMode::Ollama,
            EmbeddingProvider::OpenAi => EmbeddingMode::OpenAi,
            EmbeddingProvider::Auto => {
                if self.providers.openai_api_key.is_some() {
                    EmbeddingMode::OpenAi
                } else {
                    EmbeddingMode::Hashing
                }
            }
        }
    }

    /// Model name for the resolved embedder; providers have their own defaults.
    pub fn embedding_model(&self) -> String {
        if let Some(m) = self.embeddings.model.as_deref().filter(|m| !m.trim().is_empty()) {
            return m.to_string();
        }
        match self.resolved_embeddings() {
            EmbeddingMode::Hashing => "hashing-v1".to_string(),
            EmbeddingMode::Ollama => "nomic-embed-text".to_string(),
            EmbeddingMode::OpenAi => "text-embedding-3-small".to_string(),
        }
    }

    /// Model name for the resolved generative provider, `None` in evidence-only mode.
    pub fn generation_model(&self) -> Option<String> {
        let explicit = self
            .generation
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty());
        let default = match self.resolved_generation() {
            GenerationMode::EvidenceOnly => return None,
            GenerationMode::Ollama => "llama3.2:latest",
            GenerationMode::OpenAi => "gpt-4o-mini",
        };
        Some(explicit.unwrap_or(default).to_string())
    }
}
