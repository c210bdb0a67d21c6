use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use qr_ai::answer::{build_strategy, AnswerSynthesizer, Synthesis, SynthesisSettings};
use qr_ai::batch::{BatchReport, BatchRunner};
use qr_ai::embeddings::build_embedder;
use qr_ai::evidence::{
    ingest_documents, ingest_paths, Chunker, IndexStatus, IngestOutcome, IngestReport,
    IngestStatus,
};
use qr_ai::fetch::fetch_page;
use qr_ai::ollama::OllamaClient;
use qr_ai::openai::OpenAiClient;
use qr_ai::retrieve::Retriever;
use qr_core::answer_bank::{self, AnswerBank, AnswerBankEntry, AnswerBankImportSummary};
use qr_core::config::{EmbeddingMode, GenerationMode, ResponderConfig};
use qr_core::error::AppError;
use qr_core::loader::{scan_dir, DocumentKind, DocumentLoader, FileLoader, LoadedDocument};
use qr_core::questionnaire::{read_questions, CsvAnswerWriter};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

fn now_rfc3339_utc() -> Result<String, AppError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| AppError::new("CLOCK_FORMAT_FAILED", "Failed to format time").with_details(e.to_string()))
}

fn open_and_migrate(db_path: &Path) -> Result<rusqlite::Connection, AppError> {
    let mut conn = qr_core::db::open(db_path)?;
    qr_core::db::migrate(&mut conn)?;
    Ok(conn)
}

fn answer_bank_path(cfg: &ResponderConfig) -> Result<&Path, AppError> {
    cfg.answer_bank.as_deref().ok_or_else(|| {
        AppError::new("CONFIG_INVALID", "No answer bank configured")
            .with_details("set answer_bank = \"<path>.sqlite\" in the config file")
    })
}

fn open_retriever(cfg: &ResponderConfig, rebuild: bool) -> Result<Retriever, AppError> {
    let embedder = build_embedder(cfg)?;
    Retriever::open(&cfg.index_dir, embedder, rebuild)
}

/// Synthesizer wired from config: retriever, strategy, and the answer bank snapshot
/// when one is configured.
fn build_synthesizer(cfg: &ResponderConfig) -> Result<AnswerSynthesizer, AppError> {
    let retriever = open_retriever(cfg, false)?;
    if retriever.index().is_empty() {
        tracing::warn!(index_dir = %cfg.index_dir.display(), "index is empty; run `qresponder ingest` first");
    }
    let synth = AnswerSynthesizer::new(
        Arc::new(retriever),
        build_strategy(cfg)?,
        SynthesisSettings::from_config(cfg),
    );
    match cfg.answer_bank.as_deref() {
        Some(path) => {
            let conn = open_and_migrate(path)?;
            let bank = AnswerBank::load(&conn)?;
            tracing::info!(entries = bank.len(), "answer bank loaded");
            Ok(synth.with_answer_bank(bank))
        }
        None => Ok(synth),
    }
}

pub fn ingest(
    cfg: &ResponderConfig,
    data_dir: Option<&Path>,
    urls: &[String],
    rebuild: bool,
    workers: Option<usize>,
) -> Result<IngestReport, AppError> {
    let retriever = open_retriever(cfg, rebuild)?;
    let chunker = Chunker::from_config(&cfg.chunking)?;
    let workers = workers.unwrap_or(cfg.batch.workers).max(1);
    let updated_at = now_rfc3339_utc()?;

    let dir = data_dir.unwrap_or(cfg.data_dir.as_path());
    // The default data dir is optional when only URLs are ingested.
    let paths = if data_dir.is_some() || urls.is_empty() || dir.is_dir() {
        scan_dir(dir)?
    } else {
        Vec::new()
    };
    tracing::info!(
        files = paths.len(),
        urls = urls.len(),
        rebuild,
        embedder = %retriever.embedder().id(),
        "ingest started"
    );

    let mut report = ingest_paths(
        &retriever,
        &FileLoader,
        &chunker,
        dir,
        &paths,
        workers,
        &updated_at,
    )?;

    if !urls.is_empty() {
        let timeout = Duration::from_secs(cfg.embeddings.timeout_secs);
        let mut docs: Vec<LoadedDocument> = Vec::new();
        let mut fetch_failures: Vec<IngestOutcome> = Vec::new();
        for url in urls {
            let loaded = fetch_page(url, timeout)
                .and_then(|bytes| FileLoader.load(url, DocumentKind::WebPage, &bytes));
            match loaded {
                Ok(doc) => docs.push(doc),
                Err(e) => {
                    tracing::warn!(url = %url, code = %e.code, "page skipped");
                    fetch_failures.push(IngestOutcome {
                        source_name: url.clone(),
                        path: Some(url.clone()),
                        status: IngestStatus::Failed {
                            code: e.code,
                            message: e.message,
                        },
                    });
                }
            }
        }
        let pages = ingest_documents(&retriever, &chunker, &docs, workers, &updated_at)?;
        report.outcomes.extend(pages.outcomes);
        report.outcomes.extend(fetch_failures);
        report.chunks_after = pages.chunks_after;
    }
    Ok(report)
}

pub fn ask(cfg: &ResponderConfig, question: &str) -> Result<Synthesis, AppError> {
    if question.trim().is_empty() {
        return Err(AppError::new("RETRIEVAL_QUERY_EMPTY", "Question must not be empty"));
    }
    let synth = build_synthesizer(cfg)?;
    Ok(synth.answer(question))
}

pub fn batch(
    cfg: &ResponderConfig,
    input: &Path,
    output: &Path,
    column: Option<&str>,
    workers: Option<usize>,
) -> Result<BatchReport, AppError> {
    let column = column.unwrap_or(cfg.batch.question_column.as_str());
    let sheet = read_questions(input, column)?;
    let synth = Arc::new(build_synthesizer(cfg)?);
    let mut writer = CsvAnswerWriter::create(output)?;
    let runner = BatchRunner::new(synth, workers.unwrap_or(cfg.batch.workers));
    let report = runner.run(&sheet, &mut writer)?;
    writer.into_inner()?;
    Ok(report)
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub index_dir: String,
    pub index: IndexStatus,
    pub sources: Vec<String>,
    pub embeddings: EmbeddingMode,
    pub embedding_model: String,
    pub generation: GenerationMode,
    pub generation_model: Option<String>,
    pub answer_bank: Option<String>,
    pub answer_bank_entries: Option<usize>,
}

pub fn status(cfg: &ResponderConfig) -> Result<StatusReport, AppError> {
    let retriever = open_retriever(cfg, false)?;
    let answer_bank_entries = match cfg.answer_bank.as_deref() {
        Some(path) => Some(answer_bank::list(&open_and_migrate(path)?)?.len()),
        None => None,
    };
    Ok(StatusReport {
        index_dir: cfg.index_dir.display().to_string(),
        index: retriever.index().status(),
        sources: retriever.index().sources(),
        embeddings: cfg.resolved_embeddings(),
        embedding_model: cfg.embedding_model(),
        generation: cfg.resolved_generation(),
        generation_model: cfg.generation_model(),
        answer_bank: cfg.answer_bank.as_ref().map(|p| p.display().to_string()),
        answer_bank_entries,
    })
}

#[derive(Debug, Serialize)]
pub struct ProviderHealth {
    pub role: String,
    pub provider: String,
    pub ok: bool,
    pub message: String,
}

fn check(role: &str, provider: &str, result: Result<String, AppError>) -> ProviderHealth {
    let (ok, message) = match result {
        Ok(m) => (true, m),
        Err(e) => (false, e.to_string()),
    };
    ProviderHealth {
        role: role.to_string(),
        provider: provider.to_string(),
        ok,
        message,
    }
}

fn check_ollama(cfg: &ResponderConfig, timeout: Duration) -> Result<String, AppError> {
    let client = OllamaClient::new(&cfg.providers.ollama_url)?;
    client.health_check(timeout)?;
    Ok(format!("Ollama reachable at {}", client.base_url()))
}

fn check_openai(cfg: &ResponderConfig, timeout: Duration) -> Result<String, AppError> {
    let key = cfg
        .providers
        .openai_api_key
        .as_deref()
        .ok_or_else(|| AppError::new("CONFIG_INVALID", "OPENAI_API_KEY is not set"))?;
    let client = OpenAiClient::new(&cfg.providers.openai_base_url, key)?;
    client.health_check(timeout)?;
    Ok(format!("OpenAI-compatible API reachable at {}", client.base_url()))
}

/// Reachability of each resolved provider. Offline modes always report healthy.
pub fn health(cfg: &ResponderConfig) -> Vec<ProviderHealth> {
    let embed_timeout = Duration::from_secs(cfg.embeddings.timeout_secs);
    let gen_timeout = Duration::from_secs(cfg.generation.timeout_secs);
    let embeddings = match cfg.resolved_embeddings() {
        EmbeddingMode::Hashing => check("embeddings", "hashing", Ok("offline".to_string())),
        EmbeddingMode::Ollama => check("embeddings", "ollama", check_ollama(cfg, embed_timeout)),
        EmbeddingMode::OpenAi => check("embeddings", "openai", check_openai(cfg, embed_timeout)),
    };
    let generation = match cfg.resolved_generation() {
        GenerationMode::EvidenceOnly => {
            check("generation", "none", Ok("evidence-only answers".to_string()))
        }
        GenerationMode::Ollama => check("generation", "ollama", check_ollama(cfg, gen_timeout)),
        GenerationMode::OpenAi => check("generation", "openai", check_openai(cfg, gen_timeout)),
    };
    vec![embeddings, generation]
}

pub fn bank_import(
    cfg: &ResponderConfig,
    csv_path: &Path,
) -> Result<AnswerBankImportSummary, AppError> {
    let mut conn = open_and_migrate(answer_bank_path(cfg)?)?;
    let file = File::open(csv_path).map_err(|e| {
        AppError::new("ANSWER_BANK_IMPORT_FAILED", "Failed to open answer bank CSV")
            .with_details(format!("path={}; err={}", csv_path.display(), e))
    })?;
    let today = OffsetDateTime::now_utc().date().to_string();
    answer_bank::import_csv(&mut conn, file, &today)
}

pub fn bank_list(cfg: &ResponderConfig) -> Result<Vec<AnswerBankEntry>, AppError> {
    let conn = open_and_migrate(answer_bank_path(cfg)?)?;
    answer_bank::list(&conn)
}
