use std::collections::HashSet;
use std::path::{Path, PathBuf};

use qr_core::error::{AppError, ErrorClass};
use qr_core::loader::{load_path_as, source_name_under, DocumentLoader, LoadedDocument};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::chunking::Chunker;
use super::model::EmbeddedChunk;
use crate::retrieve::Retriever;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestStatus {
    Indexed { chunks: usize },
    Empty,
    Failed { code: String, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestOutcome {
    pub source_name: String,
    pub path: Option<String>,
    #[serde(flatten)]
    pub status: IngestStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestReport {
    pub outcomes: Vec<IngestOutcome>,
    pub chunks_before: usize,
    pub chunks_after: usize,
}

impl IngestReport {
    pub fn indexed(&self) -> usize {
        self.count(|s| matches!(s, IngestStatus::Indexed { .. }))
    }

    pub fn empty(&self) -> usize {
        self.count(|s| matches!(s, IngestStatus::Empty))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, IngestStatus::Failed { .. }))
    }

    fn count(&self, f: impl Fn(&IngestStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| f(&o.status)).count()
    }
}

/// Load, chunk, embed and index each path. Source names are paths relative to `root`.
/// Load and embedding failures are isolated to their document; index failures abort
/// the run.
pub fn ingest_paths(
    retriever: &Retriever,
    loader: &dyn DocumentLoader,
    chunker: &Chunker,
    root: &Path,
    paths: &[PathBuf],
    workers: usize,
    updated_at: &str,
) -> Result<IngestReport, AppError> {
    let chunks_before = retriever.index().len();
    // A later path whose name is already taken would replace the earlier one's chunks.
    let mut seen = HashSet::new();
    let named: Vec<(String, &PathBuf, bool)> = paths
        .iter()
        .map(|p| {
            let name = source_name_under(root, p);
            let first = seen.insert(name.clone());
            (name, p, first)
        })
        .collect();
    let results = run_parallel(workers, || {
        named
            .par_iter()
            .map(|(source_name, path, first)| -> Result<IngestOutcome, AppError> {
                let path_str = Some(path.display().to_string());
                let outcome = if !first {
                    failed(
                        source_name,
                        AppError::new(
                            "LOAD_DUPLICATE_SOURCE",
                            "Another document already uses this source name",
                        )
                        .with_details(format!("path={}", path.display())),
                    )
                } else {
                    match load_path_as(loader, path, source_name) {
                        Ok(doc) => index_document(retriever, chunker, &doc, updated_at)?,
                        Err(e) => failed(source_name, e),
                    }
                };
                Ok(IngestOutcome {
                    source_name: source_name.clone(),
                    path: path_str,
                    status: outcome,
                })
            })
            .collect::<Vec<Result<IngestOutcome, AppError>>>()
    })?;
    finish(retriever, results, chunks_before)
}

/// Same as [`ingest_paths`] for documents that are already loaded (fetched pages).
pub fn ingest_documents(
    retriever: &Retriever,
    chunker: &Chunker,
    docs: &[LoadedDocument],
    workers: usize,
    updated_at: &str,
) -> Result<IngestReport, AppError> {
    let chunks_before = retriever.index().len();
    let results = run_parallel(workers, || {
        docs.par_iter()
            .map(|doc| -> Result<IngestOutcome, AppError> {
                Ok(IngestOutcome {
                    source_name: doc.source_name.clone(),
                    path: None,
                    status: index_document(retriever, chunker, doc, updated_at)?,
                })
            })
            .collect::<Vec<Result<IngestOutcome, AppError>>>()
    })?;
    finish(retriever, results, chunks_before)
}

fn run_parallel<T, F>(workers: usize, op: F) -> Result<T, AppError>
where
    F: FnOnce() -> T + Send,
    T: Send,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|e| {
            AppError::new("INGEST_POOL_FAILED", "Failed to start ingest worker pool")
                .with_details(e.to_string())
        })?;
    Ok(pool.install(op))
}

fn finish(
    retriever: &Retriever,
    results: Vec<Result<IngestOutcome, AppError>>,
    chunks_before: usize,
) -> Result<IngestReport, AppError> {
    let outcomes = results.into_iter().collect::<Result<Vec<_>, _>>()?;
    let report = IngestReport {
        outcomes,
        chunks_before,
        chunks_after: retriever.index().len(),
    };
    tracing::info!(
        indexed = report.indexed(),
        empty = report.empty(),
        failed = report.failed(),
        chunks_before = report.chunks_before,
        chunks_after = report.chunks_after,
        "ingest finished"
    );
    Ok(report)
}

fn failed(source_name: &str, e: AppError) -> IngestStatus {
    tracing::warn!(source = source_name, code = %e.code, details = ?e.details, "document skipped");
    IngestStatus::Failed {
        code: e.code,
        message: e.message,
    }
}

/// Per-document pipeline. Only index-class errors are returned as `Err`.
fn index_document(
    retriever: &Retriever,
    chunker: &Chunker,
    doc: &LoadedDocument,
    updated_at: &str,
) -> Result<IngestStatus, AppError> {
    let drafts = chunker.chunk_document(doc);
    if drafts.is_empty() {
        tracing::warn!(source = %doc.source_name, "document produced no text");
        // Drop whatever an earlier, non-empty version of the document indexed.
        return match retriever
            .index()
            .replace_source(&doc.source_name, Vec::new(), updated_at)
        {
            Ok(_) => Ok(IngestStatus::Empty),
            Err(e) if e.class() == ErrorClass::Index => Err(e),
            Err(e) => Ok(failed(&doc.source_name, e)),
        };
    }

    let mut embedded = Vec::with_capacity(drafts.len());
    for draft in drafts {
        match retriever.embedder().embed(&draft.text) {
            Ok(vector) => embedded.push(EmbeddedChunk { draft, vector }),
            Err(e) => {
                let e = AppError::new("EMBEDDING_FAILED", "Failed to embed chunk")
                    .with_details(format!(
                        "source={}; ordinal={}; err={}",
                        draft.source_name, draft.ordinal, e
                    ))
                    .with_retryable(e.retryable);
                return Ok(failed(&doc.source_name, e));
            }
        }
    }

    match retriever
        .index()
        .replace_source(&doc.source_name, embedded, updated_at)
    {
        Ok(chunks) => {
            tracing::debug!(source = %doc.source_name, chunks, "document indexed");
            Ok(IngestStatus::Indexed { chunks })
        }
        Err(e) if e.class() == ErrorClass::Index => Err(e),
        Err(e) => Ok(failed(&doc.source_name, e)),
    }
}
