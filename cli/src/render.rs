//! Human and `--json` renderings of command results. Logs go to stderr; only
//! results are written to stdout.

use std::path::Path;

use qr_ai::answer::Synthesis;
use qr_ai::batch::BatchReport;
use qr_ai::evidence::{IngestReport, IngestStatus};
use qr_core::answer_bank::{AnswerBankEntry, AnswerBankImportSummary};
use qr_core::error::AppError;
use serde::Serialize;

use crate::commands::{ProviderHealth, StatusReport};

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    let out = serde_json::to_string_pretty(value).map_err(|e| {
        AppError::new("OUTPUT_FAILED", "Failed to serialize output").with_details(e.to_string())
    })?;
    println!("{out}");
    Ok(())
}

pub fn error(e: &AppError, json: bool) {
    if json {
        #[derive(Serialize)]
        struct ErrorOut<'a> {
            error: &'a AppError,
        }
        if print_json(&ErrorOut { error: e }).is_ok() {
            return;
        }
    }
    eprintln!("{e}");
}

pub fn ingest(report: &IngestReport, json: bool) -> Result<(), AppError> {
    if json {
        return print_json(report);
    }
    for o in &report.outcomes {
        match &o.status {
            IngestStatus::Indexed { chunks } => println!("indexed  {} ({chunks} chunks)", o.source_name),
            IngestStatus::Empty => println!("empty    {}", o.source_name),
            IngestStatus::Failed { code, message } => {
                println!("failed   {} [{code}] {message}", o.source_name)
            }
        }
    }
    println!(
        "{} indexed, {} empty, {} failed; index now holds {} chunks (was {})",
        report.indexed(),
        report.empty(),
        report.failed(),
        report.chunks_after,
        report.chunks_before
    );
    Ok(())
}

pub fn ask(s: &Synthesis, json: bool) -> Result<(), AppError> {
    if json {
        #[derive(Serialize)]
        struct AskOut<'a> {
            question: &'a str,
            answer: &'a str,
            status: &'a str,
            evidence: &'a [String],
            degraded: Option<&'a AppError>,
        }
        return print_json(&AskOut {
            question: s.answer.question(),
            answer: s.answer.answer_text(),
            status: s.answer.confidence_status().label(),
            evidence: s.answer.evidence(),
            degraded: s.degraded.as_ref(),
        });
    }
    println!("{}", s.answer.answer_text());
    println!();
    println!("Status:   {}", s.answer.confidence_status());
    println!("Evidence: {}", s.answer.evidence_cell());
    if let Some(e) = &s.degraded {
        println!("Degraded: {e}");
    }
    Ok(())
}

pub fn batch(report: &BatchReport, output: &Path, json: bool) -> Result<(), AppError> {
    if json {
        return print_json(report);
    }
    println!(
        "wrote {} of {} answers to {}",
        report.written,
        report.total,
        output.display()
    );
    println!(
        "  auto-filled {}, search only {}, review required {} ({} degraded)",
        report.auto_filled, report.search_only, report.review_required, report.degraded
    );
    if report.skipped > 0 {
        println!("  skipped {} blank rows", report.skipped);
    }
    if report.cancelled > 0 {
        println!(
            "  cancelled {} questions ({} finished answers discarded)",
            report.cancelled, report.discarded
        );
    }
    Ok(())
}

pub fn status(st: &StatusReport, json: bool) -> Result<(), AppError> {
    if json {
        return print_json(st);
    }
    println!("index:       {}", st.index_dir);
    println!(
        "embedder:    {}",
        st.index.embedder.as_deref().unwrap_or("none")
    );
    println!(
        "chunks:      {} from {} sources",
        st.index.chunk_count, st.index.source_count
    );
    if let Some(d) = st.index.dims {
        println!("dimensions:  {d}");
    }
    if let Some(t) = st.index.updated_at.as_deref() {
        println!("updated:     {t}");
    }
    println!("embeddings:  {:?} ({})", st.embeddings, st.embedding_model);
    match st.generation_model.as_deref() {
        Some(model) => println!("generation:  {:?} ({model})", st.generation),
        None => println!("generation:  {:?}", st.generation),
    }
    match (&st.answer_bank, st.answer_bank_entries) {
        (Some(path), Some(n)) => println!("answer bank: {path} ({n} entries)"),
        _ => println!("answer bank: not configured"),
    }
    Ok(())
}

pub fn health(checks: &[ProviderHealth], json: bool) -> Result<(), AppError> {
    if json {
        print_json(checks)?;
    } else {
        for c in checks {
            let mark = if c.ok { "ok  " } else { "FAIL" };
            println!("{mark} {:<10} {:<7} {}", c.role, c.provider, c.message);
        }
    }
    match checks.iter().find(|c| !c.ok) {
        Some(c) => Err(AppError::new("PROVIDER_UNHEALTHY", "A configured provider is unreachable")
            .with_details(format!("role={}; provider={}", c.role, c.provider))),
        None => Ok(()),
    }
}

pub fn bank_import(summary: &AnswerBankImportSummary, json: bool) -> Result<(), AppError> {
    if json {
        return print_json(summary);
    }
    println!(
        "{} inserted, {} updated, {} skipped",
        summary.inserted,
        summary.updated,
        summary.skipped.len()
    );
    for s in &summary.skipped {
        println!("  row {}: {}", s.row, s.reason);
    }
    Ok(())
}

pub fn bank_list(entries: &[AnswerBankEntry], json: bool) -> Result<(), AppError> {
    if json {
        return print_json(entries);
    }
    for e in entries {
        let product = e.product.as_deref().unwrap_or("-");
        println!("#{} [{product}] {}", e.id, e.question);
        println!("    {}", e.answer);
        println!("    {}", e.citation());
    }
    if entries.is_empty() {
        println!("answer bank is empty");
    }
    Ok(())
}
