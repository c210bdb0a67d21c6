use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::channel;
use qr_core::domain::ConfidenceStatus;
use qr_core::error::AppError;
use qr_core::questionnaire::{AnswerSink, QuestionSheet};
use serde::{Deserialize, Serialize};

use crate::answer::{AnswerSynthesizer, Synthesis};

/// Cooperative cancellation shared between the caller and batch workers.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchReport {
    pub total: usize,
    pub written: usize,
    pub auto_filled: usize,
    pub search_only: usize,
    pub review_required: usize,
    pub degraded: usize,
    pub cancelled: usize,
    pub discarded: usize,
    pub skipped: usize,
}

enum Outcome {
    Done(Box<Synthesis>),
    Cancelled,
}

/// Answers questions on a bounded worker pool and writes rows strictly in input order.
pub struct BatchRunner {
    synthesizer: Arc<AnswerSynthesizer>,
    workers: usize,
    cancel: CancelToken,
}

impl BatchRunner {
    pub fn new(synthesizer: Arc<AnswerSynthesizer>, workers: usize) -> Self {
        Self {
            synthesizer,
            workers: workers.max(1),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run every question in `sheet` and stream answers to `sink`.
    ///
    /// The sink receives a prefix of input order: writing stops at the first question
    /// that was cancelled, and answers completed past that point are discarded.
    pub fn run(
        &self,
        sheet: &QuestionSheet,
        sink: &mut dyn AnswerSink,
    ) -> Result<BatchReport, AppError> {
        let mut report = BatchReport {
            total: sheet.questions.len(),
            skipped: sheet.skipped.len(),
            ..BatchReport::default()
        };
        for s in &sheet.skipped {
            tracing::debug!(row = s.row, reason = %s.reason, "skipped questionnaire row");
        }
        if sheet.questions.is_empty() {
            return Ok(report);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("qr-batch-{i}"))
            .build()
            .map_err(|e| {
                AppError::new("BATCH_POOL_FAILED", "Failed to start batch worker pool")
                    .with_details(e.to_string())
            })?;

        tracing::info!(
            questions = report.total,
            skipped = report.skipped,
            workers = self.workers,
            strategy = %self.synthesizer.strategy_name(),
            "batch started"
        );

        let (tx, rx) = channel::unbounded::<(usize, Outcome)>();
        for (pos, q) in sheet.questions.iter().enumerate() {
            let tx = tx.clone();
            let synth = Arc::clone(&self.synthesizer);
            let cancel = self.cancel.clone();
            let question = q.text.clone();
            let row = q.row;
            pool.spawn(move || {
                let outcome = if cancel.is_cancelled() {
                    Outcome::Cancelled
                } else {
                    let s = synth.answer(&question);
                    tracing::debug!(row, status = %s.answer.confidence_status(), "question answered");
                    Outcome::Done(Box::new(s))
                };
                // Receiver outlives every worker; a send error only means the run already failed.
                let _ = tx.send((pos, outcome));
            });
        }
        drop(tx);

        let mut pending: BTreeMap<usize, Outcome> = BTreeMap::new();
        let mut next = 0usize;
        let mut stopped = false;
        let mut sink_error: Option<AppError> = None;

        for (pos, outcome) in rx.iter() {
            pending.insert(pos, outcome);
            while let Some(outcome) = pending.remove(&next) {
                next += 1;
                match outcome {
                    Outcome::Cancelled => {
                        report.cancelled += 1;
                        stopped = true;
                    }
                    Outcome::Done(_) if stopped => report.discarded += 1,
                    Outcome::Done(s) => match sink.write_answer(&s.answer) {
                        Ok(()) => {
                            report.written += 1;
                            match s.answer.confidence_status() {
                                ConfidenceStatus::AutoFilled => report.auto_filled += 1,
                                ConfidenceStatus::AutoFilledSearchOnly => report.search_only += 1,
                                ConfidenceStatus::ReviewRequired => report.review_required += 1,
                            }
                            if s.degraded.is_some() {
                                report.degraded += 1;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(code = %e.code, "answer sink failed; cancelling batch");
                            self.cancel.cancel();
                            report.discarded += 1;
                            stopped = true;
                            sink_error = Some(e);
                        }
                    },
                }
            }
        }

        if let Some(e) = sink_error {
            return Err(e);
        }
        tracing::info!(
            written = report.written,
            auto_filled = report.auto_filled,
            search_only = report.search_only,
            review_required = report.review_required,
            degraded = report.degraded,
            cancelled = report.cancelled,
            discarded = report.discarded,
            "batch finished"
        );
        Ok(report)
    }
}
