use std::sync::Arc;

use pretty_assertions::assert_eq;
use qr_ai::answer::{AnswerSynthesizer, GenerativeStrategy, SynthesisSettings};
use qr_ai::batch::{BatchRunner, CancelToken};
use qr_ai::embeddings::Embedder;
use qr_ai::evidence::{ChunkDraft, EmbeddedChunk};
use qr_ai::llm::Llm;
use qr_ai::retrieve::Retriever;
use qr_core::config::AnswerPolicyConfig;
use qr_core::domain::{Answer, ConfidenceStatus, QuestionRow, SkippedRow, PROVIDER_ERROR_NOTE};
use qr_core::error::AppError;
use qr_core::questionnaire::{AnswerSink, CsvAnswerWriter, QuestionSheet};

struct ConstantEmbedder;

impl Embedder for ConstantEmbedder {
    fn id(&self) -> String {
        "mock:constant:2".to_string()
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>, AppError> {
        Ok(vec![1.0, 0.0])
    }
}

/// Fails for one question and optionally trips a cancel token on another.
struct ScriptedLlm {
    fail_on: Option<&'static str>,
    cancel_on: Option<(&'static str, CancelToken)>,
}

fn asks(prompt: &str, question: &str) -> bool {
    prompt.contains(&format!("Question:\n{question}\n"))
}

impl Llm for ScriptedLlm {
    fn id(&self) -> String {
        "mock:scripted".to_string()
    }

    fn generate(&self, prompt: &str) -> Result<String, AppError> {
        if let Some((q, token)) = &self.cancel_on {
            if asks(prompt, q) {
                token.cancel();
            }
        }
        if self.fail_on.is_some_and(|q| asks(prompt, q)) {
            return Err(AppError::new("GENERATION_FAILED", "Provider timed out").with_retryable(true));
        }
        Ok("Yes, this control is in place [[source:1]].".to_string())
    }
}

fn synthesizer(dir: &tempfile::TempDir, llm: ScriptedLlm) -> Arc<AnswerSynthesizer> {
    let retriever = Retriever::open(dir.path(), Arc::new(ConstantEmbedder), false).expect("open");
    retriever
        .index()
        .upsert(
            vec![EmbeddedChunk {
                draft: ChunkDraft {
                    ordinal: 0,
                    text: "All controls are documented in the security program.".to_string(),
                    source_name: "Security_Program.pdf".to_string(),
                    location: "7".to_string(),
                },
                vector: vec![1.0, 0.0],
            }],
            "2026-02-10T00:00:00Z",
        )
        .expect("upsert");
    Arc::new(AnswerSynthesizer::new(
        Arc::new(retriever),
        Box::new(GenerativeStrategy::new(Arc::new(llm), &AnswerPolicyConfig::default())),
        SynthesisSettings {
            top_k: 4,
            relevance_threshold: 0.25,
        },
    ))
}

fn sheet(n: usize) -> QuestionSheet {
    QuestionSheet {
        questions: (1..=n)
            .map(|i| QuestionRow {
                row: i,
                text: format!("Q{i}"),
            })
            .collect(),
        skipped: Vec::new(),
    }
}

fn questions(rows: &[Answer]) -> Vec<String> {
    rows.iter().map(|a| a.question().to_string()).collect()
}

#[test]
fn one_provider_failure_does_not_stop_the_batch() {
    let dir = tempfile::tempdir().expect("tempdir");
    let synth = synthesizer(
        &dir,
        ScriptedLlm {
            fail_on: Some("Q7"),
            cancel_on: None,
        },
    );
    let runner = BatchRunner::new(synth, 4);
    let mut rows: Vec<Answer> = Vec::new();

    let report = runner.run(&sheet(10), &mut rows).expect("run");
    assert_eq!(report.total, 10);
    assert_eq!(report.written, 10);
    assert_eq!(report.auto_filled, 9);
    assert_eq!(report.review_required, 1);
    assert_eq!(report.degraded, 1);
    assert_eq!(report.cancelled, 0);

    let expected: Vec<String> = (1..=10).map(|i| format!("Q{i}")).collect();
    assert_eq!(questions(&rows), expected);

    let q7 = &rows[6];
    assert_eq!(q7.confidence_status(), ConfidenceStatus::ReviewRequired);
    assert_eq!(q7.evidence()[0], PROVIDER_ERROR_NOTE);
    for a in rows.iter().filter(|a| a.question() != "Q7") {
        assert_eq!(a.confidence_status(), ConfidenceStatus::AutoFilled);
        assert_eq!(a.evidence_cell(), "Security_Program.pdf (Pg. 7)");
    }
}

#[test]
fn cancellation_leaves_a_prefix_of_input_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let token = CancelToken::new();
    let synth = synthesizer(
        &dir,
        ScriptedLlm {
            fail_on: None,
            cancel_on: Some(("Q3", token.clone())),
        },
    );
    // One worker runs jobs in submission order, so Q3 is the last question started.
    let runner = BatchRunner::new(synth, 1).with_cancel_token(token.clone());
    let mut rows: Vec<Answer> = Vec::new();

    let report = runner.run(&sheet(10), &mut rows).expect("run");
    assert!(runner.cancel_token().is_cancelled());
    assert_eq!(report.written, 3);
    assert_eq!(report.cancelled, 7);
    assert_eq!(report.discarded, 0);
    assert_eq!(questions(&rows), vec!["Q1", "Q2", "Q3"]);
}

#[test]
fn pre_cancelled_batch_writes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let synth = synthesizer(
        &dir,
        ScriptedLlm {
            fail_on: None,
            cancel_on: None,
        },
    );
    let token = CancelToken::new();
    token.cancel();
    let runner = BatchRunner::new(synth, 3).with_cancel_token(token);
    let mut rows: Vec<Answer> = Vec::new();

    let report = runner.run(&sheet(5), &mut rows).expect("run");
    assert_eq!(report.written, 0);
    assert_eq!(report.cancelled, 5);
    assert!(rows.is_empty());
}

#[test]
fn skipped_rows_are_reported_not_written() {
    let dir = tempfile::tempdir().expect("tempdir");
    let synth = synthesizer(
        &dir,
        ScriptedLlm {
            fail_on: None,
            cancel_on: None,
        },
    );
    let mut input = sheet(2);
    input.skipped.push(SkippedRow {
        row: 3,
        reason: "blank question cell".to_string(),
    });
    let mut rows: Vec<Answer> = Vec::new();

    let report = BatchRunner::new(synth, 2).run(&input, &mut rows).expect("run");
    assert_eq!(report.skipped, 1);
    assert_eq!(report.written, 2);
    assert_eq!(rows.len(), 2);
}

#[test]
fn empty_sheet_is_a_no_op() {
    let dir = tempfile::tempdir().expect("tempdir");
    let synth = synthesizer(
        &dir,
        ScriptedLlm {
            fail_on: None,
            cancel_on: None,
        },
    );
    let mut rows: Vec<Answer> = Vec::new();
    let report = BatchRunner::new(synth, 2).run(&sheet(0), &mut rows).expect("run");
    assert_eq!(report.total, 0);
    assert!(rows.is_empty());
}

#[test]
fn rows_stream_to_csv_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let synth = synthesizer(
        &dir,
        ScriptedLlm {
            fail_on: None,
            cancel_on: None,
        },
    );
    let mut writer = CsvAnswerWriter::new(Vec::new()).expect("writer");
    BatchRunner::new(synth, 3)
        .run(&sheet(3), &mut writer)
        .expect("run");

    let out = String::from_utf8(writer.into_inner().expect("inner")).expect("utf8");
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines[0], "Question,AI Response,Status,Evidence");
    assert_eq!(
        lines[1],
        "Q1,\"Yes, this control is in place.\",Auto-Filled,Security_Program.pdf (Pg. 7)"
    );
    assert!(lines[2].starts_with("Q2,"));
    assert!(lines[3].starts_with("Q3,"));
    assert_eq!(lines.len(), 4);
}

struct FailingSink {
    accepted: usize,
}

impl AnswerSink for FailingSink {
    fn write_answer(&mut self, _answer: &Answer) -> Result<(), AppError> {
        if self.accepted == 1 {
            return Err(AppError::new("QUESTIONNAIRE_WRITE_FAILED", "Disk full"));
        }
        self.accepted += 1;
        Ok(())
    }
}

#[test]
fn sink_failure_aborts_the_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let synth = synthesizer(
        &dir,
        ScriptedLlm {
            fail_on: None,
            cancel_on: None,
        },
    );
    let runner = BatchRunner::new(synth, 2);
    let mut sink = FailingSink { accepted: 0 };

    let err = runner.run(&sheet(6), &mut sink).unwrap_err();
    assert_eq!(err.code, "QUESTIONNAIRE_WRITE_FAILED");
    assert_eq!(sink.accepted, 1);
    assert!(runner.cancel_token().is_cancelled());
}
