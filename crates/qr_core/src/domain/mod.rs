use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AppError;

/// Rendered in the `AI Response` column when nothing relevant was retrieved.
pub const NO_SOURCE_ANSWER: &str = "No source found";
/// Rendered in the `Evidence` column when an answer carries no citations.
pub const NO_SOURCE_EVIDENCE: &str = "No Source Found";
pub const PROVIDER_ERROR_NOTE: &str = "Provider error: evidence retrieved but unsynthesized";
pub const RETRIEVAL_ERROR_NOTE: &str = "Retrieval error: evidence could not be retrieved";
pub const UNSUPPLIED_CITATION_NOTE: &str = "Answer cited evidence that was not supplied";

/// How much an answer can be trusted without a human pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceStatus {
    /// Grounded answer produced from cited evidence.
    AutoFilled,
    /// Evidence exists and policy allows returning it unsynthesized.
    AutoFilledSearchOnly,
    ReviewRequired,
}

impl ConfidenceStatus {
    pub fn label(self) -> &'static str {
        match self {
            ConfidenceStatus::AutoFilled => "Auto-Filled",
            ConfidenceStatus::AutoFilledSearchOnly => "Auto-Filled (search only)",
            ConfidenceStatus::ReviewRequired => "Review Required",
        }
    }

    pub fn is_auto_filled(self) -> bool {
        !matches!(self, ConfidenceStatus::ReviewRequired)
    }
}

impl fmt::Display for ConfidenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One answered questionnaire question.
///
/// Fields are private so the auto-filled-needs-evidence rule cannot be bypassed:
/// every constructor goes through [`Answer::new`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Answer {
    question: String,
    answer_text: String,
    confidence_status: ConfidenceStatus,
    evidence: Vec<String>,
}

impl Answer {
    pub fn new(
        question: impl Into<String>,
        answer_text: impl Into<String>,
        confidence_status: ConfidenceStatus,
        evidence: Vec<String>,
    ) -> Result<Self, AppError> {
        let evidence: Vec<String> = evidence
            .into_iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();
        if confidence_status.is_auto_filled() && evidence.is_empty() {
            return Err(AppError::new(
                "ANSWER_EVIDENCE_REQUIRED",
                "Auto-filled answers must carry at least one evidence citation",
            )
            .with_details(format!("status={}", confidence_status.label())));
        }
        Ok(Self {
            question: question.into(),
            answer_text: answer_text.into(),
            confidence_status,
            evidence,
        })
    }

    /// Outcome for a question with no usable evidence. Infallible: review rows may be empty.
    pub fn no_source(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer_text: NO_SOURCE_ANSWER.to_string(),
            confidence_status: ConfidenceStatus::ReviewRequired,
            evidence: Vec::new(),
        }
    }

    /// A review-required answer with notes/citations attached.
    pub fn needs_review(
        question: impl Into<String>,
        answer_text: impl Into<String>,
        evidence: Vec<String>,
    ) -> Self {
        let evidence = evidence
            .into_iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();
        Self {
            question: question.into(),
            answer_text: answer_text.into(),
            confidence_status: ConfidenceStatus::ReviewRequired,
            evidence,
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn answer_text(&self) -> &str {
        &self.answer_text
    }

    pub fn confidence_status(&self) -> ConfidenceStatus {
        self.confidence_status
    }

    pub fn evidence(&self) -> &[String] {
        &self.evidence
    }

    /// Single-cell rendering for tabular export.
    pub fn evidence_cell(&self) -> String {
        if self.evidence.is_empty() {
            NO_SOURCE_EVIDENCE.to_string()
        } else {
            self.evidence.join("; ")
        }
    }
}

/// `"<source_name> (Pg. <location>)"`
pub fn format_citation(source_name: &str, location: &str) -> String {
    format!("{source_name} (Pg. {location})")
}

/// Deduplicate citations, keeping first-seen order.
pub fn dedup_citations<I>(citations: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for c in citations {
        if seen.insert(c.clone()) {
            out.push(c);
        }
    }
    out
}

/// A question read from the input table. `row` is the 1-based data row (header excluded).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionRow {
    pub row: usize,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkippedRow {
    pub row: usize,
    pub reason: String,
}
