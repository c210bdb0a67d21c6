//! Turns retrieved evidence into a cited, confidence-flagged [`Answer`].
//!
//! Branch order per question: verified answer bank, no relevant evidence, then the
//! configured [`AnswerStrategy`] (evidence-only or generative). Provider and retrieval
//! failures never abort a question; they degrade it to `Review Required`.

use std::sync::Arc;
use std::time::Duration;

use qr_core::answer_bank::AnswerBank;
use qr_core::config::{
    AnswerPolicyConfig, GenerationMode, OfflineAnswer, OfflineStatus, ResponderConfig,
};
use qr_core::domain::{
    dedup_citations, Answer, ConfidenceStatus, PROVIDER_ERROR_NOTE, RETRIEVAL_ERROR_NOTE,
    UNSUPPLIED_CITATION_NOTE,
};
use qr_core::error::AppError;
use serde::{Deserialize, Serialize};

use crate::evidence::EvidenceHit;
use crate::guardrails::{extract_cited_sources, is_insufficient_evidence, strip_citation_markers};
use crate::llm::{Llm, OllamaLlm, OpenAiLlm};
use crate::ollama::OllamaClient;
use crate::openai::OpenAiClient;
use crate::retrieve::Retriever;

mod prompts;

pub use prompts::grounded_answer_prompt;

/// One synthesized answer and, when the question was degraded, the cause.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub answer: Answer,
    pub degraded: Option<AppError>,
}

impl Synthesis {
    fn ok(answer: Answer) -> Self {
        Self {
            answer,
            degraded: None,
        }
    }
}

/// Decides how evidence becomes answer text. Chosen once at construction.
pub trait AnswerStrategy: Send + Sync {
    fn name(&self) -> String;
    /// `relevant` is non-empty and ordered by descending score.
    fn synthesize(&self, question: &str, relevant: &[EvidenceHit]) -> Synthesis;
}

/// Build an answer, falling back to review when the auto-filled invariant cannot hold.
fn finalize(
    question: &str,
    text: String,
    status: ConfidenceStatus,
    evidence: Vec<String>,
) -> Answer {
    match Answer::new(question, text.clone(), status, evidence.clone()) {
        Ok(a) => a,
        Err(e) => {
            tracing::warn!(code = %e.code, "answer downgraded to review");
            Answer::needs_review(question, text, evidence)
        }
    }
}

fn citations(hits: &[EvidenceHit]) -> Vec<String> {
    dedup_citations(hits.iter().map(EvidenceHit::citation))
}

/// Returns retrieved evidence without a generative provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvidenceOnlyStrategy {
    status: OfflineStatus,
    answer: OfflineAnswer,
}

impl EvidenceOnlyStrategy {
    pub fn new(policy: &AnswerPolicyConfig) -> Self {
        Self {
            status: policy.offline_status,
            answer: policy.offline_answer,
        }
    }

    /// Answer text and contributing citations for `relevant`.
    fn content(&self, relevant: &[EvidenceHit]) -> (String, Vec<String>) {
        match self.answer {
            OfflineAnswer::Best => {
                let best = &relevant[..relevant.len().min(1)];
                let text = best.first().map(|h| h.text.clone()).unwrap_or_default();
                (text, citations(best))
            }
            OfflineAnswer::Concat => {
                let text = relevant
                    .iter()
                    .map(|h| h.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n");
                (text, citations(relevant))
            }
        }
    }
}

impl AnswerStrategy for EvidenceOnlyStrategy {
    fn name(&self) -> String {
        "evidence-only".to_string()
    }

    fn synthesize(&self, question: &str, relevant: &[EvidenceHit]) -> Synthesis {
        let (text, evidence) = self.content(relevant);
        let status = match self.status {
            OfflineStatus::ReviewRequired => ConfidenceStatus::ReviewRequired,
            OfflineStatus::SearchOnly => ConfidenceStatus::AutoFilledSearchOnly,
        };
        Synthesis::ok(finalize(question, text, status, evidence))
    }
}

/// Grounded generation over the relevant hits, labelled `[[source:N]]` from 1.
pub struct GenerativeStrategy {
    llm: Arc<dyn Llm>,
    fallback: EvidenceOnlyStrategy,
}

impl GenerativeStrategy {
    pub fn new(llm: Arc<dyn Llm>, policy: &AnswerPolicyConfig) -> Self {
        Self {
            llm,
            fallback: EvidenceOnlyStrategy::new(policy),
        }
    }

    fn evidence_blocks(relevant: &[EvidenceHit]) -> String {
        relevant
            .iter()
            .enumerate()
            .map(|(i, h)| format!("[[source:{}]] {}\n{}", i + 1, h.citation(), h.text.trim()))
            .collect::<Vec<_>>()
            .join("\n\n---\n\n")
    }

    fn degrade(&self, question: &str, relevant: &[EvidenceHit], err: AppError) -> Synthesis {
        tracing::warn!(code = %err.code, retryable = err.retryable, "generation failed; returning unsynthesized evidence");
        let (text, cited) = self.fallback.content(relevant);
        let mut evidence = vec![PROVIDER_ERROR_NOTE.to_string()];
        evidence.extend(cited);
        Synthesis {
            answer: Answer::needs_review(question, text, evidence),
            degraded: Some(err),
        }
    }
}

impl AnswerStrategy for GenerativeStrategy {
    fn name(&self) -> String {
        format!("generative:{}", self.llm.id())
    }

    fn synthesize(&self, question: &str, relevant: &[EvidenceHit]) -> Synthesis {
        let prompt = grounded_answer_prompt(question, &Self::evidence_blocks(relevant));
        let output = match self.llm.generate(&prompt) {
            Ok(o) if !o.trim().is_empty() => o,
            Ok(_) => {
                let err = AppError::new("GENERATION_FAILED", "Provider returned an empty answer");
                return self.degrade(question, relevant, err);
            }
            Err(e) => return self.degrade(question, relevant, e),
        };
        let supplied = citations(relevant);

        if is_insufficient_evidence(&output) {
            tracing::debug!(question, "provider reported insufficient evidence");
            return Synthesis::ok(Answer::needs_review(
                question,
                strip_citation_markers(&output),
                supplied,
            ));
        }

        let mut labels: Vec<usize> = Vec::new();
        let mut unsupplied: Vec<String> = Vec::new();
        for raw in extract_cited_sources(&output) {
            match raw.parse::<usize>() {
                Ok(n) if (1..=relevant.len()).contains(&n) => labels.push(n),
                _ => unsupplied.push(raw),
            }
        }
        let text = strip_citation_markers(&output);

        if !unsupplied.is_empty() {
            tracing::warn!(labels = ?unsupplied, "answer cited evidence that was not supplied");
            let mut evidence = vec![UNSUPPLIED_CITATION_NOTE.to_string()];
            evidence.extend(supplied);
            return Synthesis::ok(Answer::needs_review(question, text, evidence));
        }

        labels.sort_unstable();
        let evidence = if labels.is_empty() {
            supplied
        } else {
            dedup_citations(labels.iter().map(|n| relevant[n - 1].citation()))
        };
        Synthesis::ok(finalize(question, text, ConfidenceStatus::AutoFilled, evidence))
    }
}

/// Build the strategy for the resolved generation mode.
pub fn build_strategy(cfg: &ResponderConfig) -> Result<Box<dyn AnswerStrategy>, AppError> {
    let timeout = Duration::from_secs(cfg.generation.timeout_secs);
    let model = cfg.generation_model().unwrap_or_default();
    let strategy: Box<dyn AnswerStrategy> = match cfg.resolved_generation() {
        GenerationMode::EvidenceOnly => Box::new(EvidenceOnlyStrategy::new(&cfg.answers)),
        GenerationMode::Ollama => {
            let llm = OllamaLlm::new(
                OllamaClient::new(&cfg.providers.ollama_url)?,
                model,
                timeout,
            );
            Box::new(GenerativeStrategy::new(Arc::new(llm), &cfg.answers))
        }
        GenerationMode::OpenAi => {
            let key = cfg.providers.openai_api_key.as_deref().ok_or_else(|| {
                AppError::new("CONFIG_INVALID", "OpenAI generation requires OPENAI_API_KEY")
            })?;
            let llm = OpenAiLlm::new(
                OpenAiClient::new(&cfg.providers.openai_base_url, key)?,
                model,
                timeout,
            );
            Box::new(GenerativeStrategy::new(Arc::new(llm), &cfg.answers))
        }
    };
    tracing::debug!(strategy = %strategy.name(), "answer strategy selected");
    Ok(strategy)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SynthesisSettings {
    pub top_k: usize,
    pub relevance_threshold: f32,
}

impl SynthesisSettings {
    pub fn from_config(cfg: &ResponderConfig) -> Self {
        Self {
            top_k: cfg.retrieval.top_k as usize,
            relevance_threshold: cfg.retrieval.relevance_threshold,
        }
    }
}

pub struct AnswerSynthesizer {
    retriever: Arc<Retriever>,
    strategy: Box<dyn AnswerStrategy>,
    answer_bank: Option<AnswerBank>,
    settings: SynthesisSettings,
}

impl AnswerSynthesizer {
    pub fn new(
        retriever: Arc<Retriever>,
        strategy: Box<dyn AnswerStrategy>,
        settings: SynthesisSettings,
    ) -> Self {
        Self {
            retriever,
            strategy,
            answer_bank: None,
            settings,
        }
    }

    pub fn with_answer_bank(mut self, bank: AnswerBank) -> Self {
        self.answer_bank = Some(bank);
        self
    }

    pub fn strategy_name(&self) -> String {
        self.strategy.name()
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn answer(&self, question: &str) -> Synthesis {
        if let Some(entry) = self.answer_bank.as_ref().and_then(|b| b.lookup(question)) {
            tracing::debug!(question, entry_id = entry.id, "answered from answer bank");
            return Synthesis::ok(finalize(
                question,
                entry.answer.clone(),
                ConfidenceStatus::AutoFilled,
                vec![entry.citation()],
            ));
        }

        let hits = match self.retriever.retrieve(question, self.settings.top_k) {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(code = %e.code, retryable = e.retryable, "retrieval failed; question needs review");
                return Synthesis {
                    answer: Answer::needs_review(
                        question,
                        qr_core::domain::NO_SOURCE_ANSWER,
                        vec![RETRIEVAL_ERROR_NOTE.to_string()],
                    ),
                    degraded: Some(e),
                };
            }
        };

        let threshold = self.settings.relevance_threshold;
        let relevant: Vec<EvidenceHit> = hits
            .into_iter()
            .filter(|h| h.similarity_score >= threshold)
            .collect();
        if relevant.is_empty() {
            tracing::debug!(question, "no evidence above threshold");
            return Synthesis::ok(Answer::no_source(question));
        }

        self.strategy.synthesize(question, &relevant)
    }
}
