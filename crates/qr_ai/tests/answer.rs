use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use qr_ai::answer::{
    build_strategy, AnswerStrategy, AnswerSynthesizer, EvidenceOnlyStrategy, GenerativeStrategy,
    SynthesisSettings,
};
use qr_ai::embeddings::{Embedder, HashingEmbedder};
use qr_ai::evidence::{ingest_documents, ChunkDraft, Chunker, EmbeddedChunk};
use qr_ai::guardrails::REVIEW_SENTINEL;
use qr_ai::llm::Llm;
use qr_ai::retrieve::Retriever;
use qr_core::answer_bank::{AnswerBank, AnswerBankEntry};
use qr_core::config::{
    AnswerPolicyConfig, GenerationProvider, OfflineAnswer, OfflineStatus, ResponderConfig,
};
use qr_core::domain::{
    ConfidenceStatus, NO_SOURCE_ANSWER, PROVIDER_ERROR_NOTE, RETRIEVAL_ERROR_NOTE,
    UNSUPPLIED_CITATION_NOTE,
};
use qr_core::error::AppError;
use qr_core::loader::{DocumentKind, LoadedDocument, LoadedSection};

const TS: &str = "2026-02-10T00:00:00Z";
const MFA_TEXT: &str =
    "Multi-factor authentication (MFA) is required for all employees and contractors.";
const LOGS_TEXT: &str = "Audit logs are retained for one year in a tamper-evident store.";

struct MockLlm {
    reply: Result<String, AppError>,
    calls: AtomicUsize,
    last_prompt: Mutex<String>,
}

impl MockLlm {
    fn replying(out: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(out.to_string()),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(String::new()),
        })
    }

    fn failing(err: AppError) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(err),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(String::new()),
        })
    }
}

impl Llm for MockLlm {
    fn id(&self) -> String {
        "mock:llm".to_string()
    }

    fn generate(&self, prompt: &str) -> Result<String, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock() = prompt.to_string();
        self.reply.clone()
    }
}

/// Hashing embedder that counts how often it is asked to embed.
struct CountingEmbedder {
    inner: HashingEmbedder,
    calls: AtomicUsize,
}

impl Embedder for CountingEmbedder {
    fn id(&self) -> String {
        self.inner.id()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed(text)
    }
}

fn doc(source: &str, location: &str, text: &str) -> LoadedDocument {
    LoadedDocument {
        source_name: source.to_string(),
        kind: DocumentKind::Pdf,
        sections: vec![LoadedSection {
            text: text.to_string(),
            location: location.to_string(),
        }],
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    retriever: Arc<Retriever>,
    embedder: Arc<CountingEmbedder>,
}

fn indexed_policies() -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let embedder = Arc::new(CountingEmbedder {
        inner: HashingEmbedder::new(384).expect("embedder"),
        calls: AtomicUsize::new(0),
    });
    let retriever = Retriever::open(dir.path(), embedder.clone(), false).expect("open");
    let chunker = Chunker::new(1000, 200).expect("chunker");
    let report = ingest_documents(
        &retriever,
        &chunker,
        &[
            doc("Access_Policy.pdf", "4", MFA_TEXT),
            doc("Logging_Standard.pdf", "2", LOGS_TEXT),
        ],
        2,
        TS,
    )
    .expect("ingest");
    assert_eq!(report.indexed(), 2);
    Fixture {
        _dir: dir,
        retriever: Arc::new(retriever),
        embedder,
    }
}

fn settings() -> SynthesisSettings {
    SynthesisSettings {
        top_k: 4,
        relevance_threshold: 0.25,
    }
}

fn synthesizer(fx: &Fixture, strategy: Box<dyn AnswerStrategy>) -> AnswerSynthesizer {
    AnswerSynthesizer::new(Arc::clone(&fx.retriever), strategy, settings())
}

fn generative(llm: Arc<MockLlm>) -> Box<dyn AnswerStrategy> {
    Box::new(GenerativeStrategy::new(llm, &AnswerPolicyConfig::default()))
}

#[test]
fn grounded_answer_is_auto_filled_with_page_citation() {
    let fx = indexed_policies();
    let llm = MockLlm::replying("Yes, MFA is required [[source:1]].");
    let synth = synthesizer(&fx, generative(llm.clone()));

    let s = synth.answer("Do you use MFA?");
    assert!(s.degraded.is_none());
    assert_eq!(s.answer.confidence_status(), ConfidenceStatus::AutoFilled);
    assert_eq!(s.answer.answer_text(), "Yes, MFA is required.");
    assert_eq!(s.answer.evidence_cell(), "Access_Policy.pdf (Pg. 4)");

    let prompt = llm.last_prompt.lock().clone();
    assert!(prompt.contains("[[source:1]] Access_Policy.pdf (Pg. 4)"));
    assert!(prompt.contains(MFA_TEXT));
    // The unrelated logging chunk scores below the threshold and is never supplied.
    assert!(!prompt.contains("[[source:2]]"));
}

#[test]
fn unanswerable_question_needs_review_without_calling_provider() {
    let fx = indexed_policies();
    let llm = MockLlm::replying("should not be used [[source:1]]");
    let synth = synthesizer(&fx, generative(llm.clone()));

    let s = synth.answer("Do you have ISO 27001 certification?");
    assert_eq!(s.answer.confidence_status(), ConfidenceStatus::ReviewRequired);
    assert_eq!(s.answer.answer_text(), NO_SOURCE_ANSWER);
    assert_eq!(s.answer.evidence_cell(), "No Source Found");
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn evidence_only_defaults_to_review_with_best_chunk() {
    let fx = indexed_policies();
    let strategy = EvidenceOnlyStrategy::new(&AnswerPolicyConfig::default());
    let synth = synthesizer(&fx, Box::new(strategy));
    assert_eq!(synth.strategy_name(), "evidence-only");

    let s = synth.answer("Do you use MFA?");
    assert_eq!(s.answer.confidence_status(), ConfidenceStatus::ReviewRequired);
    assert_eq!(s.answer.answer_text(), MFA_TEXT);
    assert_eq!(s.answer.evidence(), ["Access_Policy.pdf (Pg. 4)".to_string()]);
}

#[test]
fn search_only_policy_auto_fills_with_evidence() {
    let fx = indexed_policies();
    let policy = AnswerPolicyConfig {
        offline_status: OfflineStatus::SearchOnly,
        offline_answer: OfflineAnswer::Best,
    };
    let synth = synthesizer(&fx, Box::new(EvidenceOnlyStrategy::new(&policy)));

    let s = synth.answer("How long are audit logs retained?");
    assert_eq!(
        s.answer.confidence_status(),
        ConfidenceStatus::AutoFilledSearchOnly
    );
    assert_eq!(s.answer.answer_text(), LOGS_TEXT);
    assert_eq!(s.answer.evidence_cell(), "Logging_Standard.pdf (Pg. 2)");

    // Nothing relevant still means review, whatever the policy.
    let s = synth.answer("Do you have ISO 27001 certification?");
    assert_eq!(s.answer.confidence_status(), ConfidenceStatus::ReviewRequired);
}

#[test]
fn concat_policy_joins_every_relevant_chunk_by_rank() {
    let fx = indexed_policies();
    let policy = AnswerPolicyConfig {
        offline_status: OfflineStatus::ReviewRequired,
        offline_answer: OfflineAnswer::Concat,
    };
    let synth = synthesizer(&fx, Box::new(EvidenceOnlyStrategy::new(&policy)));

    let s = synth.answer("Is MFA required and are audit logs retained?");
    assert_eq!(s.answer.answer_text(), format!("{LOGS_TEXT}\n\n{MFA_TEXT}"));
    assert_eq!(
        s.answer.evidence(),
        [
            "Logging_Standard.pdf (Pg. 2)".to_string(),
            "Access_Policy.pdf (Pg. 4)".to_string()
        ]
    );
}

#[test]
fn provider_failure_degrades_to_unsynthesized_evidence() {
    let fx = indexed_policies();
    let llm = MockLlm::failing(
        AppError::new("GENERATION_FAILED", "Provider request failed").with_retryable(true),
    );
    let synth = synthesizer(&fx, generative(llm));

    let s = synth.answer("Do you use MFA?");
    assert_eq!(s.answer.confidence_status(), ConfidenceStatus::ReviewRequired);
    assert_eq!(s.answer.answer_text(), MFA_TEXT);
    assert_eq!(
        s.answer.evidence(),
        [
            PROVIDER_ERROR_NOTE.to_string(),
            "Access_Policy.pdf (Pg. 4)".to_string()
        ]
    );
    let err = s.degraded.expect("degraded");
    assert_eq!(err.code, "GENERATION_FAILED");
    assert!(err.retryable);
}

#[test]
fn empty_provider_output_is_treated_as_failure() {
    let fx = indexed_policies();
    let synth = synthesizer(&fx, generative(MockLlm::replying("   ")));

    let s = synth.answer("Do you use MFA?");
    assert_eq!(s.answer.confidence_status(), ConfidenceStatus::ReviewRequired);
    assert_eq!(s.answer.evidence()[0], PROVIDER_ERROR_NOTE);
    assert!(s.degraded.is_some());
}

#[test]
fn insufficient_evidence_reply_needs_review() {
    let fx = indexed_policies();
    let synth = synthesizer(&fx, generative(MockLlm::replying(REVIEW_SENTINEL)));

    let s = synth.answer("Do you use MFA?");
    assert_eq!(s.answer.confidence_status(), ConfidenceStatus::ReviewRequired);
    assert_eq!(s.answer.answer_text(), REVIEW_SENTINEL);
    assert_eq!(s.answer.evidence(), ["Access_Policy.pdf (Pg. 4)".to_string()]);
    assert!(s.degraded.is_none());
}

#[test]
fn citing_unsupplied_evidence_needs_review() {
    let fx = indexed_policies();
    let synth = synthesizer(
        &fx,
        generative(MockLlm::replying("MFA is required [[source:1]] [[source:9]].")),
    );

    let s = synth.answer("Do you use MFA?");
    assert_eq!(s.answer.confidence_status(), ConfidenceStatus::ReviewRequired);
    assert_eq!(s.answer.answer_text(), "MFA is required.");
    assert_eq!(
        s.answer.evidence(),
        [
            UNSUPPLIED_CITATION_NOTE.to_string(),
            "Access_Policy.pdf (Pg. 4)".to_string()
        ]
    );
}

#[test]
fn uncited_grounded_reply_cites_all_supplied_evidence() {
    let fx = indexed_policies();
    let synth = synthesizer(&fx, generative(MockLlm::replying("Yes, MFA is enforced.")));

    let s = synth.answer("Do you use MFA?");
    assert_eq!(s.answer.confidence_status(), ConfidenceStatus::AutoFilled);
    assert_eq!(s.answer.evidence_cell(), "Access_Policy.pdf (Pg. 4)");
}

#[test]
fn answer_bank_hit_skips_retrieval_and_generation() {
    let fx = indexed_policies();
    let llm = MockLlm::replying("unused [[source:1]]");
    let bank = AnswerBank::from_entries(vec![AnswerBankEntry {
        id: 1,
        question: "Do you use MFA?".to_string(),
        answer: "Yes. MFA is enforced through our identity provider.".to_string(),
        product: None,
        verified_by: "jdoe".to_string(),
        date_added: "2024-03-01".to_string(),
    }]);
    let synth = synthesizer(&fx, generative(llm.clone())).with_answer_bank(bank);
    let embeds_before = fx.embedder.calls.load(Ordering::SeqCst);

    let s = synth.answer("  do you use mfa ");
    assert_eq!(s.answer.confidence_status(), ConfidenceStatus::AutoFilled);
    assert_eq!(
        s.answer.answer_text(),
        "Yes. MFA is enforced through our identity provider."
    );
    assert_eq!(
        s.answer.evidence_cell(),
        "Answer Bank (verified by jdoe, 2024-03-01)"
    );
    assert_eq!(fx.embedder.calls.load(Ordering::SeqCst), embeds_before);
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0);

    // Misses fall through to retrieval.
    let s = synth.answer("Do you have ISO 27001 certification?");
    assert_eq!(s.answer.answer_text(), NO_SOURCE_ANSWER);
}

struct BrokenEmbedder;

impl Embedder for BrokenEmbedder {
    fn id(&self) -> String {
        "mock:broken:2".to_string()
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>, AppError> {
        Err(AppError::new("EMBEDDING_FAILED", "Embedding provider unreachable").with_retryable(true))
    }
}

#[test]
fn retrieval_failure_degrades_the_question() {
    let dir = tempfile::tempdir().expect("tempdir");
    let retriever = Retriever::open(dir.path(), Arc::new(BrokenEmbedder), false).expect("open");
    retriever
        .index()
        .upsert(
            vec![EmbeddedChunk {
                draft: ChunkDraft {
                    ordinal: 0,
                    text: MFA_TEXT.to_string(),
                    source_name: "Access_Policy.pdf".to_string(),
                    location: "4".to_string(),
                },
                vector: vec![1.0, 0.0],
            }],
            TS,
        )
        .expect("upsert");
    let synth = AnswerSynthesizer::new(
        Arc::new(retriever),
        generative(MockLlm::replying("unused")),
        settings(),
    );

    let s = synth.answer("Do you use MFA?");
    assert_eq!(s.answer.confidence_status(), ConfidenceStatus::ReviewRequired);
    assert_eq!(s.answer.evidence(), [RETRIEVAL_ERROR_NOTE.to_string()]);
    assert_eq!(s.degraded.expect("degraded").code, "EMBEDDING_FAILED");
}

#[test]
fn ollama_strategy_uses_an_ollama_model_by_default() {
    let mut cfg = ResponderConfig::default();
    cfg.generation.provider = GenerationProvider::Ollama;
    let strategy = build_strategy(&cfg).expect("strategy");
    assert_eq!(strategy.name(), "generative:ollama:llama3.2:latest");

    cfg.generation.model = Some("mistral:7b".to_string());
    let strategy = build_strategy(&cfg).expect("strategy");
    assert_eq!(strategy.name(), "generative:ollama:mistral:7b");
}
