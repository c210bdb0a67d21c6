use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use qr_ai::answer::{AnswerSynthesizer, EvidenceOnlyStrategy, SynthesisSettings};
use qr_ai::batch::BatchRunner;
use qr_ai::embeddings::HashingEmbedder;
use qr_ai::evidence::{ingest_paths, Chunker, IngestStatus};
use qr_ai::retrieve::Retriever;
use qr_core::config::{AnswerPolicyConfig, OfflineAnswer, OfflineStatus};
use qr_core::domain::ConfidenceStatus;
use qr_core::loader::{scan_dir, FileLoader};
use qr_core::questionnaire::{read_questions, CsvAnswerWriter};

const TS: &str = "2026-02-10T00:00:00Z";

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../fixtures")
}

fn docs_dir() -> PathBuf {
    fixtures().join("docs")
}

fn open_retriever(dir: &Path) -> Retriever {
    Retriever::open(dir, Arc::new(HashingEmbedder::new(384).expect("embedder")), false)
        .expect("open")
}

#[test]
fn ingests_fixture_documents_and_reruns_idempotently() {
    let index_dir = tempfile::tempdir().expect("tempdir");
    let retriever = open_retriever(index_dir.path());
    let chunker = Chunker::new(1000, 200).expect("chunker");
    let paths = scan_dir(&docs_dir()).expect("scan");
    assert_eq!(paths.len(), 2);

    let first = ingest_paths(&retriever, &FileLoader, &chunker, &docs_dir(), &paths, 2, TS)
        .expect("ingest");
    assert_eq!(first.indexed(), 2);
    assert_eq!(first.failed(), 0);
    assert_eq!(first.chunks_before, 0);
    assert!(first.chunks_after >= 3);
    assert_eq!(
        retriever.index().sources(),
        vec!["access_policy.md".to_string(), "logging_standard.html".to_string()]
    );

    let second = ingest_paths(&retriever, &FileLoader, &chunker, &docs_dir(), &paths, 2, TS)
        .expect("reingest");
    assert_eq!(second.chunks_before, first.chunks_after);
    assert_eq!(second.chunks_after, first.chunks_after);
}

#[test]
fn bad_documents_are_isolated() {
    let docs = tempfile::tempdir().expect("tempdir");
    fs::copy(
        fixtures().join("docs").join("access_policy.md"),
        docs.path().join("access_policy.md"),
    )
    .expect("copy");
    fs::write(docs.path().join("broken.pdf"), b"this is not a pdf").expect("write");
    fs::write(docs.path().join("blank.txt"), b"  \n\n ").expect("write");

    let index_dir = tempfile::tempdir().expect("tempdir");
    let retriever = open_retriever(index_dir.path());
    let chunker = Chunker::new(1000, 200).expect("chunker");
    let paths = scan_dir(docs.path()).expect("scan");

    let report = ingest_paths(&retriever, &FileLoader, &chunker, docs.path(), &paths, 3, TS)
        .expect("ingest");
    assert_eq!(report.indexed(), 1);
    assert_eq!(report.empty(), 1);
    assert_eq!(report.failed(), 1);

    let broken = report
        .outcomes
        .iter()
        .find(|o| o.source_name == "broken.pdf")
        .expect("broken outcome");
    match &broken.status {
        IngestStatus::Failed { code, .. } => assert_eq!(code, "LOAD_FAILED"),
        other => panic!("unexpected status: {other:?}"),
    }
    assert_eq!(retriever.index().sources(), vec!["access_policy.md".to_string()]);
}

#[test]
fn changed_document_replaces_its_old_chunks() {
    let docs = tempfile::tempdir().expect("tempdir");
    let path = docs.path().join("retention.txt");
    fs::write(&path, "Backups are kept for 30 days.").expect("write");

    let index_dir = tempfile::tempdir().expect("tempdir");
    let retriever = open_retriever(index_dir.path());
    let chunker = Chunker::new(1000, 200).expect("chunker");
    ingest_paths(&retriever, &FileLoader, &chunker, docs.path(), &[path.clone()], 1, TS)
        .expect("ingest");

    fs::write(&path, "Backups are kept for 90 days.").expect("rewrite");
    ingest_paths(&retriever, &FileLoader, &chunker, docs.path(), &[path], 1, TS).expect("reingest");

    assert_eq!(retriever.index().len(), 1);
    let hits = retriever.retrieve("How long are backups kept?", 4).expect("retrieve");
    assert_eq!(hits[0].text, "Backups are kept for 90 days.");
}

#[test]
fn same_file_name_in_sibling_directories_keeps_both_documents() {
    let docs = tempfile::tempdir().expect("tempdir");
    for (vendor, text) in [
        ("vendor_a", "Okta enforces MFA for every employee login."),
        ("vendor_b", "Firewall rules are reviewed every quarter."),
    ] {
        fs::create_dir_all(docs.path().join(vendor)).expect("mkdir");
        fs::write(docs.path().join(vendor).join("policy.txt"), text).expect("write");
    }

    let index_dir = tempfile::tempdir().expect("tempdir");
    let retriever = open_retriever(index_dir.path());
    let chunker = Chunker::new(1000, 200).expect("chunker");
    let paths = scan_dir(docs.path()).expect("scan");

    let report = ingest_paths(&retriever, &FileLoader, &chunker, docs.path(), &paths, 2, TS)
        .expect("ingest");
    assert_eq!(report.indexed(), 2);
    assert_eq!(report.chunks_after, 2);
    assert_eq!(
        retriever.index().sources(),
        vec!["vendor_a/policy.txt".to_string(), "vendor_b/policy.txt".to_string()]
    );

    let hits = retriever.retrieve("Do you use MFA?", 1).expect("retrieve");
    assert_eq!(hits[0].source_name, "vendor_a/policy.txt");
    assert_eq!(hits[0].citation(), "vendor_a/policy.txt (Pg. 1)");
}

#[test]
fn paths_sharing_a_source_name_are_not_indexed_twice() {
    let a = tempfile::tempdir().expect("tempdir");
    let b = tempfile::tempdir().expect("tempdir");
    fs::write(a.path().join("policy.txt"), "Okta enforces MFA.").expect("write");
    fs::write(b.path().join("policy.txt"), "Firewall rules are reviewed.").expect("write");

    let index_dir = tempfile::tempdir().expect("tempdir");
    let retriever = open_retriever(index_dir.path());
    let chunker = Chunker::new(1000, 200).expect("chunker");
    let root = tempfile::tempdir().expect("tempdir");
    let paths = vec![a.path().join("policy.txt"), b.path().join("policy.txt")];

    let report = ingest_paths(&retriever, &FileLoader, &chunker, root.path(), &paths, 2, TS)
        .expect("ingest");
    assert_eq!(report.indexed(), 1);
    match &report.outcomes[1].status {
        IngestStatus::Failed { code, .. } => assert_eq!(code, "LOAD_DUPLICATE_SOURCE"),
        other => panic!("unexpected status: {other:?}"),
    }
    let hits = retriever.retrieve("Do you use MFA?", 4).expect("retrieve");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].text, "Okta enforces MFA.");
}

#[test]
fn blanked_document_drops_its_indexed_chunks() {
    let docs = tempfile::tempdir().expect("tempdir");
    let path = docs.path().join("retention.txt");
    fs::write(&path, "Backups are kept for 30 days.").expect("write");
    fs::write(docs.path().join("mfa.txt"), "MFA is required for VPN access.").expect("write");

    let index_dir = tempfile::tempdir().expect("tempdir");
    let retriever = open_retriever(index_dir.path());
    let chunker = Chunker::new(1000, 200).expect("chunker");
    let paths = scan_dir(docs.path()).expect("scan");
    ingest_paths(&retriever, &FileLoader, &chunker, docs.path(), &paths, 1, TS).expect("ingest");
    assert_eq!(retriever.index().len(), 2);

    fs::write(&path, " \n\n ").expect("blank");
    let report = ingest_paths(&retriever, &FileLoader, &chunker, docs.path(), &paths, 1, TS)
        .expect("reingest");
    assert_eq!(report.empty(), 1);
    assert_eq!(retriever.index().sources(), vec!["mfa.txt".to_string()]);
    assert_eq!(retriever.index().len(), 1);
}

#[test]
fn fixture_questionnaire_end_to_end_offline() {
    let index_dir = tempfile::tempdir().expect("tempdir");
    let retriever = open_retriever(index_dir.path());
    let chunker = Chunker::new(1000, 200).expect("chunker");
    let paths = scan_dir(&docs_dir()).expect("scan");
    ingest_paths(&retriever, &FileLoader, &chunker, &docs_dir(), &paths, 2, TS).expect("ingest");

    let policy = AnswerPolicyConfig {
        offline_status: OfflineStatus::SearchOnly,
        offline_answer: OfflineAnswer::Best,
    };
    let synth = Arc::new(AnswerSynthesizer::new(
        Arc::new(retriever),
        Box::new(EvidenceOnlyStrategy::new(&policy)),
        SynthesisSettings {
            top_k: 4,
            relevance_threshold: 0.25,
        },
    ));
    let sheet = read_questions(
        &fixtures().join("questionnaires").join("vendor_security.csv"),
        "Question",
    )
    .expect("questions");

    let out_dir = tempfile::tempdir().expect("tempdir");
    let out_path = out_dir.path().join("answers").join("vendor_security_answers.csv");
    let mut writer = CsvAnswerWriter::create(&out_path).expect("writer");
    let report = BatchRunner::new(synth, 2).run(&sheet, &mut writer).expect("run");
    drop(writer);

    assert_eq!(report.written, 3);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.search_only, 2);
    assert_eq!(report.review_required, 1);

    let mut rdr = csv::Reader::from_path(&out_path).expect("reader");
    let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.expect("row")).collect();
    assert_eq!(rows.len(), 3);

    assert_eq!(&rows[0][0], "Do you use MFA?");
    assert_eq!(&rows[0][2], ConfidenceStatus::AutoFilledSearchOnly.label());
    assert_eq!(&rows[0][3], "access_policy.md (Pg. 2)");
    assert!(rows[0][1].contains("Multi-factor authentication (MFA) is required"));

    assert_eq!(&rows[1][0], "Do you have ISO 27001 certification?");
    assert_eq!(&rows[1][2], "Review Required");
    assert_eq!(&rows[1][3], "No Source Found");

    assert_eq!(&rows[2][0], "How long are audit logs retained?");
    assert_eq!(&rows[2][3], "logging_standard.html (Pg. 1)");
}
