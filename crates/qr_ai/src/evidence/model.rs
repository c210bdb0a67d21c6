use qr_core::domain::format_citation;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A chunk candidate before embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkDraft {
    pub ordinal: u32,
    pub text: String,
    pub source_name: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChunk {
    pub draft: ChunkDraft,
    pub vector: Vec<f32>,
}

/// A chunk as persisted by the index. `seq` is the insertion order, kept across overwrites.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredChunk {
    pub id: String,
    pub seq: u64,
    pub text: String,
    pub source_name: String,
    pub location: String,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceHit {
    pub chunk_id: String,
    pub text: String,
    pub source_name: String,
    pub location: String,
    pub similarity_score: f32,
}

impl EvidenceHit {
    pub fn citation(&self) -> String {
        format_citation(&self.source_name, &self.location)
    }
}

/// Hex SHA-256 over `source_name` and chunk text.
pub fn chunk_fingerprint(source_name: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_name.as_bytes());
    hasher.update(b"\n");
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
