use qr_core::error::AppError;
use sha2::{Digest, Sha256};

use super::Embedder;
use crate::retrieve::similarity::l2_norm;

pub const HASHING_MODEL: &str = "hashing-v1";

const STOPWORDS: &[&str] = &[
    "a", "all", "an", "and", "any", "are", "as", "at", "be", "by", "can", "do", "does", "for",
    "from", "has", "have", "how", "i", "if", "in", "is", "it", "its", "of", "on", "or", "our",
    "please", "provide", "that", "the", "their", "this", "to", "us", "use", "used", "uses",
    "using", "was", "we", "what", "when", "where", "which", "who", "will", "with", "you", "your",
];

/// Deterministic offline embedder: feature hashing of lowercase word tokens into
/// non-negative term counts, L2-normalized. Colliding tokens only ever add, so a
/// shared content word always yields a positive score.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Result<Self, AppError> {
        if dims == 0 {
            return Err(AppError::new(
                "CONFIG_INVALID",
                "Hashing embedder dimension must be positive",
            ));
        }
        Ok(Self { dims })
    }

    pub fn dims(&self) -> usize {
        self.dims
    }
}

pub(crate) fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
}

impl Embedder for HashingEmbedder {
    fn id(&self) -> String {
        format!("hashing:{HASHING_MODEL}:{}", self.dims)
    }

    fn embed(&self, input: &str) -> Result<Vec<f32>, AppError> {
        let mut v = vec![0.0f32; self.dims];
        for token in tokenize(input) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let idx = (u64::from_le_bytes(bucket) % self.dims as u64) as usize;
            v[idx] += 1.0;
        }

        let norm = l2_norm(&v);
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        Ok(v)
    }
}
