use std::path::Path;
use std::sync::Arc;

use qr_core::error::AppError;

use crate::embeddings::Embedder;
use crate::evidence::{EvidenceHit, VectorIndex};

pub mod similarity;

pub const MAX_TOP_K: usize = 50;

/// The index together with the embedder that produced its vectors. Questions are
/// always embedded with the same instance that embedded the chunks.
pub struct Retriever {
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("index", &self.index.root())
            .field("embedder", &self.embedder.id())
            .finish()
    }
}

impl Retriever {
    pub fn open(
        index_dir: &Path,
        embedder: Arc<dyn Embedder>,
        rebuild: bool,
    ) -> Result<Self, AppError> {
        let index = VectorIndex::open(index_dir, &embedder.id(), rebuild)?;
        Ok(Self { index, embedder })
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Ranked evidence for `question`. Scores are returned unmodified.
    pub fn retrieve(&self, question: &str, k: usize) -> Result<Vec<EvidenceHit>, AppError> {
        let q = question.trim();
        if q.is_empty() {
            return Err(AppError::new(
                "RETRIEVAL_QUERY_EMPTY",
                "Question must not be empty",
            ));
        }
        let k = k.clamp(1, MAX_TOP_K);

        if self.index.is_empty() {
            tracing::debug!("index is empty; no evidence");
            return Ok(Vec::new());
        }

        let qv = self.embedder.embed(q)?;
        if similarity::l2_norm(&qv) == 0.0 {
            tracing::debug!(question = q, "query embedding has zero norm; no evidence");
            return Ok(Vec::new());
        }
        let hits = self.index.search(&qv, k)?;
        tracing::debug!(
            question = q,
            hits = hits.len(),
            top_score = hits.first().map(|h| h.similarity_score),
            "retrieved evidence"
        );
        Ok(hits)
    }
}
