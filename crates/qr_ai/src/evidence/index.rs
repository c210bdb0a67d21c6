use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use qr_core::error::AppError;
use serde::{Deserialize, Serialize};

use super::model::{chunk_fingerprint, EmbeddedChunk, EvidenceHit, StoredChunk};
use crate::retrieve::similarity::{cosine_similarity, l2_norm};

pub const METRIC_COSINE: &str = "cosine";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexStatus {
    pub embedder: Option<String>,
    pub metric: String,
    pub dims: Option<usize>,
    pub chunk_count: usize,
    pub source_count: usize,
    #[serde(default)]
    pub next_seq: u64,
    pub updated_at: Option<String>,
}

impl IndexStatus {
    fn empty(embedder: &str) -> Self {
        Self {
            embedder: Some(embedder.to_string()),
            metric: METRIC_COSINE.to_string(),
            dims: None,
            chunk_count: 0,
            source_count: 0,
            next_seq: 0,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone)]
struct IndexState {
    status: IndexStatus,
    chunks: BTreeMap<String, StoredChunk>,
}

impl IndexState {
    fn refresh_counts(&mut self) {
        self.status.chunk_count = self.chunks.len();
        self.status.source_count = self
            .chunks
            .values()
            .map(|c| c.source_name.as_str())
            .collect::<BTreeSet<_>>()
            .len();
        if self.chunks.is_empty() {
            self.status.dims = None;
        }
    }

    /// Overwrites keep the original `seq`; new fingerprints take the next one.
    fn insert(&mut self, chunk: EmbeddedChunk) -> bool {
        let id = chunk_fingerprint(&chunk.draft.source_name, &chunk.draft.text);
        let seq = match self.chunks.get(&id) {
            Some(existing) => existing.seq,
            None => {
                let s = self.status.next_seq;
                self.status.next_seq += 1;
                s
            }
        };
        let is_new = !self.chunks.contains_key(&id);
        self.chunks.insert(
            id.clone(),
            StoredChunk {
                id,
                seq,
                text: chunk.draft.text,
                source_name: chunk.draft.source_name,
                location: chunk.draft.location,
                vector: chunk.vector,
            },
        );
        is_new
    }
}

/// Directory-backed vector store with brute-force cosine search.
///
/// Layout: `<root>/index/index_status.json` and `<root>/index/index_chunks.json`,
/// each replaced atomically. Every write path holds the write lock across both the
/// in-memory mutation and persistence.
#[derive(Debug)]
pub struct VectorIndex {
    root: PathBuf,
    embedder_id: String,
    state: RwLock<IndexState>,
}

impl VectorIndex {
    /// Open (or create) the index at `root` for vectors produced by `embedder_id`.
    /// With `rebuild`, existing contents are discarded unread.
    pub fn open(root: &Path, embedder_id: &str, rebuild: bool) -> Result<Self, AppError> {
        let index = Self {
            root: root.to_path_buf(),
            embedder_id: embedder_id.to_string(),
            state: RwLock::new(IndexState {
                status: IndexStatus::empty(embedder_id),
                chunks: BTreeMap::new(),
            }),
        };
        index.ensure_dirs()?;

        if rebuild {
            index.clear()?;
            tracing::info!(path = %index.index_dir().display(), "index cleared for rebuild");
            return Ok(index);
        }

        let Some(loaded) = index.read_state()? else {
            return Ok(index);
        };
        if !loaded.chunks.is_empty() && loaded.status.embedder.as_deref() != Some(embedder_id) {
            return Err(AppError::new(
                "INDEX_EMBEDDER_MISMATCH",
                "Index was built with a different embedder; rebuild the index",
            )
            .with_details(format!(
                "index_embedder={}; configured_embedder={embedder_id}",
                loaded.status.embedder.as_deref().unwrap_or("unknown")
            )));
        }
        tracing::debug!(
            chunks = loaded.chunks.len(),
            embedder = embedder_id,
            "index opened"
        );
        let mut state = loaded;
        state.status.embedder = Some(embedder_id.to_string());
        *index.state.write() = state;
        Ok(index)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn embedder_id(&self) -> &str {
        &self.embedder_id
    }

    fn index_dir(&self) -> PathBuf {
        self.root.join("index")
    }

    fn status_path(&self) -> PathBuf {
        self.index_dir().join("index_status.json")
    }

    fn chunks_path(&self) -> PathBuf {
        self.index_dir().join("index_chunks.json")
    }

    fn ensure_dirs(&self) -> Result<(), AppError> {
        fs::create_dir_all(self.index_dir()).map_err(|e| {
            AppError::new("INDEX_WRITE_FAILED", "Failed to create index directory")
                .with_details(format!("path={}; err={}", self.index_dir().display(), e))
        })
    }

    fn read_state(&self) -> Result<Option<IndexState>, AppError> {
        let status_path = self.status_path();
        if !status_path.exists() {
            return Ok(None);
        }
        let status: IndexStatus = read_json(&status_path)?;
        if status.metric != METRIC_COSINE {
            return Err(AppError::new("INDEX_CORRUPT", "Index metric is not supported")
                .with_details(format!("metric={}", status.metric)));
        }

        let chunks_path = self.chunks_path();
        let list: Vec<StoredChunk> = if chunks_path.exists() {
            read_json(&chunks_path)?
        } else if status.chunk_count == 0 {
            Vec::new()
        } else {
            return Err(AppError::new("INDEX_CORRUPT", "Index chunks file is missing")
                .with_details(format!("path={}", chunks_path.display())));
        };

        let mut chunks = BTreeMap::new();
        for c in list {
            if status.dims.is_some_and(|d| d != c.vector.len()) {
                return Err(AppError::new("INDEX_CORRUPT", "Stored vector has wrong dimension")
                    .with_details(format!(
                        "chunk_id={}; expected={:?}; got={}",
                        c.id,
                        status.dims,
                        c.vector.len()
                    )));
            }
            chunks.insert(c.id.clone(), c);
        }
        let mut state = IndexState { status, chunks };
        let max_seq = state.chunks.values().map(|c| c.seq + 1).max().unwrap_or(0);
        state.status.next_seq = state.status.next_seq.max(max_seq);
        state.refresh_counts();
        Ok(Some(state))
    }

    fn persist(&self, state: &IndexState) -> Result<(), AppError> {
        self.ensure_dirs()?;
        let mut list: Vec<&StoredChunk> = state.chunks.values().collect();
        list.sort_by_key(|c| c.seq);
        write_json_atomic(&self.chunks_path(), &list)?;
        write_json_atomic(&self.status_path(), &state.status)
    }

    fn check_dims(&self, state: &IndexState, chunks: &[EmbeddedChunk]) -> Result<Option<usize>, AppError> {
        let mut dims = state.status.dims;
        for c in chunks {
            let got = c.vector.len();
            if got == 0 {
                return Err(AppError::new("INDEX_DIMENSION_MISMATCH", "Empty embedding vector")
                    .with_details(format!("source={}", c.draft.source_name)));
            }
            let current = dims;
            match current {
                Some(d) if d != got => {
                    return Err(AppError::new(
                        "INDEX_DIMENSION_MISMATCH",
                        "Embedding dimension does not match the index",
                    )
                    .with_details(format!(
                        "expected={d}; got={got}; source={}",
                        c.draft.source_name
                    )));
                }
                Some(_) => {}
                None => dims = Some(got),
            }
        }
        Ok(dims)
    }

    /// Insert or overwrite chunks by fingerprint. Returns the number of new chunks.
    pub fn upsert(&self, chunks: Vec<EmbeddedChunk>, updated_at: &str) -> Result<usize, AppError> {
        let mut guard = self.state.write();
        let mut next = guard.clone();
        next.status.dims = self.check_dims(&next, &chunks)?;

        let mut added = 0usize;
        for c in chunks {
            if next.insert(c) {
                added += 1;
            }
        }
        next.refresh_counts();
        next.status.updated_at = Some(updated_at.to_string());
        self.persist(&next)?;
        *guard = next;
        Ok(added)
    }

    /// Replace every chunk of `source_name` with `chunks`. Returns the resulting chunk count
    /// for that source.
    pub fn replace_source(
        &self,
        source_name: &str,
        chunks: Vec<EmbeddedChunk>,
        updated_at: &str,
    ) -> Result<usize, AppError> {
        if let Some(c) = chunks.iter().find(|c| c.draft.source_name != source_name) {
            return Err(AppError::new(
                "INDEX_WRITE_FAILED",
                "Chunk does not belong to the source being replaced",
            )
            .with_details(format!(
                "source={source_name}; chunk_source={}",
                c.draft.source_name
            )));
        }

        let mut guard = self.state.write();
        let mut next = guard.clone();

        let keep: BTreeSet<String> = chunks
            .iter()
            .map(|c| chunk_fingerprint(&c.draft.source_name, &c.draft.text))
            .collect();
        let before = next.chunks.len();
        next.chunks
            .retain(|id, c| c.source_name != source_name || keep.contains(id));
        let removed = before - next.chunks.len();
        if next.chunks.is_empty() {
            next.status.dims = None;
        }
        next.status.dims = self.check_dims(&next, &chunks)?;

        for c in chunks {
            next.insert(c);
        }
        next.refresh_counts();
        next.status.updated_at = Some(updated_at.to_string());
        self.persist(&next)?;

        let count = next
            .chunks
            .values()
            .filter(|c| c.source_name == source_name)
            .count();
        if removed > 0 {
            tracing::debug!(source = source_name, removed, "removed stale chunks");
        }
        *guard = next;
        Ok(count)
    }

    /// Top `k` chunks by cosine similarity, ties by insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<EvidenceHit>, AppError> {
        let guard = self.state.read();
        if guard.chunks.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if let Some(d) = guard.status.dims {
            if d != query.len() {
                return Err(AppError::new(
                    "INDEX_DIMENSION_MISMATCH",
                    "Query embedding dimension does not match the index",
                )
                .with_details(format!("index_dims={d}; query_dims={}", query.len())));
            }
        }
        let qnorm = l2_norm(query);
        if qnorm == 0.0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(&StoredChunk, f32)> = Vec::with_capacity(guard.chunks.len());
        for c in guard.chunks.values() {
            let vnorm = l2_norm(&c.vector);
            if vnorm == 0.0 {
                continue;
            }
            scored.push((c, cosine_similarity(query, &c.vector, qnorm, vnorm)));
        }
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.seq.cmp(&b.0.seq))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(c, score)| EvidenceHit {
                chunk_id: c.id.clone(),
                text: c.text.clone(),
                source_name: c.source_name.clone(),
                location: c.location.clone(),
                similarity_score: score,
            })
            .collect())
    }

    pub fn clear(&self) -> Result<(), AppError> {
        let mut guard = self.state.write();
        let next = IndexState {
            status: IndexStatus::empty(&self.embedder_id),
            chunks: BTreeMap::new(),
        };
        self.persist(&next)?;
        *guard = next;
        Ok(())
    }

    pub fn status(&self) -> IndexStatus {
        self.state.read().status.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().chunks.is_empty()
    }

    pub fn sources(&self) -> Vec<String> {
        self.state
            .read()
            .chunks
            .values()
            .map(|c| c.source_name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn dims(&self) -> Option<usize> {
        self.state.read().status.dims
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let bytes = fs::read(path).map_err(|e| {
        AppError::new("INDEX_CORRUPT", "Failed to read index file")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    serde_json::from_slice(&bytes).map_err(|e| {
        AppError::new("INDEX_CORRUPT", "Failed to decode index file")
            .with_details(format!("path={}; err={}", path.display(), e))
    })
}

fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), AppError> {
    let tmp = path.with_extension("tmp");
    let json = serde_json::to_vec(value).map_err(|e| {
        AppError::new("INDEX_WRITE_FAILED", "Failed to encode index file")
            .with_details(e.to_string())
    })?;
    fs::write(&tmp, &json).map_err(|e| {
        AppError::new("INDEX_WRITE_FAILED", "Failed to write index file")
            .with_details(format!("path={}; err={}", tmp.display(), e))
    })?;
    fs::rename(&tmp, path).map_err(|e| {
        AppError::new("INDEX_WRITE_FAILED", "Failed to finalize index file write")
            .with_details(format!("tmp={}; dest={}; err={}", tmp.display(), path.display(), e))
    })
}
