pub mod chunking;
pub mod index;
pub mod ingest;
pub mod model;

pub use chunking::Chunker;
pub use index::{IndexStatus, VectorIndex};
pub use ingest::{ingest_documents, ingest_paths, IngestOutcome, IngestReport, IngestStatus};
pub use model::{chunk_fingerprint, ChunkDraft, EmbeddedChunk, EvidenceHit, StoredChunk};
