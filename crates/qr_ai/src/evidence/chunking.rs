use std::collections::VecDeque;

use qr_core::config::ChunkingConfig;
use qr_core::error::AppError;
use qr_core::loader::LoadedDocument;

use super::model::ChunkDraft;

const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " "];

/// Recursive character splitter with overlap. Sizes are counted in chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    max_chars: usize,
    overlap_chars: usize,
}

impl Chunker {
    pub fn new(max_chars: usize, overlap_chars: usize) -> Result<Self, AppError> {
        if max_chars == 0 || overlap_chars >= max_chars {
            return Err(AppError::new(
                "CONFIG_INVALID",
                "Chunk size must be positive and larger than the overlap",
            )
            .with_details(format!(
                "max_chars={max_chars}; overlap_chars={overlap_chars}"
            )));
        }
        Ok(Self {
            max_chars,
            overlap_chars,
        })
    }

    pub fn from_config(cfg: &ChunkingConfig) -> Result<Self, AppError> {
        Self::new(cfg.max_chars, cfg.overlap_chars)
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn overlap_chars(&self) -> usize {
        self.overlap_chars
    }

    /// Chunk every section independently; ordinals run across the whole document.
    pub fn chunk_document(&self, doc: &LoadedDocument) -> Vec<ChunkDraft> {
        let mut out = Vec::new();
        let mut ordinal: u32 = 0;
        for section in &doc.sections {
            for text in self.split_text(&section.text) {
                out.push(ChunkDraft {
                    ordinal,
                    text,
                    source_name: doc.source_name.clone(),
                    location: section.location.clone(),
                });
                ordinal += 1;
            }
        }
        out
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
        let mut pieces = Vec::new();
        self.split_pieces(&normalized, SEPARATORS, &mut pieces);
        self.merge(pieces)
    }

    fn split_pieces(&self, text: &str, separators: &[&str], out: &mut Vec<String>) {
        if char_len(text) <= self.max_chars {
            if !text.is_empty() {
                out.push(text.to_string());
            }
            return;
        }
        let Some((sep, rest)) = separators.split_first() else {
            hard_cut(text, self.max_chars, out);
            return;
        };
        for piece in split_keep_separator(text, sep) {
            self.split_pieces(piece, rest, out);
        }
    }

    fn merge(&self, pieces: Vec<String>) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(String, usize)> = VecDeque::new();
        let mut window_len = 0usize;

        for piece in pieces {
            let len = char_len(&piece);
            if window_len + len > self.max_chars && !window.is_empty() {
                push_chunk(&window, &mut chunks);
                // Keep a tail of at most `overlap_chars` that still leaves room for `piece`.
                while window_len > self.overlap_chars
                    || (window_len + len > self.max_chars && window_len > 0)
                {
                    match window.pop_front() {
                        Some((_, l)) => window_len -= l,
                        None => break,
                    }
                }
            }
            window_len += len;
            window.push_back((piece, len));
        }
        if !window.is_empty() {
            push_chunk(&window, &mut chunks);
        }
        chunks
    }
}

fn push_chunk(window: &VecDeque<(String, usize)>, chunks: &mut Vec<String>) {
    let joined: String = window.iter().map(|(p, _)| p.as_str()).collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        return;
    }
    // An overlap tail that is all the next chunk contains would otherwise repeat.
    if chunks.last().map(|c: &String| c.as_str()) == Some(trimmed) {
        return;
    }
    chunks.push(trimmed.to_string());
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split after each occurrence of `sep`, so the separator stays with the preceding piece.
fn split_keep_separator<'a>(text: &'a str, sep: &str) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(sep) {
        let end = idx + sep.len();
        out.push(&text[start..end]);
        start = end;
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

fn hard_cut(text: &str, max_chars: usize, out: &mut Vec<String>) {
    let chars: Vec<char> = text.chars().collect();
    for window in chars.chunks(max_chars) {
        out.push(window.iter().collect());
    }
}
