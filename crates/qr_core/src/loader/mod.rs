//! Document loader boundary: bytes of a supported file type in, `(text, location)`
//! sections out. Everything format-specific lives behind [`DocumentLoader`] so the
//! retrieval pipeline never parses binary formats itself.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::AppError;

mod docx;
mod html;
mod pdf;
mod spreadsheet;
mod text;

pub(crate) use spreadsheet::first_sheet_rows;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Pdf,
    Spreadsheet,
    Csv,
    WordDocument,
    PlainText,
    Markdown,
    WebPage,
}

impl DocumentKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "xlsx" | "xlsm" | "xls" | "ods" => Some(Self::Spreadsheet),
            "csv" => Some(Self::Csv),
            "docx" => Some(Self::WordDocument),
            "txt" | "text" => Some(Self::PlainText),
            "md" | "markdown" => Some(Self::Markdown),
            "html" | "htm" => Some(Self::WebPage),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// A span of document text and the page/section label it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadedSection {
    pub text: String,
    pub location: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadedDocument {
    pub source_name: String,
    pub kind: DocumentKind,
    pub sections: Vec<LoadedSection>,
}

impl LoadedDocument {
    /// True when no section carries any non-whitespace text.
    pub fn is_blank(&self) -> bool {
        self.sections.iter().all(|s| s.text.trim().is_empty())
    }
}

pub trait DocumentLoader: Send + Sync {
    fn load(
        &self,
        source_name: &str,
        kind: DocumentKind,
        bytes: &[u8],
    ) -> Result<LoadedDocument, AppError>;
}

/// Default loader covering every [`DocumentKind`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl DocumentLoader for FileLoader {
    fn load(
        &self,
        source_name: &str,
        kind: DocumentKind,
        bytes: &[u8],
    ) -> Result<LoadedDocument, AppError> {
        let sections = match kind {
            DocumentKind::Pdf => pdf::load_pdf(source_name, bytes)?,
            DocumentKind::Spreadsheet => spreadsheet::load_workbook(source_name, bytes)?,
            DocumentKind::Csv => text::load_csv(source_name, bytes)?,
            DocumentKind::WordDocument => docx::load_docx(source_name, bytes)?,
            DocumentKind::PlainText | DocumentKind::Markdown => text::load_paged_text(bytes),
            DocumentKind::WebPage => html::load_html(source_name, bytes)?,
        };
        Ok(LoadedDocument {
            source_name: source_name.to_string(),
            kind,
            sections,
        })
    }
}

/// Display name recorded on chunks and rendered in citations: the file name.
pub fn source_name_for(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Source name for a file found by [`scan_dir`] under `root`: the relative path joined
/// with `/`, so same-named files in sibling directories stay distinct. Top-level files
/// keep their bare file name. Paths outside `root` fall back to [`source_name_for`].
pub fn source_name_under(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join("/"),
        _ => source_name_for(path),
    }
}

/// Read a file and hand it to `loader`, inferring the kind from the extension.
pub fn load_path(loader: &dyn DocumentLoader, path: &Path) -> Result<LoadedDocument, AppError> {
    load_path_as(loader, path, &source_name_for(path))
}

/// [`load_path`] with an explicit source name.
pub fn load_path_as(
    loader: &dyn DocumentLoader,
    path: &Path,
    source_name: &str,
) -> Result<LoadedDocument, AppError> {
    let kind = DocumentKind::from_path(path).ok_or_else(|| {
        AppError::new("LOAD_UNSUPPORTED", "Unsupported document type")
            .with_details(format!("path={}", path.display()))
    })?;
    let bytes = fs::read(path).map_err(|e| {
        AppError::new("LOAD_FAILED", "Failed to read document")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    loader.load(source_name, kind, &bytes)
}

/// Supported files under `dir`, recursively, sorted by path for deterministic ingestion.
pub fn scan_dir(dir: &Path) -> Result<Vec<PathBuf>, AppError> {
    if !dir.is_dir() {
        return Err(AppError::new("LOAD_FAILED", "Document directory not found")
            .with_details(format!("path={}", dir.display())));
    }
    let mut out = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(|e| {
            AppError::new("LOAD_FAILED", "Failed to scan document directory")
                .with_details(format!("path={}; err={}", dir.display(), e))
        })?;
        let path = entry.path();
        if entry.file_type().is_file() && DocumentKind::from_path(path).is_some() {
            out.push(path.to_path_buf());
        }
    }
    out.sort();
    Ok(out)
}

pub(crate) fn decode_utf8_lossy(bytes: &[u8]) -> String {
    let s = String::from_utf8_lossy(bytes);
    let s = s.strip_prefix('\u{feff}').unwrap_or(&s);
    s.replace("\r\n", "\n").replace('\r', "\n")
}
