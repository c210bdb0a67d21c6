use lopdf::Document;

use crate::error::AppError;

use super::LoadedSection;

/// One section per page, labelled with the 1-based page number.
pub(super) fn load_pdf(source_name: &str, bytes: &[u8]) -> Result<Vec<LoadedSection>, AppError> {
    let doc = Document::load_mem(bytes).map_err(|e| {
        AppError::new("LOAD_FAILED", "Failed to open PDF")
            .with_details(format!("source={source_name}; err={e}"))
    })?;
    if doc.is_encrypted() {
        return Err(AppError::new("LOAD_FAILED", "PDF is encrypted")
            .with_details(format!("source={source_name}")));
    }

    let mut sections = Vec::new();
    // get_pages is a BTreeMap keyed by page number, so iteration is in page order.
    for page_number in doc.get_pages().keys().copied() {
        match doc.extract_text(&[page_number]) {
            Ok(text) if !text.trim().is_empty() => sections.push(LoadedSection {
                text: text.replace("\r\n", "\n"),
                location: page_number.to_string(),
            }),
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(source = source_name, page = page_number, error = %e, "skipping unreadable PDF page");
            }
        }
    }
    Ok(sections)
}
