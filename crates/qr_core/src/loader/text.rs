use crate::error::AppError;

use super::{decode_utf8_lossy, LoadedSection};

/// Plain text and Markdown. A form feed starts a new page; pages are numbered from 1
/// and blank pages keep their number so later pages stay addressable.
pub(super) fn load_paged_text(bytes: &[u8]) -> Vec<LoadedSection> {
    let text = decode_utf8_lossy(bytes);
    text.split('\u{000c}')
        .enumerate()
        .filter(|(_, page)| !page.trim().is_empty())
        .map(|(i, page)| LoadedSection {
            text: page.to_string(),
            location: (i + 1).to_string(),
        })
        .collect()
}

/// CSV documents become one section of `cell | cell` lines, header first.
pub(super) fn load_csv(source_name: &str, bytes: &[u8]) -> Result<Vec<LoadedSection>, AppError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut lines = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| {
            AppError::new("LOAD_FAILED", "Failed to parse CSV document")
                .with_details(format!("source={source_name}; record={}; err={e}", i + 1))
        })?;
        let cells: Vec<&str> = record.iter().map(|c| c.trim()).collect();
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        lines.push(cells.join(" | "));
    }

    if lines.is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![LoadedSection {
        text: lines.join("\n"),
        location: "1".to_string(),
    }])
}
