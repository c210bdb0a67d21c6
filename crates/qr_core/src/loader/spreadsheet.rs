use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};

use crate::error::AppError;

use super::LoadedSection;

/// One section per worksheet, labelled with the sheet name.
pub(super) fn load_workbook(
    source_name: &str,
    bytes: &[u8],
) -> Result<Vec<LoadedSection>, AppError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(|e| {
        AppError::new("LOAD_FAILED", "Failed to open spreadsheet")
            .with_details(format!("source={source_name}; err={e}"))
    })?;

    let mut sections = Vec::new();
    for sheet in workbook.sheet_names().to_vec() {
        let range = workbook.worksheet_range(&sheet).map_err(|e| {
            AppError::new("LOAD_FAILED", "Failed to read worksheet")
                .with_details(format!("source={source_name}; sheet={sheet}; err={e}"))
        })?;
        let lines: Vec<String> = range
            .rows()
            .map(render_row)
            .filter(|line| !line.is_empty())
            .collect();
        if lines.is_empty() {
            continue;
        }
        sections.push(LoadedSection {
            text: lines.join("\n"),
            location: sheet,
        });
    }
    Ok(sections)
}

fn render_row(row: &[Data]) -> String {
    let cells: Vec<String> = row
        .iter()
        .map(|c| match c {
            Data::Empty => String::new(),
            other => other.to_string().trim().to_string(),
        })
        .collect();
    if cells.iter().all(|c| c.is_empty()) {
        return String::new();
    }
    cells.join(" | ")
}

/// Header row plus string rows of the first worksheet; used for questionnaire input.
pub(crate) fn first_sheet_rows(bytes: &[u8]) -> Result<Vec<Vec<String>>, AppError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(|e| {
        AppError::new("QUESTIONNAIRE_READ_FAILED", "Failed to open questionnaire workbook")
            .with_details(e.to_string())
    })?;
    let first = workbook.sheet_names().first().cloned().ok_or_else(|| {
        AppError::new("QUESTIONNAIRE_READ_FAILED", "Questionnaire workbook has no sheets")
    })?;
    let range = workbook.worksheet_range(&first).map_err(|e| {
        AppError::new("QUESTIONNAIRE_READ_FAILED", "Failed to read questionnaire worksheet")
            .with_details(format!("sheet={first}; err={e}"))
    })?;
    Ok(range
        .rows()
        .map(|row| {
            row.iter()
                .map(|c| match c {
                    Data::Empty => String::new(),
                    other => other.to_string(),
                })
                .collect()
        })
        .collect())
}
