//! Questionnaire input (CSV/XLSX with a header row) and answered-row output.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{Answer, QuestionRow, SkippedRow};
use crate::error::AppError;
use crate::loader::first_sheet_rows;

pub const OUTPUT_HEADERS: [&str; 4] = ["Question", "AI Response", "Status", "Evidence"];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionSheet {
    pub questions: Vec<QuestionRow>,
    pub skipped: Vec<SkippedRow>,
}

/// Read questions from `path`, choosing the parser by extension.
pub fn read_questions(path: &Path, column: &str) -> Result<QuestionSheet, AppError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => {
            let file = File::open(path).map_err(|e| {
                AppError::new("QUESTIONNAIRE_READ_FAILED", "Failed to open questionnaire")
                    .with_details(format!("path={}; err={}", path.display(), e))
            })?;
            read_questions_csv(file, column)
        }
        "xlsx" | "xlsm" | "xls" | "ods" => {
            let bytes = fs::read(path).map_err(|e| {
                AppError::new("QUESTIONNAIRE_READ_FAILED", "Failed to read questionnaire")
                    .with_details(format!("path={}; err={}", path.display(), e))
            })?;
            read_questions_xlsx(&bytes, column)
        }
        _ => Err(AppError::new(
            "QUESTIONNAIRE_UNSUPPORTED",
            "Questionnaire must be a CSV or Excel file",
        )
        .with_details(format!("path={}", path.display()))),
    }
}

pub fn read_questions_csv<R: Read>(reader: R, column: &str) -> Result<QuestionSheet, AppError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| {
            AppError::new("QUESTIONNAIRE_READ_FAILED", "Failed to read questionnaire header")
                .with_details(e.to_string())
        })?
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for (i, rec) in rdr.records().enumerate() {
        let rec = rec.map_err(|e| {
            AppError::new("QUESTIONNAIRE_READ_FAILED", "Failed to parse questionnaire row")
                .with_details(format!("row={}; err={}", i + 1, e))
        })?;
        rows.push(rec.iter().map(|c| c.to_string()).collect::<Vec<_>>());
    }
    collect_questions(&headers, rows, column)
}

pub fn read_questions_xlsx(bytes: &[u8], column: &str) -> Result<QuestionSheet, AppError> {
    let mut rows = first_sheet_rows(bytes)?.into_iter();
    let headers = rows.next().ok_or_else(|| {
        AppError::new("QUESTIONNAIRE_EMPTY", "Questionnaire worksheet has no header row")
    })?;
    collect_questions(&headers, rows.collect(), column)
}

fn collect_questions(
    headers: &[String],
    rows: Vec<Vec<String>>,
    column: &str,
) -> Result<QuestionSheet, AppError> {
    let wanted = column.trim();
    let idx = headers
        .iter()
        .position(|h| {
            h.trim_start_matches('\u{feff}')
                .trim()
                .eq_ignore_ascii_case(wanted)
        })
        .ok_or_else(|| {
            AppError::new(
                "QUESTIONNAIRE_COLUMN_MISSING",
                format!("Question column '{wanted}' not found"),
            )
            .with_details(format!("headers={}", headers.join(",")))
        })?;

    let mut sheet = QuestionSheet::default();
    for (i, row) in rows.into_iter().enumerate() {
        let row_no = i + 1;
        let text = row.get(idx).map(|c| c.trim()).unwrap_or("");
        if text.is_empty() {
            sheet.skipped.push(SkippedRow {
                row: row_no,
                reason: "blank question cell".to_string(),
            });
            continue;
        }
        sheet.questions.push(QuestionRow {
            row: row_no,
            text: text.to_string(),
        });
    }
    Ok(sheet)
}

/// Destination for answered rows. Each call writes one whole row.
pub trait AnswerSink {
    fn write_answer(&mut self, answer: &Answer) -> Result<(), AppError>;
}

impl AnswerSink for Vec<Answer> {
    fn write_answer(&mut self, answer: &Answer) -> Result<(), AppError> {
        self.push(answer.clone());
        Ok(())
    }
}

/// CSV output with the fixed `Question, AI Response, Status, Evidence` header.
/// Rows are flushed as they are written so a crash leaves a valid prefix.
pub struct CsvAnswerWriter<W: Write> {
    inner: csv::Writer<W>,
}

impl CsvAnswerWriter<File> {
    pub fn create(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::new("QUESTIONNAIRE_WRITE_FAILED", "Failed to create output directory")
                    .with_details(format!("path={}; err={}", parent.display(), e))
            })?;
        }
        let file = File::create(path).map_err(|e| {
            AppError::new("QUESTIONNAIRE_WRITE_FAILED", "Failed to create output file")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        Self::new(file)
    }
}

impl<W: Write> CsvAnswerWriter<W> {
    pub fn new(writer: W) -> Result<Self, AppError> {
        let mut inner = csv::Writer::from_writer(writer);
        inner.write_record(OUTPUT_HEADERS).map_err(write_err)?;
        inner.flush().map_err(|e| write_err(e.into()))?;
        Ok(Self { inner })
    }

    pub fn into_inner(self) -> Result<W, AppError> {
        self.inner.into_inner().map_err(|e| {
            AppError::new("QUESTIONNAIRE_WRITE_FAILED", "Failed to finish output")
                .with_details(e.to_string())
        })
    }
}

impl<W: Write> AnswerSink for CsvAnswerWriter<W> {
    fn write_answer(&mut self, answer: &Answer) -> Result<(), AppError> {
        let evidence = answer.evidence_cell();
        self.inner
            .write_record([
                answer.question(),
                answer.answer_text(),
                answer.confidence_status().label(),
                evidence.as_str(),
            ])
            .map_err(write_err)?;
        self.inner.flush().map_err(|e| write_err(e.into()))
    }
}

fn write_err(e: csv::Error) -> AppError {
    AppError::new("QUESTIONNAIRE_WRITE_FAILED", "Failed to write answer row")
        .with_details(e.to_string())
}
