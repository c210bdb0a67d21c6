//! Human-verified answers. Entries live in SQLite and are snapshotted into an
//! in-memory [`AnswerBank`] that query-time workers share read-only.

use std::collections::HashMap;
use std::io::Read;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::domain::SkippedRow;
use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerBankEntry {
    pub id: i64,
    pub question: String,
    pub answer: String,
    pub product: Option<String>,
    pub verified_by: String,
    pub date_added: String,
}

impl AnswerBankEntry {
    /// Citation rendered in the Evidence column for a verified answer.
    pub fn citation(&self) -> String {
        format!(
            "Answer Bank (verified by {}, {})",
            self.verified_by, self.date_added
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewAnswerBankEntry {
    pub question: String,
    pub answer: String,
    pub product: Option<String>,
    pub verified_by: String,
    pub date_added: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerBankImportSummary {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: Vec<SkippedRow>,
}

/// Lowercase, collapse whitespace, strip trailing punctuation.
pub fn normalize_question(question: &str) -> String {
    let collapsed = question
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    collapsed
        .trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_string()
}

/// Insert or replace the entry for `(normalized question, product)`.
/// Returns true when a new row was inserted.
pub fn upsert_entry(conn: &Connection, entry: &NewAnswerBankEntry) -> Result<bool, AppError> {
    let key = normalize_question(&entry.question);
    if key.is_empty() || entry.answer.trim().is_empty() {
        return Err(AppError::new(
            "ANSWER_BANK_INVALID_ENTRY",
            "Answer bank entries need a question and an answer",
        )
        .with_details(format!("question={}", entry.question)));
    }
    let product = entry.product.clone().unwrap_or_default();

    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM answer_bank WHERE question_key = ?1 AND product = ?2",
            params![key, product],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| {
            AppError::new("ANSWER_BANK_QUERY_FAILED", "Failed to look up answer bank entry")
                .with_details(e.to_string())
        })?;

    match existing {
        Some(id) => {
            conn.execute(
                "UPDATE answer_bank SET question = ?1, answer = ?2, verified_by = ?3, date_added = ?4 WHERE id = ?5",
                params![
                    entry.question.trim(),
                    entry.answer.trim(),
                    entry.verified_by,
                    entry.date_added,
                    id
                ],
            )
            .map_err(|e| {
                AppError::new("ANSWER_BANK_WRITE_FAILED", "Failed to update answer bank entry")
                    .with_details(e.to_string())
            })?;
            Ok(false)
        }
        None => {
            conn.execute(
                "INSERT INTO answer_bank(question, question_key, answer, product, verified_by, date_added) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entry.question.trim(),
                    key,
                    entry.answer.trim(),
                    product,
                    entry.verified_by,
                    entry.date_added
                ],
            )
            .map_err(|e| {
                AppError::new("ANSWER_BANK_WRITE_FAILED", "Failed to insert answer bank entry")
                    .with_details(e.to_string())
            })?;
            Ok(true)
        }
    }
}

fn column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
}

/// Import verified answers from CSV with headers `question, answer` and optional
/// `product, verified_by, date_added`. Rows missing a question or answer are skipped.
pub fn import_csv<R: Read>(
    conn: &mut Connection,
    reader: R,
    default_date: &str,
) -> Result<AnswerBankImportSummary, AppError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let headers = rdr.headers().cloned().map_err(|e| {
        AppError::new("ANSWER_BANK_IMPORT_FAILED", "Failed to read answer bank CSV header")
            .with_details(e.to_string())
    })?;
    let (Some(q_idx), Some(a_idx)) = (column(&headers, "question"), column(&headers, "answer"))
    else {
        return Err(AppError::new(
            "ANSWER_BANK_IMPORT_FAILED",
            "Answer bank CSV needs 'question' and 'answer' columns",
        )
        .with_details(format!("headers={}", headers.iter().collect::<Vec<_>>().join(","))));
    };
    let product_idx = column(&headers, "product");
    let verified_idx = column(&headers, "verified_by");
    let date_idx = column(&headers, "date_added");

    let tx = conn.transaction().map_err(|e| {
        AppError::new("DB_TX_FAILED", "Failed to start answer bank import")
            .with_details(e.to_string())
    })?;

    let mut summary = AnswerBankImportSummary::default();
    for (i, rec) in rdr.records().enumerate() {
        let row = i + 1;
        let rec = rec.map_err(|e| {
            AppError::new("ANSWER_BANK_IMPORT_FAILED", "Failed to parse answer bank row")
                .with_details(format!("row={row}; err={e}"))
        })?;
        let cell = |idx: Option<usize>| {
            idx.and_then(|i| rec.get(i))
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };
        let (Some(question), Some(answer)) = (cell(Some(q_idx)), cell(Some(a_idx))) else {
            summary.skipped.push(SkippedRow {
                row,
                reason: "missing question or answer".to_string(),
            });
            continue;
        };
        let entry = NewAnswerBankEntry {
            question: question.to_string(),
            answer: answer.to_string(),
            product: cell(product_idx).map(str::to_string),
            verified_by: cell(verified_idx).unwrap_or("unknown").to_string(),
            date_added: cell(date_idx).unwrap_or(default_date).to_string(),
        };
        if upsert_entry(&tx, &entry)? {
            summary.inserted += 1;
        } else {
            summary.updated += 1;
        }
    }

    tx.commit().map_err(|e| {
        AppError::new("DB_TX_FAILED", "Failed to commit answer bank import")
            .with_details(e.to_string())
    })?;
    tracing::info!(
        inserted = summary.inserted,
        updated = summary.updated,
        skipped = summary.skipped.len(),
        "answer bank import finished"
    );
    Ok(summary)
}

pub fn list(conn: &Connection) -> Result<Vec<AnswerBankEntry>, AppError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, question, answer, product, verified_by, date_added FROM answer_bank ORDER BY id",
        )
        .map_err(|e| {
            AppError::new("ANSWER_BANK_QUERY_FAILED", "Failed to prepare answer bank query")
                .with_details(e.to_string())
        })?;
    let rows = stmt
        .query_map([], |row| {
            let product: String = row.get(3)?;
            Ok(AnswerBankEntry {
                id: row.get(0)?,
                question: row.get(1)?,
                answer: row.get(2)?,
                product: if product.is_empty() { None } else { Some(product) },
                verified_by: row.get(4)?,
                date_added: row.get(5)?,
            })
        })
        .map_err(|e| {
            AppError::new("ANSWER_BANK_QUERY_FAILED", "Failed to query answer bank")
                .with_details(e.to_string())
        })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(|e| {
        AppError::new("ANSWER_BANK_QUERY_FAILED", "Failed to read answer bank row")
            .with_details(e.to_string())
    })
}

/// Read-only snapshot keyed by normalized question. The lowest id wins when
/// several products share a question.
#[derive(Debug, Clone, Default)]
pub struct AnswerBank {
    by_question: HashMap<String, AnswerBankEntry>,
}

impl AnswerBank {
    pub fn load(conn: &Connection) -> Result<Self, AppError> {
        Ok(Self::from_entries(list(conn)?))
    }

    pub fn from_entries(entries: Vec<AnswerBankEntry>) -> Self {
        let mut by_question = HashMap::new();
        for entry in entries {
            by_question
                .entry(normalize_question(&entry.question))
                .or_insert(entry);
        }
        Self { by_question }
    }

    pub fn lookup(&self, question: &str) -> Option<&AnswerBankEntry> {
        let key = normalize_question(question);
        if key.is_empty() {
            return None;
        }
        self.by_question.get(&key)
    }

    pub fn len(&self) -> usize {
        self.by_question.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_question.is_empty()
    }
}
