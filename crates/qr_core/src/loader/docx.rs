use docx_rs::{DocumentChild, ParagraphChild, RunChild};

use crate::error::AppError;

use super::LoadedSection;

/// Word documents carry no reliable page breaks; the whole body is section `1`.
pub(super) fn load_docx(source_name: &str, bytes: &[u8]) -> Result<Vec<LoadedSection>, AppError> {
    let doc = docx_rs::read_docx(bytes).map_err(|e| {
        AppError::new("LOAD_FAILED", "Failed to open Word document")
            .with_details(format!("source={source_name}; err={e}"))
    })?;

    let mut paragraphs: Vec<String> = Vec::new();
    for child in doc.document.children {
        if let DocumentChild::Paragraph(p) = child {
            let mut line = String::new();
            for pc in p.children {
                if let ParagraphChild::Run(run) = pc {
                    for rc in run.children {
                        if let RunChild::Text(t) = rc {
                            line.push_str(&t.text);
                        }
                    }
                }
            }
            paragraphs.push(line);
        }
    }

    let text = paragraphs.join("\n");
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![LoadedSection {
        text,
        location: "1".to_string(),
    }])
}
