use scraper::{ElementRef, Html, Node, Selector};

use crate::error::AppError;

use super::{decode_utf8_lossy, LoadedSection};

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "li", "tr", "h1", "h2", "h3", "h4", "h5", "h6", "section", "article", "br",
    "table", "ul", "ol", "pre", "blockquote",
];
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg"];

/// Visible body text of a web page as a single section. Block elements become
/// paragraph breaks so the chunker can still find semantic boundaries.
pub(super) fn load_html(source_name: &str, bytes: &[u8]) -> Result<Vec<LoadedSection>, AppError> {
    let raw = decode_utf8_lossy(bytes);
    let document = Html::parse_document(&raw);
    let body = Selector::parse("body").map_err(|e| {
        AppError::new("LOAD_FAILED", "Failed to build HTML selector")
            .with_details(format!("source={source_name}; err={e:?}"))
    })?;

    let mut out = String::new();
    match document.select(&body).next() {
        Some(el) => collect_text(el, &mut out),
        None => collect_text(document.root_element(), &mut out),
    }

    let text = out
        .split("\n\n")
        .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    if text.is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![LoadedSection {
        text,
        location: "1".to_string(),
    }])
}

fn collect_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(t) => {
                out.push_str(t);
                out.push(' ');
            }
            Node::Element(e) => {
                let name = e.name();
                if SKIPPED_TAGS.contains(&name) {
                    continue;
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out);
                }
                if BLOCK_TAGS.contains(&name) {
                    out.push_str("\n\n");
                }
            }
            _ => {}
        }
    }
}
