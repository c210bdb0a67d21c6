use std::collections::BTreeSet;

/// Exact phrase the grounded prompt asks for when the evidence cannot answer.
pub const REVIEW_SENTINEL: &str = "Review Required - Not found in Knowledge Base";

const INSUFFICIENT_PHRASES: &[&str] = &[
    "not found in knowledge base",
    "don't know",
    "do not know",
    "requires manual review",
];

const MARKER_OPEN: &str = "[[source:";

/// True when the output signals the evidence could not ground an answer.
pub fn is_insufficient_evidence(output: &str) -> bool {
    let lower = output.to_lowercase();
    lower.contains(&REVIEW_SENTINEL.to_lowercase())
        || INSUFFICIENT_PHRASES.iter().any(|p| lower.contains(p))
}

/// Labels inside `[[source:<label>]]` markers, trimmed. Labels are returned raw so
/// the caller decides which are valid.
pub fn extract_cited_sources(output: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let mut rest = output;
    while let Some(pos) = rest.find(MARKER_OPEN) {
        let after_open = &rest[pos + MARKER_OPEN.len()..];
        match after_open.find("]]") {
            Some(end) => {
                let label = after_open[..end].trim();
                if !label.is_empty() {
                    out.insert(label.to_string());
                }
                rest = &after_open[end + 2..];
            }
            None => break,
        }
    }
    out
}

/// Remove every `[[source:..]]` marker and tidy the whitespace left behind.
pub fn strip_citation_markers(output: &str) -> String {
    let mut stripped = String::with_capacity(output.len());
    let mut rest = output;
    while let Some(pos) = rest.find(MARKER_OPEN) {
        stripped.push_str(&rest[..pos]);
        let after_open = &rest[pos + MARKER_OPEN.len()..];
        match after_open.find("]]") {
            Some(end) => rest = &after_open[end + 2..],
            None => {
                rest = "";
                break;
            }
        }
    }
    stripped.push_str(rest);

    let lines: Vec<String> = stripped
        .lines()
        .map(|line| {
            let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
            collapsed
                .replace(" .", ".")
                .replace(" ,", ",")
                .replace(" ;", ";")
                .replace(" :", ":")
        })
        .collect();
    lines.join("\n").trim().to_string()
}
