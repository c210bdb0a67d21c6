use crate::guardrails::REVIEW_SENTINEL;

pub fn grounded_answer_prompt(question: &str, evidence_blocks: &str) -> String {
    format!(
        r#"You are completing a vendor security questionnaire on behalf of the company.

Rules (non-negotiable):
1) Answer using ONLY the evidence blocks below. Do not invent facts.
2) Cite every claim inline with the label of the block that supports it, e.g. [[source:1]].
3) Only cite labels that appear below.
4) If the evidence does not answer the question, reply with exactly: {REVIEW_SENTINEL}

Question:
{question}

Evidence:
{evidence_blocks}

Output:
- A concise, professional answer (1-3 sentences) with inline citations.
"#
    )
}
