//! Affiliation extraction prompt.
//!
//! One few-shot user prompt: a worked example, three instructions, then the
//! first page text verbatim.

/// User prompt template for affiliation extraction
/// Placeholders: {page_text}
pub const USER_PROMPT_TEMPLATE: &str = r#"Here is an example to illustrate the desired output format:

Example input (paper first page snippet):
"Alice is from Tsinghua University; Bob is from Peking University; Carol is also from Tsinghua University."

Example output (one institution per line):
Tsinghua University
Peking University

Now please:
1) Extract all author affiliations from the first page text below.
2) Output one affiliation per line, with no numbering or extra commentary.
3) Ensure each institution appears only once (deduplication will also be applied by the caller).

First page text:
{page_text}

Please start listing the affiliations, one per line:"#;

/// Build user prompt with first page text
pub fn build_user_prompt(page_text: &str) -> String {
    USER_PROMPT_TEMPLATE.replace("{page_text}", page_text)
}
