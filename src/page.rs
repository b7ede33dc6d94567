//! Link discovery and inline annotation.
//!
//! [`Document`] is the seam to whatever holds the page. [`HtmlPage`] works
//! on a raw HTML string: anchors are located by byte offset and labels are
//! spliced in after the closing `</a>` when the page is rendered.

use crate::arxiv::is_candidate_link;
use regex::Regex;
use std::sync::OnceLock;

/// Inline style of the affiliation label
pub const LABEL_STYLE: &str = "background: #fffbdd; color: #333; padding: 2px 4px; margin-left: 6px; border-radius: 3px; font-size: 90%; font-family: sans-serif;";

/// A discovered anchor. Only valid for the document that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageReference {
    /// Position in discovery order
    pub index: usize,
    /// Raw `href` value
    pub href: String,
}

/// Page surface the pipeline reads links from and writes labels to
pub trait Document {
    /// Candidate paper links, in document order
    fn paper_links(&self) -> Vec<PageReference>;

    /// Insert a text label immediately after the anchor.
    fn insert_label_after(&mut self, anchor: &PageReference, text: &str);
}

/// Label the anchor with its affiliations, comma-joined.
///
/// No-op for an empty list. Not idempotent: a second call adds a second label.
pub fn annotate<D: Document + ?Sized>(document: &mut D, anchor: &PageReference, affiliations: &[String]) {
    if affiliations.is_empty() {
        return;
    }
    document.insert_label_after(anchor, &affiliations.join(", "));
}

#[derive(Debug, Clone)]
struct AnchorSpan {
    reference: PageReference,
    /// Byte offset just past `</a>`
    end: usize,
}

/// HTML document held as a string
#[derive(Debug, Clone)]
pub struct HtmlPage {
    source: String,
    anchors: Vec<AnchorSpan>,
    /// (byte offset, rendered label) in insertion order
    insertions: Vec<(usize, String)>,
}

/// Anchors plus the raw-text regions they must not be found in.
///
/// Comments, `<script>`, `<style>` and `<textarea>` bodies match the first
/// alternatives and carry no capture groups, so they are consumed and
/// dropped. Only the anchor alternative sets an `href` group.
fn anchor_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r#"(?is)<!--.*?(?:-->|\z)"#,
            r#"|<script\b.*?(?:</script\s*>|\z)"#,
            r#"|<style\b.*?(?:</style\s*>|\z)"#,
            r#"|<textarea\b.*?(?:</textarea\s*>|\z)"#,
            r#"|<a\b[^>]*?\shref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))[^>]*>.*?</a\s*>"#,
        ))
        .ok()
    })
    .as_ref()
}

impl HtmlPage {
    pub fn parse(html: impl Into<String>) -> Self {
        let source = html.into();
        let anchors = match anchor_regex() {
            Some(re) => re
                .captures_iter(&source)
                .filter_map(|caps| {
                    let whole = caps.get(0)?;
                    let href = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3))?;
                    let href = html_escape::decode_html_entities(href.as_str()).into_owned();
                    is_candidate_link(&href).then_some((href, whole.end()))
                })
                .enumerate()
                .map(|(index, (href, end))| AnchorSpan {
                    reference: PageReference { index, href },
                    end,
                })
                .collect(),
            None => Vec::new(),
        };

        Self {
            source,
            anchors,
            insertions: Vec::new(),
        }
    }

    /// Number of labels inserted so far
    pub fn label_count(&self) -> usize {
        self.insertions.len()
    }

    /// Original HTML with every inserted label in place.
    pub fn render(&self) -> String {
        let mut ordered: Vec<&(usize, String)> = self.insertions.iter().collect();
        // stable: labels on the same anchor keep insertion order
        ordered.sort_by_key(|(offset, _)| *offset);

        let extra: usize = ordered.iter().map(|(_, label)| label.len()).sum();
        let mut out = String::with_capacity(self.source.len() + extra);
        let mut cursor = 0;
        for (offset, label) in ordered {
            out.push_str(&self.source[cursor..*offset]);
            out.push_str(label);
            cursor = *offset;
        }
        out.push_str(&self.source[cursor..]);
        out
    }
}

impl Document for HtmlPage {
    fn paper_links(&self) -> Vec<PageReference> {
        self.anchors.iter().map(|a| a.reference.clone()).collect()
    }

    fn insert_label_after(&mut self, anchor: &PageReference, text: &str) {
        let Some(span) = self.anchors.get(anchor.index) else {
            return;
        };
        let label = format!(
            r#"<span class="arxiv-affiliations" style="{}">{}</span>"#,
            LABEL_STYLE,
            html_escape::encode_text(text)
        );
        self.insertions.push((span.end, label));
    }
}
