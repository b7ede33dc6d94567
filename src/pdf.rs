//! First-page text extraction from PDF bytes.

use crate::error::{AffError, Result};
use lopdf::Document;
use tracing::debug;

/// PDF rendering capability: text fragments of page 1, in content order.
pub trait PdfRenderer: Send + Sync {
    fn first_page_fragments(&self, pdf: &[u8]) -> Result<Vec<String>>;
}

/// Pure-Rust renderer backed by `lopdf`
#[derive(Debug, Clone, Default)]
pub struct LopdfRenderer;

impl PdfRenderer for LopdfRenderer {
    fn first_page_fragments(&self, pdf: &[u8]) -> Result<Vec<String>> {
        let document = Document::load_mem(pdf)
            .map_err(|e| AffError::Render(format!("failed to load PDF: {}", e)))?;

        let first_page = document
            .get_pages()
            .keys()
            .next()
            .copied()
            .ok_or_else(|| AffError::Render("PDF has no pages".to_string()))?;

        let text = document
            .extract_text(&[first_page])
            .map_err(|e| AffError::Render(format!("failed to extract page {}: {}", first_page, e)))?;

        Ok(text
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// Render page 1 and flatten its fragments with single spaces.
///
/// An empty string is a valid result for a page without a text layer.
pub fn extract_first_page_text(renderer: &dyn PdfRenderer, pdf: &[u8]) -> Result<String> {
    let fragments = renderer.first_page_fragments(pdf)?;
    let text = fragments.join(" ");
    debug!(fragments = fragments.len(), chars = text.len(), "Extracted first page");
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fragments(Vec<&'static str>);

    impl PdfRenderer for Fragments {
        fn first_page_fragments(&self, _pdf: &[u8]) -> Result<Vec<String>> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    #[test]
    fn test_fragments_joined_in_order() {
        let renderer = Fragments(vec!["Attention", "Is All", "You Need"]);
        let text = extract_first_page_text(&renderer, b"").expect("text");
        assert_eq!(text, "Attention Is All You Need");
    }

    #[test]
    fn test_empty_page_is_not_an_error() {
        let renderer = Fragments(vec![]);
        assert_eq!(extract_first_page_text(&renderer, b"").expect("text"), "");
    }

    #[test]
    fn test_corrupt_pdf_is_render_error() {
        let result = extract_first_page_text(&LopdfRenderer, b"definitely not a pdf");
        assert!(matches!(result, Err(AffError::Render(_))));
    }
}
