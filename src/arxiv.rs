//! arXiv identifier extraction and URL construction.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Default arXiv site
pub const DEFAULT_ARXIV_URL: &str = "https://arxiv.org";

/// Link markers that make an anchor a candidate for annotation
pub const LINK_MARKERS: &[&str] = &["arxiv.org/abs/", "arxiv.org/pdf/"];

/// Canonical arXiv identifier, e.g. `2401.10935` or `2401.10935v2`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArxivId(String);

impl ArxivId {
    /// Key read back from the cache mapping; not re-validated.
    pub(crate) fn from_stored(key: String) -> Self {
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArxivId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn id_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"arxiv\.org/(?:abs|pdf)/(\d+(?:\.\d+)*(?:v\d+)?)").ok())
        .as_ref()
}

/// Extract the arXiv identifier from a link.
///
/// Returns `None` for anything that is not an `arxiv.org/abs/` or
/// `arxiv.org/pdf/` link followed by a numeric identifier.
pub fn extract_id(url: &str) -> Option<ArxivId> {
    id_regex()?
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| ArxivId(m.as_str().to_string()))
}

/// Whether an href should be considered at all (before identifier parsing)
pub fn is_candidate_link(href: &str) -> bool {
    LINK_MARKERS.iter().any(|m| href.contains(m))
}

/// URL builder for abstract pages and PDFs
#[derive(Debug, Clone)]
pub struct ArxivEndpoints {
    base_url: String,
}

impl ArxivEndpoints {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn abs_url(&self, id: &ArxivId) -> String {
        format!("{}/abs/{}", self.base_url, id)
    }

    pub fn pdf_url(&self, id: &ArxivId) -> String {
        format!("{}/pdf/{}.pdf", self.base_url, id)
    }
}

impl Default for ArxivEndpoints {
    fn default() -> Self {
        Self::new(DEFAULT_ARXIV_URL)
    }
}
