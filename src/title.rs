//! Paper title resolution from the arXiv abstract page.
//!
//! Tiers, first hit wins:
//! 1. `h1.title`, with the leading `Title:` label removed
//! 2. `<title>`, cut at the first `|` (`"Paper | arXiv:2401.10935 [cs]"`)
//! 3. the identifier itself

use crate::arxiv::{ArxivEndpoints, ArxivId};
use crate::error::{AffError, Result};
use crate::fetch::RemoteFetcher;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

/// Fetch the abstract page and resolve the display title.
///
/// # Errors
///
/// Returns the fetch error unchanged; callers fall back to the identifier.
pub async fn resolve_title(
    fetcher: &dyn RemoteFetcher,
    endpoints: &ArxivEndpoints,
    id: &ArxivId,
) -> Result<String> {
    let html = fetcher.fetch_text(&endpoints.abs_url(id)).await?;
    let title = parse_title(&html, id)?;
    debug!(id = %id, title = %title, "Resolved title");
    Ok(title)
}

/// Apply the tiered title parse to an abstract page.
pub fn parse_title(html: &str, id: &ArxivId) -> Result<String> {
    let document = Html::parse_document(html);

    let heading_selector =
        Selector::parse("h1.title").map_err(|e| AffError::Parse(e.to_string()))?;
    let title_selector = Selector::parse("title").map_err(|e| AffError::Parse(e.to_string()))?;
    let label_regex = Regex::new(r"(?i)^Title:\s*").map_err(|e| AffError::Parse(e.to_string()))?;
    let pipe_regex = Regex::new(r"^(.+?)\s*\|").map_err(|e| AffError::Parse(e.to_string()))?;

    if let Some(heading) = document.select(&heading_selector).next() {
        let text = heading.text().collect::<String>();
        let title = label_regex.replace(text.trim(), "").trim().to_string();
        if !title.is_empty() {
            return Ok(title);
        }
    }

    if let Some(title_elem) = document.select(&title_selector).next() {
        let text = title_elem.text().collect::<String>();
        let title = match pipe_regex.captures(&text).and_then(|caps| caps.get(1)) {
            Some(m) => m.as_str().trim().to_string(),
            None => text.trim().to_string(),
        };
        if !title.is_empty() {
            return Ok(title);
        }
    }

    Ok(id.to_string())
}
