//! Progress reporting for pipeline runs.
//!
//! [`NoopObserver`] is the default. [`TracingObserver`] logs every step.
//! [`LogPanel`] also keeps the last [`PANEL_MAX_LINES`] lines for display.

use crate::arxiv::ArxivId;
use crate::error::AffError;
use crate::page::PageReference;
use chrono::{SecondsFormat, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Lines kept by the log panel
pub const PANEL_MAX_LINES: usize = 120;

/// Hooks called by the pipeline controller, in order, from one task.
#[allow(unused_variables)]
pub trait PipelineObserver: Send + Sync {
    fn run_started(&self, total: usize) {}
    fn link_skipped(&self, link: &PageReference) {}
    fn title_fallback(&self, id: &ArxivId, err: &AffError) {}
    fn item_started(&self, index: usize, total: usize, title: &str) {}
    fn cache_hit(&self, title: &str) {}
    fn cache_miss(&self, title: &str) {}
    fn pdf_downloaded(&self, id: &ArxivId, bytes: usize) {}
    fn page_text_extracted(&self, id: &ArxivId, chars: usize) {}
    fn affiliations_extracted(&self, title: &str, affiliations: &[String]) {}
    fn cached(&self, title: &str) {}
    fn item_finished(&self, index: usize) {}
    /// `aborting` is true when the run stops because of this failure
    fn item_failed(&self, title: &str, err: &AffError, aborting: bool) {}
    fn stopped(&self) {}
    fn run_completed(&self) {}
}

/// Observer that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Observer that writes every step as a `tracing` event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn run_started(&self, total: usize) {
        info!(total = total, "Found arXiv links");
    }

    fn link_skipped(&self, link: &PageReference) {
        debug!(href = %link.href, "Skipping link without identifier");
    }

    fn title_fallback(&self, id: &ArxivId, err: &AffError) {
        warn!(id = %id, error = %err, "Title lookup failed, using identifier");
    }

    fn item_started(&self, index: usize, total: usize, title: &str) {
        info!(item = index + 1, total = total, title = title, "Processing");
    }

    fn cache_hit(&self, title: &str) {
        info!(title = title, "Cache hit");
    }

    fn cache_miss(&self, title: &str) {
        info!(title = title, "Cache miss, downloading PDF");
    }

    fn pdf_downloaded(&self, id: &ArxivId, bytes: usize) {
        debug!(id = %id, bytes = bytes, "PDF downloaded");
    }

    fn page_text_extracted(&self, id: &ArxivId, chars: usize) {
        debug!(id = %id, chars = chars, "First page text extracted");
    }

    fn affiliations_extracted(&self, title: &str, affiliations: &[String]) {
        info!(title = title, affiliations = ?affiliations, "Affiliations extracted");
    }

    fn cached(&self, title: &str) {
        debug!(title = title, "Cached");
    }

    fn item_failed(&self, title: &str, err: &AffError, aborting: bool) {
        if aborting {
            error!(title = title, error = %err, "Processing failed, stopping run");
        } else {
            warn!(title = title, error = %err, "Processing failed, continuing");
        }
    }

    fn stopped(&self) {
        warn!("Run stopped by user");
    }

    fn run_completed(&self) {
        info!("All links processed");
    }
}

/// Scrolling debug panel: timestamped lines, capped, also sent to `tracing`
#[derive(Debug, Default)]
pub struct LogPanel {
    lines: Mutex<VecDeque<String>>,
    inner: TracingObserver,
}

impl LogPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line, dropping the oldest beyond the cap
    pub fn log(&self, message: impl AsRef<str>) {
        let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        if let Ok(mut lines) = self.lines.lock() {
            lines.push_back(format!("[{}] {}", ts, message.as_ref()));
            while lines.len() > PANEL_MAX_LINES {
                lines.pop_front();
            }
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Panel content, one line per entry
    pub fn contents(&self) -> String {
        let mut text = self.lines().join("\n");
        text.push('\n');
        text
    }
}

impl PipelineObserver for LogPanel {
    fn run_started(&self, total: usize) {
        self.inner.run_started(total);
        self.log(format!("Found {} arXiv links", total));
    }

    fn link_skipped(&self, link: &PageReference) {
        self.inner.link_skipped(link);
        self.log(format!("Skipping unparseable link: {}", link.href));
    }

    fn title_fallback(&self, id: &ArxivId, err: &AffError) {
        self.inner.title_fallback(id, err);
        self.log(format!("Title lookup failed, using ID: {}", id));
    }

    fn item_started(&self, index: usize, total: usize, title: &str) {
        self.inner.item_started(index, total, title);
        self.log(format!("Processing {}/{} -> \"{}\"", index + 1, total, title));
    }

    fn cache_hit(&self, title: &str) {
        self.inner.cache_hit(title);
        self.log(format!("Cache hit: \"{}\"", title));
    }

    fn cache_miss(&self, title: &str) {
        self.inner.cache_miss(title);
        self.log(format!("Cache miss, downloading and parsing PDF: \"{}\"", title));
    }

    fn pdf_downloaded(&self, id: &ArxivId, bytes: usize) {
        self.inner.pdf_downloaded(id, bytes);
        self.log(format!("PDF downloaded: {} ({} bytes)", id, bytes));
    }

    fn page_text_extracted(&self, id: &ArxivId, chars: usize) {
        self.inner.page_text_extracted(id, chars);
        self.log(format!("First page text length: {}", chars));
    }

    fn affiliations_extracted(&self, title: &str, affiliations: &[String]) {
        self.inner.affiliations_extracted(title, affiliations);
        self.log(format!("Parsed: \"{}\" ({} affiliations)", title, affiliations.len()));
    }

    fn cached(&self, title: &str) {
        self.inner.cached(title);
        self.log(format!("Cached: \"{}\"", title));
    }

    fn item_failed(&self, title: &str, err: &AffError, aborting: bool) {
        self.inner.item_failed(title, err, aborting);
        if aborting {
            self.log(format!("Processing failed, stopping! \"{}\" error: {}", title, err));
        } else {
            self.log(format!("Processing failed, skipping \"{}\" error: {}", title, err));
        }
    }

    fn stopped(&self) {
        self.inner.stopped();
        self.log("Stopped by user");
    }

    fn run_completed(&self) {
        self.inner.run_completed();
        self.log("All links processed");
    }
}
