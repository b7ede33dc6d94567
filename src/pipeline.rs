//! Pipeline controller.
//!
//! Links are processed one at a time in discovery order:
//! identifier → title (best effort) → cache → PDF → page text → LLM →
//! cache write → annotation. The stop signal is checked once before each
//! link. Under [`FailurePolicy::FailFast`] the first failed link ends the
//! run; links already annotated keep their labels.

use crate::affiliations::{extract_affiliations, ChatCompletion};
use crate::arxiv::{extract_id, ArxivEndpoints, ArxivId};
use crate::cache::ResultCache;
use crate::error::Result;
use crate::fetch::RemoteFetcher;
use crate::observer::{NoopObserver, PipelineObserver};
use crate::page::{annotate, Document, PageReference};
use crate::pdf::{extract_first_page_text, PdfRenderer};
use crate::title::resolve_title;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What a failed link does to the rest of the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the whole run on the first failure
    #[default]
    FailFast,
    /// Record the failure and continue with the next link
    Isolate,
}

impl FailurePolicy {
    /// `Isolate` when `isolate` is set, `FailFast` otherwise
    pub fn from_isolate(isolate: bool) -> Self {
        if isolate {
            Self::Isolate
        } else {
            Self::FailFast
        }
    }
}

/// Cooperative stop flag, shared between the run and whoever stops it
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes effect at the next link boundary
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Completed,
    /// Stopped before processing the link at `next_index`
    Stopped { next_index: usize },
    /// Link at `index` failed under fail-fast
    Aborted { index: usize, error: String },
}

/// Per-link outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    Skipped,
    CacheHit,
    Extracted,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub index: usize,
    pub href: String,
    pub arxiv_id: Option<ArxivId>,
    pub title: Option<String>,
    pub outcome: ItemOutcome,
    pub affiliations: Vec<String>,
    pub error: Option<String>,
}

impl ItemReport {
    fn new(link: &PageReference, outcome: ItemOutcome) -> Self {
        Self {
            index: link.index,
            href: link.href.clone(),
            arxiv_id: None,
            title: None,
            outcome,
            affiliations: Vec::new(),
            error: None,
        }
    }
}

/// Result of one run: final state plus one report per link reached
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub state: RunState,
    pub items: Vec<ItemReport>,
}

impl RunReport {
    /// Links that received a label
    pub fn annotated(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, ItemOutcome::CacheHit | ItemOutcome::Extracted))
            .filter(|i| !i.affiliations.is_empty())
            .count()
    }
}

/// Sequential affiliation pipeline over one document
pub struct Pipeline {
    fetcher: Arc<dyn RemoteFetcher>,
    renderer: Arc<dyn PdfRenderer>,
    llm: Arc<dyn ChatCompletion>,
    cache: ResultCache,
    endpoints: ArxivEndpoints,
    observer: Arc<dyn PipelineObserver>,
    policy: FailurePolicy,
}

impl Pipeline {
    pub fn new(
        fetcher: Arc<dyn RemoteFetcher>,
        renderer: Arc<dyn PdfRenderer>,
        llm: Arc<dyn ChatCompletion>,
        cache: ResultCache,
    ) -> Self {
        Self {
            fetcher,
            renderer,
            llm,
            cache,
            endpoints: ArxivEndpoints::default(),
            observer: Arc::new(NoopObserver),
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_endpoints(mut self, endpoints: ArxivEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: FailurePolicy) {
        self.policy = policy;
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ResultCache {
        &mut self.cache
    }

    /// Annotate every paper link of `document`.
    ///
    /// Never returns an error: failures end up in the report, and under
    /// fail-fast they end the run.
    pub async fn run<D>(&mut self, document: &mut D, stop: &StopSignal) -> RunReport
    where
        D: Document + Send + ?Sized,
    {
        let links = document.paper_links();
        let total = links.len();
        self.observer.run_started(total);

        let mut items = Vec::with_capacity(total);

        for link in &links {
            if stop.is_stopped() {
                self.observer.stopped();
                return RunReport {
                    state: RunState::Stopped {
                        next_index: link.index,
                    },
                    items,
                };
            }

            let Some(id) = extract_id(&link.href) else {
                self.observer.link_skipped(link);
                items.push(ItemReport::new(link, ItemOutcome::Skipped));
                continue;
            };

            let title = match resolve_title(self.fetcher.as_ref(), &self.endpoints, &id).await {
                Ok(title) => title,
                Err(e) => {
                    self.observer.title_fallback(&id, &e);
                    id.to_string()
                }
            };

            self.observer.item_started(link.index, total, &title);

            let mut report = ItemReport::new(link, ItemOutcome::Failed);
            report.arxiv_id = Some(id.clone());
            report.title = Some(title.clone());

            match self.process(&id, &title).await {
                Ok((outcome, affiliations)) => {
                    annotate(&mut *document, link, &affiliations);
                    report.outcome = outcome;
                    report.affiliations = affiliations;
                    items.push(report);
                    self.observer.item_finished(link.index);
                }
                Err(e) => {
                    let aborting = self.policy == FailurePolicy::FailFast;
                    self.observer.item_failed(&title, &e, aborting);
                    report.error = Some(e.to_string());
                    items.push(report);
                    if aborting {
                        return RunReport {
                            state: RunState::Aborted {
                                index: link.index,
                                error: e.to_string(),
                            },
                            items,
                        };
                    }
                }
            }
        }

        self.observer.run_completed();
        RunReport {
            state: RunState::Completed,
            items,
        }
    }

    /// [`run`](Self::run) under `policy` for this run only; the configured
    /// policy is restored afterwards.
    pub async fn run_with_policy<D>(
        &mut self,
        document: &mut D,
        stop: &StopSignal,
        policy: FailurePolicy,
    ) -> RunReport
    where
        D: Document + Send + ?Sized,
    {
        let configured = std::mem::replace(&mut self.policy, policy);
        let report = self.run(document, stop).await;
        self.policy = configured;
        report
    }

    /// Cache lookup, and on a miss the full download/extract/query path.
    async fn process(&mut self, id: &ArxivId, title: &str) -> Result<(ItemOutcome, Vec<String>)> {
        if let Some(entry) = self.cache.get(id) {
            self.observer.cache_hit(title);
            return Ok((ItemOutcome::CacheHit, entry.affiliations.clone()));
        }

        self.observer.cache_miss(title);

        let pdf = self.fetcher.fetch_binary(&self.endpoints.pdf_url(id)).await?;
        self.observer.pdf_downloaded(id, pdf.len());

        let text = extract_first_page_text(self.renderer.as_ref(), &pdf)?;
        self.observer.page_text_extracted(id, text.chars().count());

        let affiliations = extract_affiliations(self.llm.as_ref(), &text).await?;
        self.observer.affiliations_extracted(title, &affiliations);

        self.cache.put(id, affiliations.clone())?;
        self.observer.cached(title);

        Ok((ItemOutcome::Extracted, affiliations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_signal_shared() {
        let signal = StopSignal::new();
        let handle = signal.clone();
        assert!(!signal.is_stopped());
        handle.stop();
        assert!(signal.is_stopped());
    }

    #[test]
    fn test_policy_from_isolate() {
        assert_eq!(FailurePolicy::from_isolate(true), FailurePolicy::Isolate);
        assert_eq!(FailurePolicy::from_isolate(false), FailurePolicy::FailFast);
    }

    #[test]
    fn test_run_state_serialization() {
        let state = RunState::Aborted {
            index: 1,
            error: "PDF download failed: HTTP 404".to_string(),
        };
        let json = serde_json::to_value(&state).expect("serialize");
        assert_eq!(json["state"], "aborted");
        assert_eq!(json["index"], 1);
    }
}
