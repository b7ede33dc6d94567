//! Pipeline controller scenarios against in-process fakes.

use arxiv_affiliations::affiliations::ChatCompletion;
use arxiv_affiliations::arxiv::{extract_id, ArxivId};
use arxiv_affiliations::cache::ResultCache;
use arxiv_affiliations::error::{AffError, Result};
use arxiv_affiliations::fetch::{RemoteFetcher, PDF_CONTEXT, TEXT_CONTEXT};
use arxiv_affiliations::observer::{LogPanel, PipelineObserver};
use arxiv_affiliations::page::HtmlPage;
use arxiv_affiliations::pdf::PdfRenderer;
use arxiv_affiliations::pipeline::{FailurePolicy, ItemOutcome, Pipeline, RunState, StopSignal};
use arxiv_affiliations::store::MemoryStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Serves `<title>` pages and PDFs whose bytes are the PDF URL
#[derive(Default)]
struct FakeFetcher {
    pdf_failures: HashMap<String, u16>,
    title_failures: bool,
    requests: Mutex<Vec<String>>,
}

impl FakeFetcher {
    fn failing_pdf(id: &str, status: u16) -> Self {
        Self {
            pdf_failures: HashMap::from([(id.to_string(), status)]),
            ..Default::default()
        }
    }

    fn requested(&self, needle: &str) -> bool {
        self.requests
            .lock()
            .expect("lock")
            .iter()
            .any(|url| url.contains(needle))
    }
}

#[async_trait]
impl RemoteFetcher for FakeFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        self.requests.lock().expect("lock").push(url.to_string());
        if self.title_failures {
            return Err(AffError::http(TEXT_CONTEXT, 503));
        }
        let id = url.rsplit('/').next().unwrap_or_default();
        Ok(format!(
            "<html><head><title>Paper {} | arXiv:{} [cs]</title></head></html>",
            id, id
        ))
    }

    async fn fetch_binary(&self, url: &str) -> Result<Vec<u8>> {
        self.requests.lock().expect("lock").push(url.to_string());
        for (id, status) in &self.pdf_failures {
            if url.contains(id.as_str()) {
                return Err(AffError::http(PDF_CONTEXT, *status));
            }
        }
        Ok(url.as_bytes().to_vec())
    }
}

/// Page text is the PDF URL, split in two fragments
struct EchoRenderer;

impl PdfRenderer for EchoRenderer {
    fn first_page_fragments(&self, pdf: &[u8]) -> Result<Vec<String>> {
        if pdf.is_empty() {
            return Err(AffError::Render("empty document".to_string()));
        }
        Ok(vec!["Authors at".to_string(), String::from_utf8_lossy(pdf).into_owned()])
    }
}

/// Replies with the first entry whose needle occurs in the prompt
struct ScriptedLlm {
    replies: Vec<(&'static str, &'static str)>,
    calls: Mutex<usize>,
}

impl ScriptedLlm {
    fn new(replies: Vec<(&'static str, &'static str)>) -> Self {
        Self {
            replies,
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.calls.lock().expect("lock")
    }
}

#[async_trait]
impl ChatCompletion for ScriptedLlm {
    async fn complete(&self, prompt: &str) -> Result<String> {
        *self.calls.lock().expect("lock") += 1;
        self.replies
            .iter()
            .find(|(needle, _)| prompt.contains(*needle))
            .map(|(_, reply)| reply.to_string())
            .ok_or_else(|| AffError::Parse("no scripted reply".to_string()))
    }
}

/// Sets the stop signal once the given item has finished
struct StopAfter {
    index: usize,
    signal: StopSignal,
}

impl PipelineObserver for StopAfter {
    fn item_finished(&self, index: usize) {
        if index == self.index {
            self.signal.stop();
        }
    }
}

fn paper(n: &str) -> ArxivId {
    extract_id(&format!("https://arxiv.org/abs/{}", n)).expect("id")
}

fn page_with(ids: &[&str]) -> HtmlPage {
    let links: Vec<String> = ids
        .iter()
        .map(|id| format!(r#"<li><a href="https://arxiv.org/abs/{}">{}</a></li>"#, id, id))
        .collect();
    HtmlPage::parse(format!("<ul>{}</ul>", links.join("\n")))
}

fn default_llm() -> Arc<ScriptedLlm> {
    Arc::new(ScriptedLlm::new(vec![
        ("2401.00001", "MIT"),
        ("2401.00002", "Stanford University\nStanford University\n"),
        ("2401.00003", "ETH Zurich"),
    ]))
}

struct Harness {
    fetcher: Arc<FakeFetcher>,
    llm: Arc<ScriptedLlm>,
    pipeline: Pipeline,
}

fn harness(fetcher: FakeFetcher, seed: &[(&str, &str)]) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let mut cache = ResultCache::load(store).expect("load cache");
    for (id, affiliation) in seed {
        cache
            .put(&paper(id), vec![affiliation.to_string()])
            .expect("seed cache");
    }
    let fetcher = Arc::new(fetcher);
    let llm = default_llm();
    let pipeline = Pipeline::new(fetcher.clone(), Arc::new(EchoRenderer), llm.clone(), cache);
    Harness {
        fetcher,
        llm,
        pipeline,
    }
}

#[tokio::test]
async fn cache_hit_and_miss_are_both_annotated_in_order() {
    let mut h = harness(FakeFetcher::default(), &[("2401.00001", "MIT")]);
    let mut page = page_with(&["2401.00001", "2401.00002"]);

    let report = h.pipeline.run(&mut page, &StopSignal::new()).await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.items[0].outcome, ItemOutcome::CacheHit);
    assert_eq!(report.items[1].outcome, ItemOutcome::Extracted);
    assert_eq!(report.items[1].affiliations, vec!["Stanford University"]);
    assert_eq!(report.items[1].title.as_deref(), Some("Paper 2401.00002"));

    let html = page.render();
    let mit = html.find(">MIT</span>").expect("first label");
    let stanford = html.find(">Stanford University</span>").expect("second label");
    assert!(mit < stanford);

    let entry = h.pipeline.cache().get(&paper("2401.00002")).expect("cached");
    assert_eq!(entry.affiliations, vec!["Stanford University"]);

    assert!(!h.fetcher.requested("pdf/2401.00001"));
    assert_eq!(h.llm.calls(), 1);
}

#[tokio::test]
async fn pdf_failure_aborts_the_run() {
    let mut h = harness(
        FakeFetcher::failing_pdf("2401.00002", 404),
        &[("2401.00001", "MIT")],
    );
    let mut page = page_with(&["2401.00001", "2401.00002", "2401.00003"]);

    let report = h.pipeline.run(&mut page, &StopSignal::new()).await;

    match &report.state {
        RunState::Aborted { index, error } => {
            assert_eq!(*index, 1);
            assert!(error.contains("404"));
        }
        other => panic!("expected abort, got {:?}", other),
    }
    assert_eq!(report.items.len(), 2);
    assert_eq!(report.items[1].outcome, ItemOutcome::Failed);

    assert_eq!(page.label_count(), 1);
    assert!(page.render().contains(">MIT</span>"));
    assert!(h.pipeline.cache().get(&paper("2401.00002")).is_none());
    assert!(!h.fetcher.requested("2401.00003"));
}

#[tokio::test]
async fn isolate_policy_continues_after_failure() {
    let h = harness(FakeFetcher::failing_pdf("2401.00002", 500), &[]);
    let mut pipeline = h.pipeline.with_policy(FailurePolicy::Isolate);
    let mut page = page_with(&["2401.00001", "2401.00002", "2401.00003"]);

    let report = pipeline.run(&mut page, &StopSignal::new()).await;

    assert_eq!(report.state, RunState::Completed);
    let outcomes: Vec<ItemOutcome> = report.items.iter().map(|i| i.outcome).collect();
    assert_eq!(
        outcomes,
        vec![ItemOutcome::Extracted, ItemOutcome::Failed, ItemOutcome::Extracted]
    );
    assert_eq!(report.annotated(), 2);
    assert!(pipeline.cache().get(&paper("2401.00003")).is_some());
    assert!(pipeline.cache().get(&paper("2401.00002")).is_none());
}

#[tokio::test]
async fn stop_after_first_item_leaves_the_rest_untouched() {
    let signal = StopSignal::new();
    let h = harness(FakeFetcher::default(), &[]);
    let mut pipeline = h.pipeline.with_observer(Arc::new(StopAfter {
        index: 0,
        signal: signal.clone(),
    }));
    let mut page = page_with(&["2401.00001", "2401.00002", "2401.00003"]);

    let report = pipeline.run(&mut page, &signal).await;

    assert_eq!(report.state, RunState::Stopped { next_index: 1 });
    assert_eq!(report.items.len(), 1);
    assert_eq!(page.label_count(), 1);
    assert!(!h.fetcher.requested("2401.00002"));
    assert!(!h.fetcher.requested("2401.00003"));
}

#[tokio::test]
async fn stop_before_start_processes_nothing() {
    let mut h = harness(FakeFetcher::default(), &[]);
    let mut page = page_with(&["2401.00001"]);
    let signal = StopSignal::new();
    signal.stop();

    let report = h.pipeline.run(&mut page, &signal).await;

    assert_eq!(report.state, RunState::Stopped { next_index: 0 });
    assert!(report.items.is_empty());
    assert_eq!(page.render(), page_with(&["2401.00001"]).render());
}

#[tokio::test]
async fn title_failure_falls_back_to_identifier() {
    let fetcher = FakeFetcher {
        title_failures: true,
        ..Default::default()
    };
    let mut h = harness(fetcher, &[]);
    let mut page = page_with(&["2401.00003"]);

    let report = h.pipeline.run(&mut page, &StopSignal::new()).await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.items[0].title.as_deref(), Some("2401.00003"));
    assert_eq!(report.items[0].affiliations, vec!["ETH Zurich"]);
}

#[tokio::test]
async fn links_without_identifier_are_skipped() {
    let h = harness(FakeFetcher::default(), &[]);
    let mut page = HtmlPage::parse(
        r#"<a href="https://arxiv.org/abs/hep-th/9901001">old style</a>
           <a href="https://arxiv.org/abs/2401.00001">new</a>"#,
    );

    let panel = Arc::new(LogPanel::new());
    let mut pipeline = h.pipeline.with_observer(panel.clone());

    let report = pipeline.run(&mut page, &StopSignal::new()).await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.items[0].outcome, ItemOutcome::Skipped);
    assert_eq!(report.items[1].outcome, ItemOutcome::Extracted);
    assert_eq!(page.label_count(), 1);
    assert!(panel.contents().contains("Skipping unparseable link"));
}

#[tokio::test]
async fn expired_entry_is_refetched_and_overwritten() {
    let store = Arc::new(MemoryStore::new());
    let mut cache = ResultCache::load(store).expect("load");
    cache
        .put_at(&paper("2401.00001"), vec!["Old Institute".to_string()], 0)
        .expect("seed");
    let llm = default_llm();
    let mut pipeline = Pipeline::new(
        Arc::new(FakeFetcher::default()),
        Arc::new(EchoRenderer),
        llm.clone(),
        cache,
    );
    let mut page = page_with(&["2401.00001"]);

    let report = pipeline.run(&mut page, &StopSignal::new()).await;

    assert_eq!(report.items[0].outcome, ItemOutcome::Extracted);
    assert_eq!(llm.calls(), 1);
    let entry = pipeline.cache().get(&paper("2401.00001")).expect("fresh entry");
    assert_eq!(entry.affiliations, vec!["MIT"]);
    assert!(entry.cached_at > 0);
}

#[tokio::test]
async fn llm_failure_is_fatal_for_the_run() {
    let mut h = harness(FakeFetcher::default(), &[]);
    let mut page = page_with(&["2401.00009", "2401.00001"]);

    let report = h.pipeline.run(&mut page, &StopSignal::new()).await;

    assert!(matches!(report.state, RunState::Aborted { index: 0, .. }));
    assert_eq!(page.label_count(), 0);
    assert!(!h.fetcher.requested("pdf/2401.00001"));
}

#[tokio::test]
async fn per_run_policy_applies_once_then_reverts() {
    let mut h = harness(FakeFetcher::failing_pdf("2401.00002", 500), &[]);
    assert_eq!(h.pipeline.policy(), FailurePolicy::FailFast);

    let mut page = page_with(&["2401.00001", "2401.00002", "2401.00003"]);
    let report = h
        .pipeline
        .run_with_policy(&mut page, &StopSignal::new(), FailurePolicy::Isolate)
        .await;
    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.items.len(), 3);
    assert_eq!(h.pipeline.policy(), FailurePolicy::FailFast);

    let mut page = page_with(&["2401.00002", "2401.00004"]);
    let report = h.pipeline.run(&mut page, &StopSignal::new()).await;
    assert!(matches!(report.state, RunState::Aborted { index: 0, .. }));
    assert_eq!(report.items.len(), 1);
}

#[tokio::test]
async fn set_policy_changes_later_runs() {
    let mut h = harness(FakeFetcher::failing_pdf("2401.00002", 500), &[]);
    h.pipeline.set_policy(FailurePolicy::Isolate);

    let mut page = page_with(&["2401.00002", "2401.00003"]);
    let report = h.pipeline.run(&mut page, &StopSignal::new()).await;
    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.annotated(), 1);
}
