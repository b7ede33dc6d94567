//! arxiv-affiliations - annotate arXiv links with author affiliations
//!
//! ## Usage
//!
//! ### CLI Mode
//! ```bash
//! arxiv-affiliations annotate reading-list.html -o annotated.html
//! ```
//!
//! ### HTTP Bridge Mode
//! ```bash
//! arxiv-affiliations serve --port 3000
//! ```

use anyhow::{Context, Result};
use arxiv_affiliations::{
    affiliations::{DEFAULT_LLM_BASE_URL, DEFAULT_MODEL},
    arxiv::DEFAULT_ARXIV_URL,
    cache::ResultCache,
    config::AppConfig,
    credentials,
    fetch::{FetchOptions, HttpFetcher, RemoteFetcher},
    observer::{LogPanel, PipelineObserver, TracingObserver},
    page::HtmlPage,
    pipeline::{FailurePolicy, Pipeline, RunReport, RunState, StopSignal},
    store::{JsonFileStore, KeyValueStore, MemoryStore},
};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;

// ============================================================================
// CLI Definition
// ============================================================================

/// Annotate arXiv links with the affiliations of the paper's authors
#[derive(Parser)]
#[command(name = "arxiv-affiliations")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging and the log panel
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Store file for cache and API key (default: ~/.arxiv_affiliations.json)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Annotate the arXiv links of one HTML page
    Annotate {
        /// HTML file path or http(s) URL
        input: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write a per-link CSV report
        #[arg(long)]
        report: Option<PathBuf>,

        /// Write the last 120 progress lines to this file
        #[arg(long)]
        log_panel: Option<PathBuf>,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Run as HTTP bridge for browser extensions and userscripts
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Keep the cache in memory only
        #[arg(long)]
        ephemeral: bool,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Manage the affiliation cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Manage the stored API key
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
}

#[derive(Args, Clone)]
struct PipelineArgs {
    /// LLM API key (prompted for and stored if absent)
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    llm_key: Option<String>,

    /// LLM API base URL
    #[arg(long, default_value = DEFAULT_LLM_BASE_URL)]
    llm_base_url: String,

    /// LLM model name
    #[arg(long, default_value = DEFAULT_MODEL)]
    llm_model: String,

    /// arXiv base URL (mirror)
    #[arg(long, default_value = DEFAULT_ARXIV_URL)]
    arxiv_url: String,

    /// Proxy URL (e.g., http://127.0.0.1:7890)
    #[arg(long)]
    proxy: Option<String>,

    /// Per-request timeout in seconds (default: none)
    #[arg(long)]
    timeout: Option<u64>,

    /// Skip failed links instead of stopping the run
    #[arg(long)]
    isolate_failures: bool,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Clear all cached affiliations
    Clear,
    /// Show store file path
    Path,
    /// Show entry counts
    Stats,
}

#[derive(Subcommand)]
enum KeyAction {
    /// Prompt for the API key and store it
    Set,
    /// Remove the stored API key
    Clear,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if cli.log_json {
        fmt().json().with_env_filter(filter).with_writer(std::io::stderr).init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let store = open_store(cli.store.clone())?;

    match cli.command {
        Commands::Annotate {
            input,
            output,
            report,
            log_panel,
            pipeline,
        } => run_annotate(input, output, report, log_panel, pipeline, store, cli.debug).await,
        Commands::Serve {
            port,
            host,
            ephemeral,
            pipeline,
        } => {
            let store: Arc<dyn KeyValueStore> = if ephemeral {
                Arc::new(MemoryStore::new())
            } else {
                store
            };
            run_server(host, port, pipeline, store).await
        }
        Commands::Cache { action } => handle_cache(action, store, cli.store),
        Commands::Key { action } => handle_key(action, store),
    }
}

fn open_store(path: Option<PathBuf>) -> Result<Arc<dyn KeyValueStore>> {
    let store = match path {
        Some(path) => JsonFileStore::with_path(path),
        None => JsonFileStore::new()?,
    };
    Ok(Arc::new(store))
}

/// Resolve the credential and turn CLI arguments into an [`AppConfig`]
fn build_config(args: &PipelineArgs, store: &dyn KeyValueStore) -> Result<AppConfig> {
    let stdin = std::io::stdin();
    let api_key = credentials::resolve_api_key(
        args.llm_key.as_deref(),
        store,
        &mut stdin.lock(),
        &mut std::io::stderr(),
    )
    .context("An OpenAI API key is required")?;

    let mut config = AppConfig::with_api_key(api_key);
    config.arxiv_base_url = args.arxiv_url.clone();
    config.llm.base_url = args.llm_base_url.clone();
    config.llm.model = args.llm_model.clone();
    config.fetch = FetchOptions {
        proxy: args.proxy.clone(),
        timeout: args.timeout.map(Duration::from_secs),
    };
    config.policy = FailurePolicy::from_isolate(args.isolate_failures);
    config.validate()?;
    Ok(config)
}

// ============================================================================
// Annotate
// ============================================================================

async fn run_annotate(
    input: String,
    output: Option<PathBuf>,
    report_path: Option<PathBuf>,
    log_panel: Option<PathBuf>,
    args: PipelineArgs,
    store: Arc<dyn KeyValueStore>,
    debug: bool,
) -> Result<()> {
    let config = build_config(&args, store.as_ref())?;
    let html = read_input(&input, &config.fetch).await?;

    let panel = Arc::new(LogPanel::new());
    let observer: Arc<dyn PipelineObserver> = if debug || log_panel.is_some() {
        panel.clone()
    } else {
        Arc::new(TracingObserver)
    };

    let mut pipeline = config.build_pipeline(store, observer)?;

    // First Ctrl-C stops at the next link boundary, a second one exits
    let stop = StopSignal::new();
    tokio::spawn(watch_interrupts(stop.clone()));

    let mut page = HtmlPage::parse(html);
    let report = pipeline.run(&mut page, &stop).await;

    let annotated = page.render();
    match &output {
        Some(path) => {
            std::fs::write(path, &annotated)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Saved: {:?}", path);
        }
        None => println!("{}", annotated),
    }

    if let Some(path) = &report_path {
        save_report_csv(path, &report)?;
    }

    if let Some(path) = &log_panel {
        std::fs::write(path, panel.contents()).context("Failed to write log panel")?;
    }

    eprintln!(
        "Links: {}, annotated: {}",
        report.items.len(),
        report.annotated()
    );

    match report.state {
        RunState::Completed => Ok(()),
        RunState::Stopped { next_index } => {
            eprintln!("Stopped before link {}", next_index + 1);
            Ok(())
        }
        RunState::Aborted { index, error } => {
            anyhow::bail!("Run aborted at link {}: {}", index + 1, error)
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    /// Stop at the next link boundary
    Stop,
    /// Already stopping; leave now
    Exit,
}

fn on_interrupt(stop: &StopSignal) -> Interrupt {
    if stop.is_stopped() {
        return Interrupt::Exit;
    }
    stop.stop();
    Interrupt::Stop
}

async fn watch_interrupts(stop: StopSignal) {
    while tokio::signal::ctrl_c().await.is_ok() {
        match on_interrupt(&stop) {
            Interrupt::Stop => {
                warn!("Stop requested, finishing current link (Ctrl-C again to exit)");
            }
            Interrupt::Exit => {
                warn!("Second interrupt, exiting without finishing the current link");
                std::process::exit(130);
            }
        }
    }
}

/// Read the page from a file or, for http(s) inputs, over the network
async fn read_input(input: &str, options: &FetchOptions) -> Result<String> {
    match Url::parse(input) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            info!(url = %url, "Fetching input page");
            let fetcher = HttpFetcher::new(options)?;
            Ok(fetcher.fetch_text(url.as_str()).await?)
        }
        _ => std::fs::read_to_string(input).with_context(|| format!("Failed to read {}", input)),
    }
}

/// One CSV row per link reached
#[derive(Debug, Serialize)]
struct ReportRow {
    index: usize,
    href: String,
    arxiv_id: String,
    title: String,
    outcome: String,
    affiliations: String,
    error: String,
}

/// Save run report to CSV file
fn save_report_csv(path: &Path, report: &RunReport) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .context("Failed to create CSV writer")?;

    for item in &report.items {
        let outcome = serde_json::to_value(item.outcome)?
            .as_str()
            .unwrap_or_default()
            .to_string();
        wtr.serialize(ReportRow {
            index: item.index + 1,
            href: item.href.clone(),
            arxiv_id: item.arxiv_id.as_ref().map(|id| id.to_string()).unwrap_or_default(),
            title: item.title.clone().unwrap_or_default(),
            outcome,
            affiliations: item.affiliations.join("; "),
            error: item.error.clone().unwrap_or_default(),
        })
        .context("Failed to write CSV record")?;
    }

    wtr.flush().context("Failed to flush CSV")?;
    eprintln!("Saved: {:?}", path);
    Ok(())
}

// ============================================================================
// HTTP Bridge
// ============================================================================

async fn run_server(host: String, port: u16, args: PipelineArgs, store: Arc<dyn KeyValueStore>) -> Result<()> {
    let config = build_config(&args, store.as_ref())?;
    let pipeline = config.build_pipeline(store, Arc::new(TracingObserver))?;

    // One run at a time: the cache has a single writer
    let app_state = Arc::new(AppState {
        pipeline: Mutex::new(pipeline),
    });

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/annotate", post(annotate_handler))
        .route("/cache/clear", post(cache_clear_handler))
        .route("/cache/stats", get(cache_stats_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid host:port")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "HTTP bridge listening");
    eprintln!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("Server error")?;

    Ok(())
}

struct AppState {
    pipeline: Mutex<Pipeline>,
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
struct AnnotateRequest {
    html: String,
    /// Overrides the server's failure policy for this request
    #[serde(default)]
    isolate_failures: Option<bool>,
}

impl AnnotateRequest {
    fn policy(&self, configured: FailurePolicy) -> FailurePolicy {
        self.isolate_failures
            .map(FailurePolicy::from_isolate)
            .unwrap_or(configured)
    }
}

#[derive(Debug, Serialize)]
struct AnnotateResponse {
    html: String,
    report: RunReport,
}

/// Annotate a posted page and return it with the run report
async fn annotate_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnnotateRequest>,
) -> Json<AnnotateResponse> {
    let mut pipeline = state.pipeline.lock().await;
    let policy = req.policy(pipeline.policy());
    let mut page = HtmlPage::parse(req.html);
    let report = pipeline
        .run_with_policy(&mut page, &StopSignal::new(), policy)
        .await;
    drop(pipeline);

    if let RunState::Aborted { error, .. } = &report.state {
        error!(error = %error, "Annotate request aborted");
    }
    Json(AnnotateResponse {
        html: page.render(),
        report,
    })
}

#[derive(Debug, Serialize)]
struct CacheStatsResponse {
    entries: usize,
    expired: usize,
}

async fn cache_clear_handler(State(state): State<Arc<AppState>>) -> Result<StatusCode, (StatusCode, String)> {
    let mut pipeline = state.pipeline.lock().await;
    pipeline
        .cache_mut()
        .clear()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn cache_stats_handler(State(state): State<Arc<AppState>>) -> Json<CacheStatsResponse> {
    let stats = state.pipeline.lock().await.cache().stats();
    Json(CacheStatsResponse {
        entries: stats.entries,
        expired: stats.expired,
    })
}

// ============================================================================
// Cache & Key Management
// ============================================================================

fn handle_cache(action: CacheAction, store: Arc<dyn KeyValueStore>, path: Option<PathBuf>) -> Result<()> {
    match action {
        CacheAction::Clear => {
            ResultCache::load(store)?.clear()?;
            println!("Affiliation cache cleared.");
        }
        CacheAction::Path => {
            let path = match path {
                Some(path) => path,
                None => arxiv_affiliations::store::default_store_path()?,
            };
            println!("Store file: {:?}", path);
        }
        CacheAction::Stats => {
            let stats = ResultCache::load(store)?.stats();
            println!("Entries: {} ({} expired)", stats.entries, stats.expired);
        }
    }
    Ok(())
}

fn handle_key(action: KeyAction, store: Arc<dyn KeyValueStore>) -> Result<()> {
    match action {
        KeyAction::Set => {
            let stdin = std::io::stdin();
            credentials::prompt_api_key(store.as_ref(), &mut stdin.lock(), &mut std::io::stderr())?;
            println!("API key stored.");
        }
        KeyAction::Clear => {
            credentials::clear_api_key(store.as_ref())?;
            println!("API key removed.");
        }
    }
    Ok(())
}
