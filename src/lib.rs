//! # arxiv-affiliations
//!
//! Annotates arXiv links in an HTML page with the institutions of the
//! paper's authors, read off the first PDF page by a language model.
//!
//! ## Modules
//!
//! - [`arxiv`] - Identifier extraction and arXiv URLs
//! - [`fetch`] - Remote fetchers for HTML and PDF
//! - [`title`] - Title resolution from the abstract page
//! - [`pdf`] - First-page text extraction
//! - [`affiliations`] - LLM-based affiliation extraction
//! - [`cache`] - Persistent result cache with TTL
//! - [`store`] - Key-value persistence
//! - [`page`] - Link discovery and annotation
//! - [`pipeline`] - Sequential controller
//! - [`observer`] - Progress reporting and log panel
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use arxiv_affiliations::{config::AppConfig, observer::TracingObserver, page::HtmlPage,
//!     pipeline::StopSignal, store::JsonFileStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::with_api_key("sk-...".to_string());
//!     let mut pipeline = config.build_pipeline(Arc::new(JsonFileStore::new()?), Arc::new(TracingObserver))?;
//!     let mut page = HtmlPage::parse(std::fs::read_to_string("page.html")?);
//!     let report = pipeline.run(&mut page, &StopSignal::new()).await;
//!     println!("Annotated {} links", report.annotated());
//!     std::fs::write("page.annotated.html", page.render())?;
//!     Ok(())
//! }
//! ```

pub mod affiliations;
pub mod arxiv;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod error;
pub mod fetch;
pub mod observer;
pub mod page;
pub mod pdf;
pub mod pipeline;
pub mod prompts;
pub mod store;
pub mod title;

pub use error::{AffError, Result};
