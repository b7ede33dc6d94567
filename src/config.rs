//! Runtime configuration.
//!
//! Everything the pipeline needs is passed in explicitly through
//! [`AppConfig`]; nothing is read from globals.

use crate::affiliations::{LlmConfig, OpenAiClient, DEFAULT_LLM_BASE_URL, DEFAULT_MODEL};
use crate::arxiv::{ArxivEndpoints, DEFAULT_ARXIV_URL};
use crate::cache::ResultCache;
use crate::error::{AffError, Result};
use crate::fetch::{FetchOptions, HttpFetcher};
use crate::observer::PipelineObserver;
use crate::pdf::LopdfRenderer;
use crate::pipeline::{FailurePolicy, Pipeline};
use crate::store::KeyValueStore;
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub arxiv_base_url: String,
    pub llm: LlmConfig,
    pub fetch: FetchOptions,
    pub policy: FailurePolicy,
}

impl AppConfig {
    /// Defaults for everything but the credential
    pub fn with_api_key(api_key: String) -> Self {
        Self {
            arxiv_base_url: DEFAULT_ARXIV_URL.to_string(),
            llm: LlmConfig {
                base_url: DEFAULT_LLM_BASE_URL.to_string(),
                api_key,
                model: DEFAULT_MODEL.to_string(),
            },
            fetch: FetchOptions::default(),
            policy: FailurePolicy::default(),
        }
    }

    /// Check base URLs and the model name
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("arXiv base URL", &self.arxiv_base_url),
            ("LLM base URL", &self.llm.base_url),
        ] {
            let url = Url::parse(value)
                .map_err(|e| AffError::Config(format!("Invalid {} '{}': {}", name, value, e)))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(AffError::Config(format!(
                    "{} must be http(s): {}",
                    name, value
                )));
            }
        }
        if self.llm.model.trim().is_empty() {
            return Err(AffError::Config("LLM model name is empty".to_string()));
        }
        Ok(())
    }

    /// Wire the production collaborators into a pipeline.
    pub fn build_pipeline(
        &self,
        store: Arc<dyn KeyValueStore>,
        observer: Arc<dyn PipelineObserver>,
    ) -> Result<Pipeline> {
        self.validate()?;

        let fetcher = HttpFetcher::new(&self.fetch)?;
        let llm = OpenAiClient::new(self.llm.clone(), &self.fetch)?;
        let cache = ResultCache::load(store)?;

        Ok(Pipeline::new(Arc::new(fetcher), Arc::new(LopdfRenderer), Arc::new(llm), cache)
            .with_endpoints(ArxivEndpoints::new(&self.arxiv_base_url))
            .with_observer(observer)
            .with_policy(self.policy))
    }
}
