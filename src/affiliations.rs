//! LLM-based affiliation extraction.
//!
//! One non-streaming chat completion per paper at temperature 0. The reply
//! is read as one institution per line, trimmed, and deduplicated in
//! first-seen order.

use crate::error::{AffError, OptionExt, Result};
use crate::fetch::{build_http_client, FetchOptions};
use crate::prompts::affiliations::build_user_prompt;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::{debug, info};

/// Default OpenAI-compatible API base URL
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const LLM_CONTEXT: &str = "LLM request failed";

/// LLM configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

/// Language-model capability: prompt in, message content out.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Token usage reported by the endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// OpenAI-compatible API response structures
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

/// Chat completions client for OpenAI-compatible endpoints
pub struct OpenAiClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig, options: &FetchOptions) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(AffError::Config("LLM API key is empty".to_string()));
        }
        Ok(Self {
            client: build_http_client(options)?,
            config,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl ChatCompletion for OpenAiClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request_body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "temperature": 0
        });

        let api_url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        debug!(model = %self.config.model, prompt_chars = prompt.len(), "Sending LLM request");

        let response = self
            .client
            .post(&api_url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request_body)
            .send()
            .await
            .map_err(|e| AffError::network(LLM_CONTEXT, e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(AffError::http(LLM_CONTEXT, status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AffError::network(LLM_CONTEXT, e))?;

        let (content, usage) = parse_completion_body(&body)?;
        if let Some(usage) = usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "LLM token usage"
            );
        }
        Ok(content)
    }
}

/// Read `choices[0].message.content` out of a chat completion body.
///
/// Any missing piece is a [`AffError::Parse`]: the service changed its
/// contract, which is not a transient condition.
pub fn parse_completion_body(body: &str) -> Result<(String, Option<TokenUsage>)> {
    let api_response: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| AffError::Parse(format!("Failed to parse LLM response: {}", e)))?;

    let usage = api_response.usage.map(|u| TokenUsage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
    });

    let content = api_response
        .choices
        .into_iter()
        .next()
        .ok_or_parse("LLM response has no choices")?
        .message
        .content
        .ok_or_parse("LLM response has no message content")?;

    Ok((content, usage))
}

/// Split a reply into trimmed, non-empty, unique lines in first-seen order.
pub fn parse_affiliation_lines(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    content
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| seen.insert(*line))
        .map(str::to_string)
        .collect()
}

/// Extract the affiliation list for one paper's first page.
pub async fn extract_affiliations(llm: &dyn ChatCompletion, page_text: &str) -> Result<Vec<String>> {
    let prompt = build_user_prompt(page_text);
    let content = llm.complete(&prompt).await?;
    let affiliations = parse_affiliation_lines(&content);
    info!(count = affiliations.len(), "Affiliations extracted");
    Ok(affiliations)
}
