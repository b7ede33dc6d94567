//! Remote fetchers for abstract pages and PDFs.
//!
//! Both operations are single attempt. A non-200 answer is an
//! [`AffError::Http`], a transport failure is an [`AffError::Network`].

use crate::error::{AffError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// User agent string for requests
const USER_AGENT: &str = concat!("arxiv-affiliations/", env!("CARGO_PKG_VERSION"));

/// Context used in errors for text documents
pub const TEXT_CONTEXT: &str = "Page download failed";

/// Context used in errors for PDFs
pub const PDF_CONTEXT: &str = "PDF download failed";

/// Fetch capability used by the pipeline
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// GET a text document (HTML)
    async fn fetch_text(&self, url: &str) -> Result<String>;

    /// GET a binary document (PDF)
    async fn fetch_binary(&self, url: &str) -> Result<Vec<u8>>;
}

/// Options for the HTTP fetcher
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Proxy URL (e.g., "http://127.0.0.1:7890")
    pub proxy: Option<String>,
    /// Per-request timeout; none by default
    pub timeout: Option<Duration>,
}

/// `reqwest`-backed fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(options: &FetchOptions) -> Result<Self> {
        Ok(Self {
            client: build_http_client(options)?,
        })
    }

    async fn get(&self, url: &str, context: &str) -> Result<reqwest::Response> {
        debug!(url = url, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AffError::network(context, e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(AffError::http(context, status.as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        self.get(url, TEXT_CONTEXT)
            .await?
            .text()
            .await
            .map_err(|e| AffError::network(TEXT_CONTEXT, e))
    }

    async fn fetch_binary(&self, url: &str) -> Result<Vec<u8>> {
        let bytes = self
            .get(url, PDF_CONTEXT)
            .await?
            .bytes()
            .await
            .map_err(|e| AffError::network(PDF_CONTEXT, e))?;
        Ok(bytes.to_vec())
    }
}

/// Build HTTP client with optional proxy and timeout
pub(crate) fn build_http_client(options: &FetchOptions) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);

    if let Some(timeout) = options.timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(proxy_url) = options.proxy.as_deref() {
        let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| {
            AffError::Config(format!("Invalid proxy URL '{}': {}", proxy_url, e))
        })?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| AffError::Config(format!("Failed to build HTTP client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};

    /// Serve `router` on an ephemeral local port and return its base URL
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{}", addr)
    }

    fn test_router() -> Router {
        Router::new()
            .route("/abs/2401.00001", get(|| async { "<title>Paper | arXiv</title>" }))
            .route("/abs/broken", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .route("/pdf/2401.00001.pdf", get(|| async { vec![0x25u8, 0x50, 0x44, 0x46] }))
            .route("/pdf/missing.pdf", get(|| async { StatusCode::NOT_FOUND }))
            .route("/pdf/moved.pdf", get(|| async { StatusCode::NO_CONTENT }))
    }

    #[tokio::test]
    async fn test_fetch_text_and_binary() -> Result<()> {
        let base = serve(test_router()).await;
        let fetcher = HttpFetcher::new(&FetchOptions::default())?;

        let html = fetcher.fetch_text(&format!("{}/abs/2401.00001", base)).await?;
        assert_eq!(html, "<title>Paper | arXiv</title>");

        let pdf = fetcher.fetch_binary(&format!("{}/pdf/2401.00001.pdf", base)).await?;
        assert_eq!(pdf, b"%PDF".to_vec());
        Ok(())
    }

    #[tokio::test]
    async fn test_non_200_is_http_error_with_context() -> Result<()> {
        let base = serve(test_router()).await;
        let fetcher = HttpFetcher::new(&FetchOptions::default())?;

        match fetcher.fetch_binary(&format!("{}/pdf/missing.pdf", base)).await {
            Err(AffError::Http { context, status }) => {
                assert_eq!(context, PDF_CONTEXT);
                assert_eq!(status, 404);
            }
            other => panic!("expected HTTP error, got {:?}", other),
        }

        // any status other than 200 counts, not only 4xx/5xx
        assert!(matches!(
            fetcher.fetch_binary(&format!("{}/pdf/moved.pdf", base)).await,
            Err(AffError::Http { status: 204, .. })
        ));

        match fetcher.fetch_text(&format!("{}/abs/broken", base)).await {
            Err(AffError::Http { context, status }) => {
                assert_eq!(context, TEXT_CONTEXT);
                assert_eq!(status, 500);
            }
            other => panic!("expected HTTP error, got {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_refused_connection_is_network_error() -> Result<()> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        drop(listener);

        let fetcher = HttpFetcher::new(&FetchOptions::default())?;
        match fetcher.fetch_binary(&format!("http://{}/pdf/2401.00001.pdf", addr)).await {
            Err(AffError::Network { context, .. }) => assert_eq!(context, PDF_CONTEXT),
            other => panic!("expected network error, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_invalid_proxy_is_config_error() {
        let options = FetchOptions {
            proxy: Some("not a url".to_string()),
            timeout: None,
        };
        assert!(matches!(HttpFetcher::new(&options), Err(AffError::Config(_))));
    }

    #[test]
    fn test_default_client_builds() {
        assert!(HttpFetcher::new(&FetchOptions::default()).is_ok());
    }
}
