//! Custom error types for arxiv-affiliations.
//!
//! All library functions return `Result<T, AffError>`. Not finding an arXiv
//! identifier in a link is not an error; it is `None` from
//! [`crate::arxiv::extract_id`].

use thiserror::Error;

/// Main error type for the affiliation pipeline.
#[derive(Debug, Error)]
pub enum AffError {
    /// Transport-level failure (DNS, connection reset, body read)
    #[error("{context}: network error: {message}")]
    Network {
        /// What was being fetched
        context: String,
        /// Underlying transport message
        message: String,
    },

    /// Remote answered with a status other than 200
    #[error("{context}: HTTP {status}")]
    Http {
        /// What was being fetched
        context: String,
        /// HTTP status code
        status: u16,
    },

    /// PDF could not be loaded or its first page rendered
    #[error("PDF render error: {0}")]
    Render(String),

    /// Response did not have the expected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// Key-value store could not be read or written
    #[error("Store error: {0}")]
    Store(String),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),
}

impl AffError {
    /// Wrap a `reqwest` transport error with the operation it interrupted.
    pub fn network(context: impl Into<String>, err: reqwest::Error) -> Self {
        AffError::Network {
            context: context.into(),
            message: err.to_string(),
        }
    }

    /// Build an HTTP status error.
    pub fn http(context: impl Into<String>, status: u16) -> Self {
        AffError::Http {
            context: context.into(),
            status,
        }
    }
}

/// Result type alias using `AffError`
pub type Result<T> = std::result::Result<T, AffError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| AffError::Parse(msg.to_string()))
    }
}
