//! Gemini client error types.

use thiserror::Error;

/// Result type for Gemini operations.
pub type GeminiResult<T> = Result<T, GeminiError>;

/// Errors that can occur talking to the Gemini APIs.
#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("Failed to configure Gemini client: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Gemini API returned {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("Remote file not found: {0}")]
    FileNotFound(String),

    #[error("Malformed Gemini response: {0}")]
    InvalidResponse(String),

    #[error("Model returned text instead of the expected function call")]
    MissingToolCall {
        /// Concatenated text parts of the response, for diagnostics.
        text: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GeminiError {
    /// Classify a non-success HTTP response.
    ///
    /// `resource` names the file handle for 404s so the caller can tell a
    /// vanished handle apart from other request failures.
    pub fn from_http_status(status: u16, body: String, resource: &str) -> Self {
        if status == 404 {
            Self::FileNotFound(resource.to_string())
        } else {
            Self::RequestFailed { status, body }
        }
    }

    /// True when the error means the remote file is already gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::FileNotFound(_))
    }
}
