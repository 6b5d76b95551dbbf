//! API error types.
//!
//! Every failure of the analysis pipeline is a distinct variant with its own
//! status code; callers branch on the variant, never on message text.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pitchlens_gemini::GeminiError;
use pitchlens_storage::StorageError;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Upstream fetch failed: {0}")]
    UpstreamFetch(String),

    #[error("File processing failed: {0}")]
    ProcessingFailed(String),

    #[error("File processing timed out: {0}")]
    ProcessingTimeout(String),

    #[error("Unexpected provider state: {0}")]
    UnexpectedProviderState(String),

    #[error("Failed to extract structured report")]
    ExtractionFailed {
        /// Raw text the model returned instead of the tool call.
        text: String,
    },

    #[error("Report failed schema validation: {}", .violations.join("; "))]
    SchemaValidation { violations: Vec<String> },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Gemini error: {0}")]
    Gemini(#[from] GeminiError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable kind discriminant for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "invalid_request",
            ApiError::NotFound(_) => "not_found",
            ApiError::PayloadTooLarge(_) => "payload_too_large",
            ApiError::UpstreamFetch(_) => "upstream_fetch",
            ApiError::ProcessingFailed(_) => "processing_failed",
            ApiError::ProcessingTimeout(_) => "processing_timeout",
            ApiError::UnexpectedProviderState(_) => "unexpected_provider_state",
            ApiError::ExtractionFailed { .. } => "extraction_failed",
            ApiError::SchemaValidation { .. } => "schema_validation",
            ApiError::Internal(_) => "internal",
            ApiError::Storage(StorageError::NotFound(_)) => "not_found",
            ApiError::Storage(_) => "storage",
            ApiError::Gemini(GeminiError::FileNotFound(_)) => "not_found",
            ApiError::Gemini(_) => "provider",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UpstreamFetch(_) => StatusCode::BAD_GATEWAY,
            ApiError::ProcessingTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Storage(StorageError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Gemini(GeminiError::FileNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::ProcessingFailed(_)
            | ApiError::UnexpectedProviderState(_)
            | ApiError::ExtractionFailed { .. }
            | ApiError::SchemaValidation { .. }
            | ApiError::Internal(_)
            | ApiError::Storage(_)
            | ApiError::Gemini(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            ApiError::SchemaValidation { violations } => ErrorResponse {
                error: "Failed to generate report in the correct format.".to_string(),
                details: Some(json!(violations)),
            },
            ApiError::ExtractionFailed { text } => ErrorResponse {
                error: "Failed to extract structured report.".to_string(),
                details: Some(json!(format!("Model returned text: {}", text))),
            },
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::PayloadTooLarge(msg) => ErrorResponse {
                error: msg.clone(),
                details: None,
            },
            // Don't expose internal error details in production
            ApiError::Internal(_) | ApiError::Storage(_) | ApiError::Gemini(_)
                if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" =>
            {
                ErrorResponse {
                    error: "Analysis failed".to_string(),
                    details: None,
                }
            }
            _ => ErrorResponse {
                error: "Analysis failed".to_string(),
                details: Some(json!(self.to_string())),
            },
        };

        (status, Json(body)).into_response()
    }
}
