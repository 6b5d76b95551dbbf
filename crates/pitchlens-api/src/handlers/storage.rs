//! Signed URL handlers.
//!
//! The browser uploads clips straight to the bucket and plays them back
//! from it; both directions go through short-lived presigned URLs issued
//! here, so the bucket credentials never leave the server.

use std::time::Duration;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::security::validate_object_key;
use crate::state::AppState;

/// TTL for presigned write URLs.
const UPLOAD_URL_TTL: Duration = Duration::from_secs(15 * 60);

/// TTL for presigned read URLs.
const READ_URL_TTL: Duration = Duration::from_secs(60 * 60);

/// Signed URL response.
#[derive(Serialize)]
pub struct SignedUrlResponse {
    pub url: String,
}

/// Query parameters for upload URL issuance.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlParams {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Issue a presigned write URL for a clip upload.
pub async fn get_upload_url(
    State(state): State<AppState>,
    Query(params): Query<UploadUrlParams>,
) -> ApiResult<Json<SignedUrlResponse>> {
    let filename = params
        .filename
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("Filename is required"))?;
    let content_type = params
        .content_type
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("Content type is required"))?;

    validate_object_key(filename).map_err(ApiError::BadRequest)?;

    let url = state
        .storage
        .presign_put(filename, content_type, UPLOAD_URL_TTL)
        .await?;

    Ok(Json(SignedUrlResponse { url }))
}

/// Query parameters for read URL issuance.
#[derive(Deserialize)]
pub struct SignedUrlParams {
    #[serde(default)]
    pub filename: Option<String>,
}

/// Issue a presigned read URL for clip playback.
pub async fn get_signed_url(
    State(state): State<AppState>,
    Query(params): Query<SignedUrlParams>,
) -> ApiResult<Json<SignedUrlResponse>> {
    let filename = params
        .filename
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("Filename is required"))?;

    validate_object_key(filename).map_err(ApiError::BadRequest)?;

    let url = state.storage.presign_get(filename, READ_URL_TTL).await?;

    Ok(Json(SignedUrlResponse { url }))
}
