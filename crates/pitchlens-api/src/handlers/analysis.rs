//! Tactical analysis handler.

use axum::extract::State;
use axum::Json;
use pitchlens_models::{AnalyzeTacticsRequest, TacticalReport};

use crate::error::ApiResult;
use crate::state::AppState;

/// Run a tactical analysis over a stored or preset clip.
///
/// Blocks until the full pipeline finishes: the remote file upload, the
/// readiness poll, the structured generation call and report validation.
/// The remote file is deleted before this returns, whatever the outcome.
pub async fn analyze_tactics(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeTacticsRequest>,
) -> ApiResult<Json<TacticalReport>> {
    let report = state.analysis.analyze(&request).await?;
    Ok(Json(report))
}
