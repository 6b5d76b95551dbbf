//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::analysis::analyze_tactics;
use crate::handlers::health::{health, ready};
use crate::handlers::storage::{get_signed_url, get_upload_url};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    RateLimiterCache,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let rate_limiter = std::sync::Arc::new(RateLimiterCache::new(state.config.rate_limit_rps));

    let api_routes = Router::new()
        .route("/analyze/tactics", post(analyze_tactics))
        .route("/storage/upload-url", get(get_upload_url))
        .route("/storage/signed-url", get(get_signed_url))
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        // Bodies are JSON only; clip bytes travel through presigned URLs
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use pitchlens_gemini::{GeminiClient, GeminiConfig};
    use pitchlens_storage::{StorageClient, StorageConfig};
    use tower::ServiceExt;

    use super::*;
    use crate::config::ApiConfig;
    use crate::services::AnalysisService;

    fn test_state() -> AppState {
        let storage = Arc::new(StorageClient::new(StorageConfig {
            endpoint_url: "http://localhost:1".to_string(),
            access_key_id: "test-key".to_string(),
            secret_access_key: "test-secret".to_string(),
            bucket_name: "clips".to_string(),
            region: "auto".to_string(),
        }));
        let gemini = Arc::new(
            GeminiClient::new(GeminiConfig {
                base_url: "http://localhost:1".to_string(),
                api_key: "test-key".to_string(),
                model: "gemini-2.0-flash".to_string(),
                timeout: Duration::from_secs(1),
            })
            .unwrap(),
        );
        let config = ApiConfig::default();
        let analysis = AnalysisService::new(
            Arc::clone(&storage),
            Arc::clone(&gemini),
            reqwest::Client::new(),
            config.analysis.clone(),
        );

        AppState {
            config,
            storage,
            gemini,
            analysis,
        }
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_router(test_state(), None);

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_analyze_rejects_empty_source() {
        let app = create_router(test_state(), None);

        let response = app
            .oneshot(
                Request::post("/api/analyze/tactics")
                    .header("Content-Type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_url_requires_params() {
        let app = create_router(test_state(), None);

        let response = app
            .oneshot(
                Request::get("/api/storage/upload-url?filename=clip.mp4")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        // contentType missing
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_security_headers_present() {
        let app = create_router(test_state(), None);

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(
            response.headers().get("X-Content-Type-Options").unwrap(),
            "nosniff"
        );
        assert!(response.headers().contains_key("X-Request-ID"));
    }
}
