//! Tactical analysis orchestration.
//!
//! One request runs the whole file lifecycle against the provider:
//! resolve the clip bytes, upload them to the file API, poll until the
//! remote file is `ACTIVE`, run the forced-tool-call generation, validate
//! the report shape, and delete the remote file. The delete runs exactly
//! once whenever an upload produced a handle, no matter which stage failed,
//! and completes before the caller sees the outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pitchlens_gemini::{FileState, GeminiClient, GeminiError, RemoteFile};
use pitchlens_models::{AnalysisSource, AnalyzeTacticsRequest, TacticalReport};
use pitchlens_storage::StorageClient;
use tracing::{debug, info, warn};

use crate::config::AnalysisConfig;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::security::{validate_object_key, validate_preset_url};

/// Orchestrates one tactical analysis per call.
#[derive(Clone)]
pub struct AnalysisService {
    storage: Arc<StorageClient>,
    gemini: Arc<GeminiClient>,
    http: reqwest::Client,
    config: AnalysisConfig,
}

impl AnalysisService {
    /// Create a new analysis service.
    pub fn new(
        storage: Arc<StorageClient>,
        gemini: Arc<GeminiClient>,
        http: reqwest::Client,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            storage,
            gemini,
            http,
            config,
        }
    }

    /// Run the full analysis pipeline for one request.
    pub async fn analyze(&self, request: &AnalyzeTacticsRequest) -> ApiResult<TacticalReport> {
        let source = request
            .source()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;

        let started = Instant::now();
        let mut file_name: Option<String> = None;

        let result = self.run_pipeline(&source, &mut file_name).await;

        // Cleanup must finish before the outcome is reported.
        if let Some(name) = file_name {
            self.cleanup(&name).await;
        }

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        metrics::record_analysis(outcome, started.elapsed().as_secs_f64());

        result
    }

    /// Upload, poll, generate and validate.
    ///
    /// Writes the remote file name into `file_name` as soon as the upload
    /// returns, so the caller can clean up even when a later stage fails.
    async fn run_pipeline(
        &self,
        source: &AnalysisSource,
        file_name: &mut Option<String>,
    ) -> ApiResult<TacticalReport> {
        let (bytes, content_type) = self.fetch_source(source).await?;
        let display_name = source.display_name();

        let file = self
            .gemini
            .upload_file(bytes, &content_type, &display_name)
            .await?;
        *file_name = Some(file.name.clone());

        let file = self.wait_until_active(file).await?;

        let args = self.gemini.generate_report(&file).await.map_err(|e| match e {
            GeminiError::MissingToolCall { text } => {
                warn!(file = %file.name, "Model returned text instead of the report tool call");
                ApiError::ExtractionFailed { text }
            }
            other => ApiError::from(other),
        })?;

        TacticalReport::from_args(&args).map_err(|e| {
            warn!(
                file = %file.name,
                payload = %e.payload,
                "Report payload failed schema validation: {}",
                e.violations.join("; ")
            );
            ApiError::SchemaValidation {
                violations: e.violations,
            }
        })
    }

    /// Resolve the request source into clip bytes and a content type.
    async fn fetch_source(&self, source: &AnalysisSource) -> ApiResult<(Vec<u8>, String)> {
        match source {
            AnalysisSource::StoredObject(key) => {
                validate_object_key(key).map_err(ApiError::BadRequest)?;

                // Size ceiling is enforced against reported metadata before
                // the body is downloaded.
                let metadata = self.storage.get_metadata(key).await?;
                if metadata.size_bytes > self.config.max_upload_bytes {
                    return Err(ApiError::PayloadTooLarge(format!(
                        "File too large. Max size is {}MB.",
                        self.config.max_upload_bytes / (1024 * 1024)
                    )));
                }

                info!(
                    "Downloading stored clip {} ({} bytes) for analysis",
                    key, metadata.size_bytes
                );
                let bytes = self.storage.download_bytes(key).await?;
                let content_type = metadata
                    .content_type
                    .unwrap_or_else(|| "video/mp4".to_string());
                Ok((bytes, content_type))
            }
            AnalysisSource::PresetUrl(raw) => {
                let url = validate_preset_url(raw, self.config.allow_private_preset_hosts)
                    .map_err(ApiError::BadRequest)?;

                info!("Fetching preset clip from {}", url);
                let response = self
                    .http
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| ApiError::UpstreamFetch(e.to_string()))?;

                if !response.status().is_success() {
                    return Err(ApiError::UpstreamFetch(format!(
                        "Failed to fetch preset video from {}: {}",
                        url,
                        response.status()
                    )));
                }

                let content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("video/mp4")
                    .to_string();
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| ApiError::UpstreamFetch(e.to_string()))?
                    .to_vec();
                Ok((bytes, content_type))
            }
        }
    }

    /// Poll the remote file until it is `ACTIVE`.
    ///
    /// Sleeps between polls so the task yields while the provider works;
    /// the total wait is bounded by the configured budget.
    async fn wait_until_active(&self, mut file: RemoteFile) -> ApiResult<RemoteFile> {
        let started = Instant::now();
        let mut waited = Duration::ZERO;

        loop {
            match file.state {
                FileState::Active => {
                    info!(
                        "File {} is ACTIVE after {:?}",
                        file.display_name(),
                        started.elapsed()
                    );
                    metrics::record_file_wait(started.elapsed().as_secs_f64());
                    return Ok(file);
                }
                FileState::Failed => {
                    return Err(ApiError::ProcessingFailed(format!(
                        "File processing failed for {}",
                        file.display_name()
                    )));
                }
                FileState::Pending | FileState::Processing => {
                    if waited >= self.config.max_wait {
                        return Err(ApiError::ProcessingTimeout(format!(
                            "File processing timed out after {} seconds. Current state: {}",
                            self.config.max_wait.as_secs(),
                            file.state
                        )));
                    }
                    tokio::time::sleep(self.config.poll_interval).await;
                    waited += self.config.poll_interval;
                    file = self.gemini.get_file(&file.name).await?;
                    debug!("File state: {} (waited {:?})", file.state, waited);
                }
                FileState::Unknown => {
                    return Err(ApiError::UnexpectedProviderState(format!(
                        "Unexpected file state for {}",
                        file.display_name()
                    )));
                }
            }
        }
    }

    /// Delete the remote file, best effort.
    ///
    /// Failures are logged and swallowed; a not-found answer means the file
    /// is already gone and is not an error at all.
    async fn cleanup(&self, name: &str) {
        match self.gemini.delete_file(name).await {
            Ok(()) => info!("Deleted remote file {}", name),
            Err(e) if e.is_not_found() => debug!("Remote file {} already gone", name),
            Err(e) => warn!("Failed to delete remote file {}: {}", name, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitchlens_gemini::GeminiConfig;
    use pitchlens_storage::StorageConfig;
    use serde_json::{json, Value};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_service(server_url: &str, max_wait: Duration) -> AnalysisService {
        let storage = Arc::new(StorageClient::new(StorageConfig {
            endpoint_url: server_url.to_string(),
            access_key_id: "test-key".to_string(),
            secret_access_key: "test-secret".to_string(),
            bucket_name: "clips".to_string(),
            region: "auto".to_string(),
        }));
        let gemini = Arc::new(
            GeminiClient::new(GeminiConfig {
                base_url: server_url.to_string(),
                api_key: "test-key".to_string(),
                model: "gemini-2.0-flash".to_string(),
                timeout: Duration::from_secs(5),
            })
            .unwrap(),
        );

        AnalysisService::new(
            storage,
            gemini,
            reqwest::Client::new(),
            AnalysisConfig {
                poll_interval: Duration::from_millis(10),
                max_wait,
                max_upload_bytes: 20 * 1024 * 1024,
                allow_private_preset_hosts: true,
            },
        )
    }

    fn preset_request(server_url: &str) -> AnalyzeTacticsRequest {
        AnalyzeTacticsRequest {
            filename: None,
            preset_url: Some(format!("{}/presets/clip.mp4", server_url)),
        }
    }

    fn stored_request(key: &str) -> AnalyzeTacticsRequest {
        AnalyzeTacticsRequest {
            filename: Some(key.to_string()),
            preset_url: None,
        }
    }

    fn file_json(state: &str) -> Value {
        json!({
            "name": "files/abc123",
            "displayName": "clip.mp4",
            "mimeType": "video/mp4",
            "uri": "https://provider/v1beta/files/abc123",
            "state": state
        })
    }

    fn valid_report_args() -> Value {
        json!({
            "overallSummary": "High press throughout.",
            "formationAnalysis": "4-3-3 against a low block.",
            "keyTacticalMoments": [{"timestamp": "01:10", "description": "Counter-press regain."}]
        })
    }

    async fn mount_preset_clip(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/presets/clip.mp4"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "video/mp4")
                    .set_body_bytes(b"clip-bytes".to_vec()),
            )
            .expect(1)
            .mount(server)
            .await;
    }

    async fn mount_upload(server: &MockServer, initial_state: &str) {
        Mock::given(method("POST"))
            .and(path("/upload/v1beta/files"))
            .and(header("X-Goog-Upload-Command", "start"))
            .respond_with(
                ResponseTemplate::new(200).insert_header(
                    "X-Goog-Upload-URL",
                    format!("{}/upload-session", server.uri()).as_str(),
                ),
            )
            .expect(1)
            .mount(server)
            .await;

        Mock::given(method("POST"))
            .and(path("/upload-session"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"file": file_json(initial_state)})),
            )
            .expect(1)
            .mount(server)
            .await;
    }

    async fn mount_generate(server: &MockServer, parts: Value) {
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"role": "model", "parts": parts}}]
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    async fn mount_delete(server: &MockServer) {
        Mock::given(method("DELETE"))
            .and(path("/v1beta/files/abc123"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_end_to_end_preset_flow() {
        let server = MockServer::start().await;

        mount_preset_clip(&server).await;
        mount_upload(&server, "PROCESSING").await;

        // Two polls: still processing, then active
        Mock::given(method("GET"))
            .and(path("/v1beta/files/abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(file_json("PROCESSING")))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1beta/files/abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(file_json("ACTIVE")))
            .expect(1)
            .mount(&server)
            .await;

        mount_generate(
            &server,
            json!([{"functionCall": {"name": "saveTacticalReport", "args": valid_report_args()}}]),
        )
        .await;
        mount_delete(&server).await;

        let service = test_service(&server.uri(), Duration::from_secs(1));
        let report = service.analyze(&preset_request(&server.uri())).await.unwrap();

        assert_eq!(report.overall_summary, "High press throughout.");
        assert_eq!(report.key_tactical_moments.len(), 1);
    }

    #[tokio::test]
    async fn test_stored_clip_flow() {
        let server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/clips/match.mp4"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Length", "1048576")
                    .insert_header("Content-Type", "video/mp4"),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/clips/match.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"clip-bytes".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        mount_upload(&server, "ACTIVE").await;
        mount_generate(
            &server,
            json!([{"functionCall": {"name": "saveTacticalReport", "args": valid_report_args()}}]),
        )
        .await;
        mount_delete(&server).await;

        let service = test_service(&server.uri(), Duration::from_secs(1));
        let report = service.analyze(&stored_request("match.mp4")).await.unwrap();
        assert_eq!(report.formation_analysis, "4-3-3 against a low block.");
    }

    #[tokio::test]
    async fn test_size_guard_rejects_before_any_transfer() {
        let server = MockServer::start().await;

        // 21 MiB reported; the body must never be requested and nothing
        // may reach the provider.
        Mock::given(method("HEAD"))
            .and(path("/clips/big.mp4"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Length", "22020096")
                    .insert_header("Content-Type", "video/mp4"),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/clips/big.mp4"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/upload/v1beta/files"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let service = test_service(&server.uri(), Duration::from_secs(1));
        let err = service.analyze(&stored_request("big.mp4")).await.unwrap_err();
        assert!(matches!(err, ApiError::PayloadTooLarge(_)));
    }

    #[tokio::test]
    async fn test_upstream_fetch_failure() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/presets/clip.mp4"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/upload/v1beta/files"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let service = test_service(&server.uri(), Duration::from_secs(1));
        let err = service.analyze(&preset_request(&server.uri())).await.unwrap_err();
        assert!(matches!(err, ApiError::UpstreamFetch(_)));
    }

    #[tokio::test]
    async fn test_processing_failure_still_cleans_up() {
        let server = MockServer::start().await;

        mount_preset_clip(&server).await;
        mount_upload(&server, "PROCESSING").await;
        Mock::given(method("GET"))
            .and(path("/v1beta/files/abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(file_json("FAILED")))
            .expect(1)
            .mount(&server)
            .await;
        mount_delete(&server).await;

        let service = test_service(&server.uri(), Duration::from_secs(1));
        let err = service.analyze(&preset_request(&server.uri())).await.unwrap_err();
        assert!(matches!(err, ApiError::ProcessingFailed(_)));
    }

    #[tokio::test]
    async fn test_poll_timeout_still_cleans_up() {
        let server = MockServer::start().await;

        mount_preset_clip(&server).await;
        mount_upload(&server, "PROCESSING").await;
        Mock::given(method("GET"))
            .and(path("/v1beta/files/abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(file_json("PROCESSING")))
            .mount(&server)
            .await;
        mount_delete(&server).await;

        let service = test_service(&server.uri(), Duration::from_millis(50));
        let err = service.analyze(&preset_request(&server.uri())).await.unwrap_err();
        assert!(matches!(err, ApiError::ProcessingTimeout(_)));
    }

    #[tokio::test]
    async fn test_unexpected_state_is_fatal() {
        let server = MockServer::start().await;

        mount_preset_clip(&server).await;
        mount_upload(&server, "STATE_UNSPECIFIED").await;
        // No status poll may happen for an unknown state
        Mock::given(method("GET"))
            .and(path("/v1beta/files/abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(file_json("ACTIVE")))
            .expect(0)
            .mount(&server)
            .await;
        mount_delete(&server).await;

        let service = test_service(&server.uri(), Duration::from_secs(1));
        let err = service.analyze(&preset_request(&server.uri())).await.unwrap_err();
        assert!(matches!(err, ApiError::UnexpectedProviderState(_)));
    }

    #[tokio::test]
    async fn test_extraction_failure_still_cleans_up() {
        let server = MockServer::start().await;

        mount_preset_clip(&server).await;
        mount_upload(&server, "ACTIVE").await;
        mount_generate(&server, json!([{"text": "Prose instead of a tool call."}])).await;
        mount_delete(&server).await;

        let service = test_service(&server.uri(), Duration::from_secs(1));
        let err = service.analyze(&preset_request(&server.uri())).await.unwrap_err();

        match err {
            ApiError::ExtractionFailed { text } => {
                assert_eq!(text, "Prose instead of a tool call.")
            }
            other => panic!("expected ExtractionFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_schema_validation_failure_still_cleans_up() {
        let server = MockServer::start().await;

        mount_preset_clip(&server).await;
        mount_upload(&server, "ACTIVE").await;
        mount_generate(
            &server,
            json!([{"functionCall": {"name": "saveTacticalReport", "args": {
                "formationAnalysis": "y",
                "keyTacticalMoments": [{"description": "z"}]
            }}}]),
        )
        .await;
        mount_delete(&server).await;

        let service = test_service(&server.uri(), Duration::from_secs(1));
        let err = service.analyze(&preset_request(&server.uri())).await.unwrap_err();

        match err {
            ApiError::SchemaValidation { violations } => {
                assert!(violations.iter().any(|v| v.starts_with("overallSummary")));
            }
            other => panic!("expected SchemaValidation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_request_rejected_without_io() {
        let service = test_service("http://localhost:1", Duration::from_secs(1));

        let err = service
            .analyze(&AnalyzeTacticsRequest {
                filename: None,
                preset_url: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let err = service
            .analyze(&AnalyzeTacticsRequest {
                filename: Some("a.mp4".to_string()),
                preset_url: Some("https://host/b.mp4".to_string()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
