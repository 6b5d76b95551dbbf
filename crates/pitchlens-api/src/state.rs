//! Application state.

use std::sync::Arc;
use std::time::Duration;

use pitchlens_gemini::GeminiClient;
use pitchlens_storage::StorageClient;

use crate::config::ApiConfig;
use crate::services::AnalysisService;

/// Shared application state.
///
/// Collaborator clients are constructed once here and injected everywhere
/// else, so handlers and services never reach for hidden singletons.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub storage: Arc<StorageClient>,
    pub gemini: Arc<GeminiClient>,
    pub analysis: AnalysisService,
}

impl AppState {
    /// Create new application state.
    pub fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let storage = Arc::new(StorageClient::from_env()?);
        let gemini = Arc::new(GeminiClient::from_env()?);

        // Client for fetching preset clips; generous timeout, the clips are
        // tens of megabytes at most.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        let analysis = AnalysisService::new(
            Arc::clone(&storage),
            Arc::clone(&gemini),
            http,
            config.analysis.clone(),
        );

        Ok(Self {
            config,
            storage,
            gemini,
            analysis,
        })
    }
}
