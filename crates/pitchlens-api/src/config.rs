//! API configuration.

use std::time::Duration;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Rate limit requests per second
    pub rate_limit_rps: u32,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Analysis pipeline tuning
    pub analysis: AnalysisConfig,
}

/// Tuning for the analysis pipeline.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Interval between remote file status polls
    pub poll_interval: Duration,
    /// Total wall-clock budget for file processing
    pub max_wait: Duration,
    /// Ceiling for stored clips pushed to the provider
    pub max_upload_bytes: u64,
    /// Permit preset URLs on private/loopback hosts (local development only)
    pub allow_private_preset_hosts: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_wait: Duration::from_secs(300),
            max_upload_bytes: 20 * 1024 * 1024, // 20 MiB
            allow_private_preset_hosts: false,
        }
    }
}

impl AnalysisConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: Duration::from_millis(
                std::env::var("ANALYSIS_POLL_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.poll_interval.as_millis() as u64),
            ),
            max_wait: Duration::from_secs(
                std::env::var("ANALYSIS_MAX_WAIT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.max_wait.as_secs()),
            ),
            max_upload_bytes: std::env::var("ANALYSIS_MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_upload_bytes),
            allow_private_preset_hosts: std::env::var("ANALYSIS_ALLOW_PRIVATE_PRESET_HOSTS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.allow_private_preset_hosts),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            max_body_size: 1024 * 1024, // 1MB; bodies are JSON, clips go through signed URLs
            environment: "development".to_string(),
            analysis: AnalysisConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: std::env::var("RATE_LIMIT_RPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.rate_limit_rps),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_body_size),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            analysis: AnalysisConfig::from_env(),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}
