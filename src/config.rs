//! Tracker configuration
//!
//! Every tunable of the core (timer thresholds, ingestion endpoint, local
//! fallback directory) comes from here; nothing is hardcoded in the controller
//! or exporter.

use crate::error::TelemetryError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default idle timeout before a session is considered abandoned (10 minutes)
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 600_000;

/// Default time a validation error must persist before it is recorded
pub const DEFAULT_ERROR_PERSISTENCE_MS: u64 = 60_000;

/// Default timeout for the primary ingestion request
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Path appended to the endpoint base URL
pub const INGESTION_PATH: &str = "/formAnalytics";

pub const ENV_ENDPOINT: &str = "FORM_TELEMETRY_ENDPOINT";
pub const ENV_IDLE_TIMEOUT_MS: &str = "FORM_TELEMETRY_IDLE_TIMEOUT_MS";
pub const ENV_ERROR_PERSISTENCE_MS: &str = "FORM_TELEMETRY_ERROR_PERSISTENCE_MS";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "FORM_TELEMETRY_REQUEST_TIMEOUT_MS";
pub const ENV_FALLBACK_DIR: &str = "FORM_TELEMETRY_FALLBACK_DIR";

/// Configuration for a tracking scope and its exporter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerConfig {
    /// Inactivity window after which the session is abandoned
    pub idle_timeout_ms: u64,
    /// How long a validation error must stay visible before it counts
    pub error_persistence_ms: u64,
    /// Ingestion base URL; `None` means no network delivery is available
    pub endpoint: Option<String>,
    /// Timeout for the primary ingestion request
    pub request_timeout_ms: u64,
    /// Directory receiving `form_analytics_<timestamp>.json` when delivery fails
    pub fallback_dir: PathBuf,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            error_persistence_ms: DEFAULT_ERROR_PERSISTENCE_MS,
            endpoint: None,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            fallback_dir: env::temp_dir(),
        }
    }
}

impl TrackerConfig {
    /// Load configuration from environment variables on top of the defaults.
    ///
    /// Unset variables keep their default; malformed numbers are an error.
    pub fn from_env() -> Result<Self, TelemetryError> {
        let mut config = Self::default();

        if let Ok(endpoint) = env::var(ENV_ENDPOINT) {
            if !endpoint.trim().is_empty() {
                config.endpoint = Some(endpoint.trim().to_string());
            }
        }
        if let Some(ms) = read_ms(ENV_IDLE_TIMEOUT_MS)? {
            config.idle_timeout_ms = ms;
        }
        if let Some(ms) = read_ms(ENV_ERROR_PERSISTENCE_MS)? {
            config.error_persistence_ms = ms;
        }
        if let Some(ms) = read_ms(ENV_REQUEST_TIMEOUT_MS)? {
            config.request_timeout_ms = ms;
        }
        if let Ok(dir) = env::var(ENV_FALLBACK_DIR) {
            config.fallback_dir = PathBuf::from(dir);
        }

        tracing::debug!(
            endpoint = config.endpoint.as_deref().unwrap_or("none"),
            idle_timeout_ms = config.idle_timeout_ms,
            error_persistence_ms = config.error_persistence_ms,
            "Loaded tracker configuration from environment"
        );

        Ok(config)
    }

    /// Parse configuration from a JSON document; missing keys keep their defaults
    pub fn from_json(json: &str) -> Result<Self, TelemetryError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_error_persistence(mut self, threshold: Duration) -> Self {
        self.error_persistence_ms = threshold.as_millis() as u64;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_fallback_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fallback_dir = dir.into();
        self
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn error_persistence(&self) -> Duration {
        Duration::from_millis(self.error_persistence_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Full ingestion URL, if an endpoint is configured
    pub fn ingestion_url(&self) -> Option<String> {
        self.endpoint
            .as_deref()
            .map(|base| format!("{}{}", base.trim_end_matches('/'), INGESTION_PATH))
    }
}

fn read_ms(var: &str) -> Result<Option<u64>, TelemetryError> {
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| TelemetryError::Config(format!("{var}={raw:?}: {e}"))),
        Err(_) => Ok(None),
    }
}
