//! Error types for form telemetry

use thiserror::Error;

/// Errors that can occur while tracking or exporting a session
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Primary delivery failed: {0}")]
    PrimaryDelivery(String),

    #[error("Fallback delivery unavailable: {0}")]
    FallbackUnavailable(String),

    #[error("Local persistence failed: {0}")]
    LocalPersistence(#[from] std::io::Error),

    #[error("Delivery failed on every channel: {0}")]
    DeliveryFailed(String),

    #[error("Form tracking API used outside an active tracking scope")]
    NoActiveScope,

    #[error("Failed to parse event script: {0}")]
    ParseError(String),
}
