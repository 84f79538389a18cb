//! Delivery of finalized session records
//!
//! An [`Exporter`] gets one finalized record per session and reports which
//! channel accepted it. Implementations try each channel at most once; they never
//! retry in a loop and never panic on delivery failure.

mod http;
mod local;
mod memory;

pub use http::HttpExporter;
pub use local::{download_file_name, persist_locally};
pub use memory::MemoryExporter;

use crate::error::TelemetryError;
use crate::types::SessionRecord;
use async_trait::async_trait;
use std::path::PathBuf;

/// Channel that accepted a finalized record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Request/response call acknowledged by the ingestion endpoint
    Primary,
    /// Fire-and-forget transmission, queued without acknowledgment
    Beacon,
    /// Written to a local JSON file as a last resort
    LocalFile(PathBuf),
}

impl Delivery {
    pub fn channel(&self) -> &'static str {
        match self {
            Delivery::Primary => "primary",
            Delivery::Beacon => "beacon",
            Delivery::LocalFile(_) => "local_file",
        }
    }
}

/// Sink for finalized session records
#[async_trait]
pub trait Exporter: Send + Sync {
    /// Deliver through the primary channel, falling back once if it fails
    async fn deliver(&self, record: &SessionRecord) -> Result<Delivery, TelemetryError>;

    /// Deliver without waiting on the network; used while the host is tearing down
    fn deliver_on_teardown(&self, record: &SessionRecord) -> Result<Delivery, TelemetryError>;
}
