//! In-memory exporter
//!
//! Keeps delivered records in a list. Useful for embedding hosts that forward
//! records themselves, and for exercising the controller without a network.

use super::{Delivery, Exporter};
use crate::error::TelemetryError;
use crate::types::SessionRecord;
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct MemoryExporter {
    delivered: Mutex<Vec<(SessionRecord, Delivery)>>,
    latency: Duration,
    offline: bool,
}

impl MemoryExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every primary delivery for `latency` before accepting it
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Reject every delivery on every channel
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    /// Records delivered so far, with the channel each one went through
    pub fn delivered(&self) -> Vec<(SessionRecord, Delivery)> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn records(&self) -> Vec<SessionRecord> {
        self.delivered().into_iter().map(|(record, _)| record).collect()
    }

    fn accept(&self, record: &SessionRecord, delivery: Delivery) -> Result<Delivery, TelemetryError> {
        if self.offline {
            return Err(TelemetryError::DeliveryFailed("exporter is offline".to_string()));
        }
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((record.clone(), delivery.clone()));
        Ok(delivery)
    }
}

#[async_trait]
impl Exporter for MemoryExporter {
    async fn deliver(&self, record: &SessionRecord) -> Result<Delivery, TelemetryError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.accept(record, Delivery::Primary)
    }

    fn deliver_on_teardown(&self, record: &SessionRecord) -> Result<Delivery, TelemetryError> {
        self.accept(record, Delivery::Beacon)
    }
}
