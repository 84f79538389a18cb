//! HTTP exporter for the ingestion endpoint

use super::local::persist_locally;
use super::{Delivery, Exporter};
use crate::config::TrackerConfig;
use crate::error::TelemetryError;
use crate::types::SessionRecord;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;

/// Delivers records to `POST {endpoint}/formAnalytics`.
///
/// Channel order for [`Exporter::deliver`]: primary request, then beacon, then a
/// local file. [`Exporter::deliver_on_teardown`] skips the primary request.
#[derive(Clone)]
pub struct HttpExporter {
    client: Client,
    url: Option<String>,
    request_timeout: Duration,
    fallback_dir: PathBuf,
}

impl HttpExporter {
    pub fn new(config: &TrackerConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    /// Use a preconfigured client (proxies, TLS roots)
    pub fn with_client(client: Client, config: &TrackerConfig) -> Self {
        Self {
            client,
            url: config.ingestion_url(),
            request_timeout: config.request_timeout(),
            fallback_dir: config.fallback_dir.clone(),
        }
    }

    pub fn ingestion_url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    async fn send_primary(&self, record: &SessionRecord) -> Result<(), TelemetryError> {
        let url = self.url.as_deref().ok_or_else(|| {
            TelemetryError::PrimaryDelivery("no ingestion endpoint configured".to_string())
        })?;

        let response = self
            .client
            .post(url)
            .timeout(self.request_timeout)
            .json(record)
            .send()
            .await
            .map_err(|e| TelemetryError::PrimaryDelivery(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TelemetryError::PrimaryDelivery(format!(
                "ingestion endpoint returned {}",
                response.status()
            )));
        }

        Ok(())
    }

    /// Queue the request on the current runtime and return without waiting
    fn send_beacon(&self, record: &SessionRecord) -> Result<(), TelemetryError> {
        let url = self.url.clone().ok_or_else(|| {
            TelemetryError::FallbackUnavailable("no ingestion endpoint configured".to_string())
        })?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TelemetryError::FallbackUnavailable(e.to_string()))?;

        let body = serde_json::to_vec(record)?;
        let session_id = record.session_id.to_string();
        let request = self
            .client
            .post(url)
            .timeout(self.request_timeout)
            .header(CONTENT_TYPE, "application/json")
            .body(body);

        runtime.spawn(async move {
            match request.send().await {
                Ok(response) => tracing::debug!(
                    session_id = %session_id,
                    status = %response.status(),
                    "Beacon delivered"
                ),
                Err(e) => tracing::debug!(session_id = %session_id, error = %e, "Beacon lost"),
            }
        });

        Ok(())
    }
}

#[async_trait]
impl Exporter for HttpExporter {
    async fn deliver(&self, record: &SessionRecord) -> Result<Delivery, TelemetryError> {
        match self.send_primary(record).await {
            Ok(()) => Ok(Delivery::Primary),
            Err(e) => {
                tracing::warn!(
                    session_id = %record.session_id,
                    error = %e,
                    "Primary delivery failed, using fallback"
                );
                self.deliver_on_teardown(record)
            }
        }
    }

    fn deliver_on_teardown(&self, record: &SessionRecord) -> Result<Delivery, TelemetryError> {
        let beacon_error = match self.send_beacon(record) {
            Ok(()) => return Ok(Delivery::Beacon),
            Err(e) => e,
        };

        tracing::warn!(
            session_id = %record.session_id,
            error = %beacon_error,
            "Network delivery unavailable, writing record locally"
        );

        match persist_locally(&self.fallback_dir, record) {
            Ok(path) => {
                tracing::info!(
                    session_id = %record.session_id,
                    path = %path.display(),
                    "Session record saved locally"
                );
                Ok(Delivery::LocalFile(path))
            }
            Err(e) => Err(TelemetryError::DeliveryFailed(format!(
                "{beacon_error}; {e}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionId;
    use chrono::Utc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_record() -> SessionRecord {
        SessionRecord::new(
            SessionId::from("sess-http"),
            ["email"],
            ["personal"],
            Utc::now(),
        )
    }

    async fn wait_for_requests(server: &MockServer, count: usize) -> usize {
        for _ in 0..100 {
            let received = server.received_requests().await.unwrap_or_default().len();
            if received >= count {
                return received;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        server.received_requests().await.unwrap_or_default().len()
    }

    #[tokio::test]
    async fn test_primary_delivery() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/formAnalytics"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let config = TrackerConfig::default().with_endpoint(server.uri());
        let exporter = HttpExporter::new(&config);

        let delivery = exporter.deliver(&sample_record()).await.unwrap();
        assert_eq!(delivery, Delivery::Primary);

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["sessionId"], "sess-http");
        assert_eq!(body["tabs"]["personal"]["visitCount"], 0);
    }

    #[tokio::test]
    async fn test_primary_failure_falls_back_to_beacon() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/formAnalytics"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = TrackerConfig::default()
            .with_endpoint(server.uri())
            .with_fallback_dir(dir.path());
        let exporter = HttpExporter::new(&config);

        let delivery = exporter.deliver(&sample_record()).await.unwrap();
        assert_eq!(delivery, Delivery::Beacon);

        // Primary attempt plus the queued beacon, and no retries beyond that
        assert_eq!(wait_for_requests(&server, 2).await, 2);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_no_endpoint_writes_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrackerConfig::default().with_fallback_dir(dir.path());
        let exporter = HttpExporter::new(&config);
        let record = sample_record();

        let delivery = exporter.deliver(&record).await.unwrap();

        let path = match delivery {
            Delivery::LocalFile(path) => path,
            other => panic!("expected local file delivery, got {other:?}"),
        };
        let saved: SessionRecord =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(saved, record);
    }

    #[test]
    fn test_teardown_without_runtime_writes_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrackerConfig::default()
            .with_endpoint("http://127.0.0.1:9")
            .with_fallback_dir(dir.path());
        let exporter = HttpExporter::new(&config);

        let delivery = exporter.deliver_on_teardown(&sample_record()).unwrap();
        assert!(matches!(delivery, Delivery::LocalFile(_)));
    }

    #[test]
    fn test_total_failure_is_reported() {
        let blocker = tempfile::NamedTempFile::new().unwrap();
        let config = TrackerConfig::default().with_fallback_dir(blocker.path().join("sub"));
        let exporter = HttpExporter::new(&config);

        let result = exporter.deliver_on_teardown(&sample_record());
        assert!(matches!(result, Err(TelemetryError::DeliveryFailed(_))));
    }
}
