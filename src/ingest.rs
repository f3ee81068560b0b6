//! HTTP client for posting recognitions to a moodwatch server.
//!
//! The camera loop never waits on the network: [`HttpSink`] hands each
//! recognition to a spawned task and failures are only logged and counted.

use crate::camera::RecognitionSink;
use crate::config::IngestConfig;
use crate::core::event::{NewRecognition, RecognitionEvent};
use crate::telemetry::SharedCounters;
use serde::Deserialize;
use std::sync::Arc;

/// Ingest client error types.
#[derive(Debug)]
pub enum IngestError {
    /// Configuration error
    Config(String),
    /// Network/HTTP error
    Network(String),
    /// Server returned an error response
    Server { status: u16, message: String },
    /// JSON serialization error
    Serialization(String),
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::Config(msg) => write!(f, "Ingest config error: {msg}"),
            IngestError::Network(msg) => write!(f, "Ingest network error: {msg}"),
            IngestError::Server { status, message } => {
                write!(f, "Ingest server error ({status}): {message}")
            }
            IngestError::Serialization(msg) => write!(f, "Ingest serialization error: {msg}"),
        }
    }
}

impl std::error::Error for IngestError {}

#[derive(Debug, Deserialize)]
struct ItemResponse {
    item: RecognitionEvent,
}

/// Client for the recognition ingestion endpoint.
#[derive(Debug, Clone)]
pub struct IngestClient {
    base_url: String,
    client: reqwest::Client,
    client_id: String,
}

impl IngestClient {
    pub fn new(config: &IngestConfig) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| IngestError::Config(format!("Failed to create HTTP client: {e}")))?;

        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let client_id = format!(
            "moodwatch-{}-{}",
            hostname,
            &uuid::Uuid::new_v4().to_string()[..8]
        );

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            client_id,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn recognitions_url(&self) -> String {
        format!("{}/recognitions", self.base_url)
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }

    /// Identifier sent with every request as `X-Client-Id`.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Test connection to the server.
    pub async fn test_connection(&self) -> Result<bool, IngestError> {
        let response = self
            .client
            .get(self.health_url())
            .send()
            .await
            .map_err(|e| IngestError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }

    /// Post one recognition and return the stored event.
    pub async fn post_recognition(
        &self,
        recognition: &NewRecognition,
    ) -> Result<RecognitionEvent, IngestError> {
        let response = self
            .client
            .post(self.recognitions_url())
            .header("X-Client-Id", &self.client_id)
            .json(recognition)
            .send()
            .await
            .map_err(|e| IngestError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(IngestError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let body: ItemResponse = response
            .json()
            .await
            .map_err(|e| IngestError::Serialization(e.to_string()))?;

        Ok(body.item)
    }
}

/// Sink that posts each recognition in the background.
pub struct HttpSink {
    client: Arc<IngestClient>,
    counters: SharedCounters,
}

impl HttpSink {
    pub fn new(client: IngestClient, counters: SharedCounters) -> Self {
        Self {
            client: Arc::new(client),
            counters,
        }
    }
}

impl RecognitionSink for HttpSink {
    fn submit(&self, recognition: NewRecognition) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!(name = %recognition.name, "no async runtime; recognition dropped");
                self.counters.record_emission_failure();
                return;
            }
        };

        let client = Arc::clone(&self.client);
        let counters = Arc::clone(&self.counters);
        handle.spawn(async move {
            match client.post_recognition(&recognition).await {
                Ok(event) => {
                    tracing::debug!(id = %event.id, name = %event.name, "recognition stored");
                }
                Err(e) => {
                    tracing::warn!(name = %recognition.name, error = %e, "failed to post recognition");
                    counters.record_emission_failure();
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_client_urls() {
        let config = IngestConfig {
            base_url: "http://127.0.0.1:8080/".to_string(),
            timeout: Duration::from_secs(2),
        };
        let client = IngestClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:8080");
        assert_eq!(client.recognitions_url(), "http://127.0.0.1:8080/recognitions");
        assert_eq!(client.health_url(), "http://127.0.0.1:8080/health");
        assert!(client.client_id().starts_with("moodwatch-"));
    }

    #[test]
    fn test_error_display() {
        let err = IngestError::Server {
            status: 400,
            message: "name_and_mood_required".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Ingest server error (400): name_and_mood_required"
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_counts_failure() {
        let config = IngestConfig {
            // Port 9 (discard) is not expected to be serving HTTP.
            base_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_millis(500),
        };
        let counters: SharedCounters = Arc::new(crate::telemetry::PipelineCounters::new());
        let sink = HttpSink::new(IngestClient::new(&config).unwrap(), counters.clone());

        sink.submit(NewRecognition::new("anna", "happy", chrono::Utc::now()));
        for _ in 0..20 {
            if counters.stats().emission_failures == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(counters.stats().emission_failures, 1);
    }
}
