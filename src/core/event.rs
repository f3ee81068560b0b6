//! Recognition events as stored and exchanged over the ingestion endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted recognition. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionEvent {
    pub id: String,
    pub name: String,
    /// Raw mood string; sentiment is derived on read
    pub mood: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_id: Option<String>,
    pub detected_at: DateTime<Utc>,
}

/// Body of `POST /recognitions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecognition {
    pub name: String,
    pub mood: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_id: Option<String>,
}

impl NewRecognition {
    pub fn new(name: impl Into<String>, mood: impl Into<String>, detected_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            mood: mood.into(),
            detected_at: Some(detected_at),
            camera_id: None,
        }
    }

    pub fn with_camera(mut self, camera_id: impl Into<String>) -> Self {
        self.camera_id = Some(camera_id.into());
        self
    }
}
