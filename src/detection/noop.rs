//! Detector that never sees a face.
//!
//! Lets the camera loop run (and exercise eviction and telemetry) on hosts
//! without a detection capability.

use crate::detection::{DetectionError, Detector, FaceDetection};

#[derive(Debug, Default)]
pub struct NoopDetector;

impl Detector for NoopDetector {
    async fn init(&mut self) -> Result<(), DetectionError> {
        tracing::warn!("no detection capability configured; camera will report no faces");
        Ok(())
    }

    async fn detect(&mut self) -> Result<Vec<FaceDetection>, DetectionError> {
        Ok(Vec::new())
    }
}
