//! Pipeline counters for the camera loop.
//!
//! Counts only; no names, moods or images are recorded here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Per-process counters, shared between the camera loop and its sinks.
#[derive(Debug)]
pub struct PipelineCounters {
    frames_processed: AtomicU64,
    faces_detected: AtomicU64,
    unknown_faces: AtomicU64,
    events_emitted: AtomicU64,
    emission_failures: AtomicU64,
    detection_errors: AtomicU64,
    started_at: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl PipelineCounters {
    pub fn new() -> Self {
        Self {
            frames_processed: AtomicU64::new(0),
            faces_detected: AtomicU64::new(0),
            unknown_faces: AtomicU64::new(0),
            events_emitted: AtomicU64::new(0),
            emission_failures: AtomicU64::new(0),
            detection_errors: AtomicU64::new(0),
            started_at: Utc::now(),
            persist_path: None,
        }
    }

    /// Counters that are saved to `path` by [`save`](Self::save).
    ///
    /// Earlier totals found at `path` are not loaded; each process starts at zero.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut counters = Self::new();
        counters.persist_path = Some(path);
        counters
    }

    /// Default location for persisted counters.
    pub fn default_path() -> PathBuf {
        crate::config::data_dir().join("telemetry.json")
    }

    pub fn record_frame(&self, faces: u64, unknown: u64) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        self.faces_detected.fetch_add(faces, Ordering::Relaxed);
        self.unknown_faces.fetch_add(unknown, Ordering::Relaxed);
    }

    pub fn record_emitted(&self) {
        self.events_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_emission_failure(&self) {
        self.emission_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_detection_error(&self) {
        self.detection_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> PipelineStats {
        let now = Utc::now();
        PipelineStats {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            faces_detected: self.faces_detected.load(Ordering::Relaxed),
            unknown_faces: self.unknown_faces.load(Ordering::Relaxed),
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            emission_failures: self.emission_failures.load(Ordering::Relaxed),
            detection_errors: self.detection_errors.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (now - self.started_at).num_seconds().max(0) as u64,
            updated_at: now,
        }
    }

    pub fn summary(&self) -> String {
        self.stats().summary()
    }

    /// Write the current stats as JSON, if persistence is enabled.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let json =
                serde_json::to_string_pretty(&self.stats()).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    pub fn reset(&self) {
        self.frames_processed.store(0, Ordering::Relaxed);
        self.faces_detected.store(0, Ordering::Relaxed);
        self.unknown_faces.store(0, Ordering::Relaxed);
        self.events_emitted.store(0, Ordering::Relaxed);
        self.emission_failures.store(0, Ordering::Relaxed);
        self.detection_errors.store(0, Ordering::Relaxed);
    }
}

impl Default for PipelineCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub frames_processed: u64,
    pub faces_detected: u64,
    pub unknown_faces: u64,
    pub events_emitted: u64,
    pub emission_failures: u64,
    pub detection_errors: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub updated_at: DateTime<Utc>,
}

impl PipelineStats {
    /// Read stats last saved by a camera process.
    pub fn load(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(std::io::Error::other)
    }

    pub fn summary(&self) -> String {
        format!(
            "Pipeline Statistics:\n\
             - Frames processed: {}\n\
             - Faces detected: {} ({} unknown)\n\
             - Events emitted: {}\n\
             - Emission failures: {}\n\
             - Detection errors: {}\n\
             - Uptime: {} seconds (updated {})",
            self.frames_processed,
            self.faces_detected,
            self.unknown_faces,
            self.events_emitted,
            self.emission_failures,
            self.detection_errors,
            self.uptime_secs,
            self.updated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        )
    }
}

pub type SharedCounters = Arc<PipelineCounters>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let counters = PipelineCounters::new();
        counters.record_frame(3, 1);
        counters.record_frame(0, 0);
        counters.record_emitted();
        counters.record_emission_failure();

        let stats = counters.stats();
        assert_eq!(stats.frames_processed, 2);
        assert_eq!(stats.faces_detected, 3);
        assert_eq!(stats.unknown_faces, 1);
        assert_eq!(stats.events_emitted, 1);
        assert_eq!(stats.emission_failures, 1);
    }

    #[test]
    fn test_reset() {
        let counters = PipelineCounters::new();
        counters.record_frame(5, 0);
        counters.record_detection_error();
        counters.reset();

        let stats = counters.stats();
        assert_eq!(stats.frames_processed, 0);
        assert_eq!(stats.detection_errors, 0);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("telemetry-{}.json", uuid::Uuid::new_v4()));
        let counters = PipelineCounters::with_persistence(path.clone());
        counters.record_frame(2, 0);
        counters.save().unwrap();

        let loaded = PipelineStats::load(&path).unwrap();
        assert_eq!(loaded.frames_processed, 1);
        assert!(loaded.summary().contains("Frames processed: 1"));
        let _ = std::fs::remove_file(path);
    }
}
