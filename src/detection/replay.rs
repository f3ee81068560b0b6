//! Detector that replays precomputed detections from a JSONL file.
//!
//! Each line is one frame: a JSON array of [`FaceDetection`]. A blank line is
//! a frame with no faces.

use crate::detection::{DetectionError, Detector, FaceDetection};
use std::path::PathBuf;

pub struct ReplayDetector {
    path: PathBuf,
    frames: Vec<String>,
    cursor: usize,
    repeat: bool,
}

impl ReplayDetector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            frames: Vec::new(),
            cursor: 0,
            repeat: false,
        }
    }

    /// Start over from the first frame instead of reporting exhaustion.
    pub fn repeating(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    /// Build from in-memory lines; no file is read on `init`.
    pub fn from_lines(lines: impl IntoIterator<Item = String>) -> Self {
        Self {
            path: PathBuf::new(),
            frames: lines.into_iter().collect(),
            cursor: 0,
            repeat: false,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl Detector for ReplayDetector {
    async fn init(&mut self) -> Result<(), DetectionError> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| DetectionError::Init(format!("{}: {e}", self.path.display())))?;
        self.frames = content.lines().map(str::to_string).collect();
        self.cursor = 0;
        tracing::info!(frames = self.frames.len(), path = %self.path.display(), "replay loaded");
        Ok(())
    }

    async fn detect(&mut self) -> Result<Vec<FaceDetection>, DetectionError> {
        if self.cursor >= self.frames.len() {
            if !self.repeat || self.frames.is_empty() {
                return Err(DetectionError::Exhausted);
            }
            self.cursor = 0;
        }
        let line = self.frames[self.cursor].trim();
        self.cursor += 1;

        if line.is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(line)
            .map_err(|e| DetectionError::Frame(format!("line {}: {e}", self.cursor)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines() -> Vec<String> {
        vec![
            r#"[{"label": "anna", "expressionScores": {"happy": 0.9}}]"#.to_string(),
            String::new(),
            "not json".to_string(),
        ]
    }

    #[tokio::test]
    async fn test_replay_frames_in_order() {
        let mut detector = ReplayDetector::from_lines(lines());
        detector.init().await.unwrap();

        let first = detector.detect().await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].label.as_deref(), Some("anna"));
        assert_eq!(first[0].expression_scores["happy"], 0.9);

        assert!(detector.detect().await.unwrap().is_empty());
        assert!(matches!(detector.detect().await, Err(DetectionError::Frame(_))));
        assert!(matches!(detector.detect().await, Err(DetectionError::Exhausted)));
    }

    #[tokio::test]
    async fn test_replay_repeats() {
        let mut detector = ReplayDetector::from_lines(lines()).repeating(true);
        for _ in 0..3 {
            let _ = detector.detect().await;
        }
        assert_eq!(detector.detect().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_fails_init() {
        let mut detector = ReplayDetector::new("/nonexistent/moodwatch/replay.jsonl");
        assert!(matches!(detector.init().await, Err(DetectionError::Init(_))));
    }
}
