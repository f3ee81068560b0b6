//! One camera's detection loop.
//!
//! Each tick awaits the detector, then synchronously runs classification,
//! gallery matching, stabilization, the emission policy and the optional
//! observation session, then sleeps for `tick_delay`. The loop holds its
//! detector by `&mut`, so a new detection cannot start while one is in
//! flight. Cameras share nothing but the recognition sink.

use crate::config::Config;
use crate::core::emitter::{Emission, RecognitionEmitter};
use crate::core::event::NewRecognition;
use crate::core::mood::{classify_expression, ClassifierConfig};
use crate::core::observation::{MoodLogEntry, ObservationSession};
use crate::core::stabilizer::{Observation, StableFrame, Stabilizer, UNKNOWN_LABEL};
use crate::detection::{DetectionError, Detector, FaceDetection, FaceGallery};
use crate::telemetry::SharedCounters;
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-camera settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub camera_id: String,
    /// Pause between the end of one tick and the start of the next
    #[serde(with = "crate::config::millis")]
    pub tick_delay: std::time::Duration,
    /// Maximum gallery distance for a face to count as recognised
    pub match_distance: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            camera_id: format!("{hostname}-cam0"),
            tick_delay: std::time::Duration::from_millis(120),
            match_distance: crate::detection::gallery::DEFAULT_MATCH_DISTANCE,
        }
    }
}

/// Where the loop is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraStatus {
    Starting,
    Running,
    /// The detector failed to initialise; nothing will be detected
    Unavailable(String),
    Stopped,
}

/// Destination for decided recognitions.
///
/// `submit` must return promptly and never fail the caller; delivery errors
/// are the sink's own business.
pub trait RecognitionSink: Send + Sync {
    fn submit(&self, recognition: NewRecognition);
}

/// In-process sink backed by a bounded channel. A full channel drops the
/// recognition.
pub struct ChannelSink {
    sender: Sender<NewRecognition>,
    counters: Option<SharedCounters>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, Receiver<NewRecognition>) {
        let (sender, receiver) = bounded(capacity);
        (
            Self {
                sender,
                counters: None,
            },
            receiver,
        )
    }

    pub fn with_counters(mut self, counters: SharedCounters) -> Self {
        self.counters = Some(counters);
        self
    }
}

impl RecognitionSink for ChannelSink {
    fn submit(&self, recognition: NewRecognition) {
        if let Err(e) = self.sender.try_send(recognition) {
            let reason = match e {
                TrySendError::Full(_) => "full",
                TrySendError::Disconnected(_) => "disconnected",
            };
            tracing::warn!(reason, "dropping recognition");
            if let Some(ref counters) = self.counters {
                counters.record_emission_failure();
            }
        }
    }
}

/// What one tick produced.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub frame: StableFrame,
    pub emissions: Vec<Emission>,
    pub log: Vec<MoodLogEntry>,
}

/// Detection loop state for one camera.
pub struct CameraLoop<D: Detector> {
    config: CameraConfig,
    classifier: ClassifierConfig,
    detector: D,
    gallery: Option<FaceGallery>,
    stabilizer: Stabilizer,
    emitter: RecognitionEmitter,
    session: ObservationSession,
    sink: Box<dyn RecognitionSink>,
    counters: SharedCounters,
    status: CameraStatus,
}

impl<D: Detector> CameraLoop<D> {
    pub fn new(
        config: &Config,
        detector: D,
        sink: Box<dyn RecognitionSink>,
        counters: SharedCounters,
    ) -> Self {
        Self {
            config: config.camera.clone(),
            classifier: config.classifier.clone(),
            detector,
            gallery: None,
            stabilizer: Stabilizer::new(config.stabilizer.clone()),
            emitter: RecognitionEmitter::new(config.emitter.clone()),
            session: ObservationSession::new(config.observation.clone()),
            sink,
            counters,
            status: CameraStatus::Starting,
        }
    }

    pub fn with_gallery(mut self, gallery: FaceGallery) -> Self {
        self.gallery = Some(gallery);
        self
    }

    pub fn camera_id(&self) -> &str {
        &self.config.camera_id
    }

    pub fn status(&self) -> &CameraStatus {
        &self.status
    }

    pub fn stabilizer(&self) -> &Stabilizer {
        &self.stabilizer
    }

    pub fn session(&self) -> &ObservationSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ObservationSession {
        &mut self.session
    }

    /// Initialise the detector. Failure leaves the camera `Unavailable`.
    ///
    /// A (re)started source begins with no tracked identities.
    pub async fn start(&mut self) -> Result<(), DetectionError> {
        match self.detector.init().await {
            Ok(()) => {
                self.stabilizer.reset();
                self.emitter.reset();
                self.status = CameraStatus::Running;
                tracing::info!(camera_id = %self.config.camera_id, "camera started");
                Ok(())
            }
            Err(e) => {
                tracing::error!(camera_id = %self.config.camera_id, error = %e, "detector failed to start");
                self.status = CameraStatus::Unavailable(e.to_string());
                Err(e)
            }
        }
    }

    /// Run one detection and fold its result into the state.
    ///
    /// A failed frame still advances the state with no observations, so
    /// absence grace and session intervals keep following the clock.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<TickReport, DetectionError> {
        match self.detector.detect().await {
            Ok(faces) => Ok(self.process(faces, now)),
            Err(DetectionError::Exhausted) => Err(DetectionError::Exhausted),
            Err(e) => {
                self.counters.record_detection_error();
                self.fold(&[], now);
                Err(e)
            }
        }
    }

    fn label_for(&self, face: &FaceDetection) -> String {
        if let Some(ref label) = face.label {
            return label.clone();
        }
        match (&self.gallery, &face.descriptor) {
            (Some(gallery), Some(descriptor)) => gallery.match_descriptor(descriptor).label,
            _ => UNKNOWN_LABEL.to_string(),
        }
    }

    /// The synchronous part of a tick.
    pub fn process(&mut self, faces: Vec<FaceDetection>, now: DateTime<Utc>) -> TickReport {
        let observations: Vec<Observation> = faces
            .iter()
            .map(|face| {
                Observation::new(
                    self.label_for(face),
                    classify_expression(&face.expression_scores, &self.classifier),
                )
            })
            .collect();
        let unknown = observations.iter().filter(|o| o.is_anonymous()).count();
        self.counters
            .record_frame(observations.len() as u64, unknown as u64);

        self.fold(&observations, now)
    }

    /// Stabilize, emit and update the session for one tick's observations.
    fn fold(&mut self, observations: &[Observation], now: DateTime<Utc>) -> TickReport {
        let frame = self.stabilizer.advance(observations, now);
        let emissions = self.emitter.decide(&frame, now);

        for emission in &emissions {
            tracing::debug!(
                camera_id = %self.config.camera_id,
                label = %emission.label,
                mood = %emission.mood,
                reason = ?emission.reason,
                "emitting recognition"
            );
            self.sink
                .submit(emission.to_recognition().with_camera(self.config.camera_id.clone()));
            self.counters.record_emitted();
        }

        let log = if self.session.is_active() {
            self.session.update(&frame, now)
        } else {
            Vec::new()
        };
        for entry in &log {
            tracing::info!(name = %entry.name, mood = %entry.mood, "mood changed");
        }

        TickReport {
            frame,
            emissions,
            log,
        }
    }

    /// Tick until `stop` is set, `until` passes or the source runs out.
    ///
    /// Frame errors are logged and the loop carries on.
    pub async fn run(&mut self, stop: &AtomicBool, until: Option<DateTime<Utc>>) {
        if !matches!(self.status, CameraStatus::Running) && self.start().await.is_err() {
            return;
        }

        let mut ticks: u64 = 0;
        while !stop.load(Ordering::SeqCst) {
            let now = Utc::now();
            if until.is_some_and(|deadline| now >= deadline) {
                break;
            }

            match self.tick(now).await {
                Ok(_) => {}
                Err(DetectionError::Exhausted) => {
                    tracing::info!(camera_id = %self.config.camera_id, "frame source exhausted");
                    break;
                }
                Err(e) => {
                    tracing::warn!(camera_id = %self.config.camera_id, error = %e, "frame failed");
                }
            }

            ticks += 1;
            if ticks % 100 == 0 {
                if let Err(e) = self.counters.save() {
                    tracing::warn!(error = %e, "failed to save pipeline counters");
                }
            }
            tokio::time::sleep(self.config.tick_delay).await;
        }

        if let Err(e) = self.counters.save() {
            tracing::warn!(error = %e, "failed to save pipeline counters");
        }
        self.status = CameraStatus::Stopped;
        tracing::info!(
            camera_id = %self.config.camera_id,
            ticks,
            tracked = self.stabilizer.tracked_count(),
            "camera stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mood::MoodClass;
    use crate::detection::{NoopDetector, ReplayDetector};
    use crate::telemetry::PipelineCounters;
    use chrono::{Duration, TimeZone};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn face(label: Option<&str>, descriptor: Option<Vec<f32>>, mood: &str) -> FaceDetection {
        FaceDetection {
            expression_scores: HashMap::from([(mood.to_string(), 0.9)]),
            descriptor,
            label: label.map(str::to_string),
            ..FaceDetection::default()
        }
    }

    fn camera<D: Detector>(detector: D) -> (CameraLoop<D>, Receiver<NewRecognition>, SharedCounters) {
        let counters = Arc::new(PipelineCounters::new());
        let (sink, rx) = ChannelSink::new(64);
        let mut config = Config::default();
        config.camera.camera_id = "hall".into();
        let cam = CameraLoop::new(&config, detector, Box::new(sink), counters.clone());
        (cam, rx, counters)
    }

    #[test]
    fn test_process_emits_after_min_hits() {
        let (mut cam, rx, counters) = camera(NoopDetector);

        for i in 0..3 {
            let report = cam.process(
                vec![face(Some("anna"), None, "happy")],
                t0() + Duration::milliseconds(i * 120),
            );
            if i < 2 {
                assert!(report.frame.is_empty());
                assert!(report.emissions.is_empty());
            } else {
                assert_eq!(report.frame.get("anna").unwrap().mood, MoodClass::Happy);
                assert_eq!(report.emissions.len(), 1);
            }
        }

        let sent = rx.try_recv().unwrap();
        assert_eq!(sent.name, "anna");
        assert_eq!(sent.mood, "happy");
        assert_eq!(sent.camera_id.as_deref(), Some("hall"));
        assert!(rx.try_recv().is_err());
        assert_eq!(counters.stats().frames_processed, 3);
        assert_eq!(counters.stats().events_emitted, 1);
    }

    #[test]
    fn test_gallery_labels_and_unknown_faces() {
        let (cam, rx, counters) = camera(NoopDetector);
        let mut gallery = FaceGallery::new(0.52);
        gallery.add("boris", vec![0.0, 0.0]);
        let mut cam = cam.with_gallery(gallery);

        for i in 0..4 {
            cam.process(
                vec![
                    face(None, Some(vec![0.1, 0.0]), "sad"),
                    face(None, Some(vec![5.0, 5.0]), "angry"),
                ],
                t0() + Duration::milliseconds(i * 120),
            );
        }

        let sent: Vec<NewRecognition> = rx.try_iter().collect();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].name, "boris");
        assert_eq!(sent[0].mood, "sad");
        assert!(cam.stabilizer().identity(UNKNOWN_LABEL).is_some());
        assert_eq!(counters.stats().unknown_faces, 4);
    }

    #[test]
    fn test_session_receives_frames_when_active() {
        let (mut cam, _rx, _) = camera(NoopDetector);
        cam.session_mut().start(t0());
        for i in 0..40 {
            cam.process(
                vec![face(Some("anna"), None, "happy")],
                t0() + Duration::milliseconds(i * 120),
            );
        }
        let summary = cam.session_mut().stop(t0() + Duration::seconds(5)).unwrap();
        let anna = summary.person("anna").unwrap();
        assert!(anna.total_ms() > 0);
        assert_eq!(anna.top_mood.as_ref().unwrap().mood, MoodClass::Happy);
    }

    #[tokio::test]
    async fn test_run_until_replay_exhausted() {
        let lines = (0..5)
            .map(|_| r#"[{"label": "cora", "expressionScores": {"surprised": 0.8}}]"#.to_string())
            .collect::<Vec<_>>();
        let (mut cam, rx, counters) = camera(ReplayDetector::from_lines(lines));

        let stop = AtomicBool::new(false);
        cam.run(&stop, None).await;

        assert_eq!(cam.status(), &CameraStatus::Stopped);
        assert_eq!(counters.stats().frames_processed, 5);
        let sent: Vec<NewRecognition> = rx.try_iter().collect();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].mood, "surprised");
    }

    #[tokio::test]
    async fn test_failed_start_is_unavailable() {
        let (mut cam, _rx, _) = camera(ReplayDetector::new("/nonexistent/moodwatch.jsonl"));
        let stop = AtomicBool::new(false);
        cam.run(&stop, None).await;
        assert!(matches!(cam.status(), CameraStatus::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_frame_errors_do_not_stop_loop() {
        let lines = vec![
            "garbage".to_string(),
            r#"[{"label": "dan", "expressionScores": {"neutral": 0.9}}]"#.to_string(),
        ];
        let (mut cam, _rx, counters) = camera(ReplayDetector::from_lines(lines));
        let stop = AtomicBool::new(false);
        cam.run(&stop, None).await;

        let stats = counters.stats();
        assert_eq!(stats.detection_errors, 1);
        assert_eq!(stats.frames_processed, 1);
    }

    fn anna() -> Vec<FaceDetection> {
        vec![face(Some("anna"), None, "happy")]
    }

    fn at(ms: i64) -> DateTime<Utc> {
        t0() + Duration::milliseconds(ms)
    }

    #[tokio::test]
    async fn test_frame_errors_still_evict() {
        let anna_line = r#"[{"label": "anna", "expressionScores": {"happy": 0.9}}]"#;
        let mut lines = vec![anna_line.to_string(); 3];
        lines.extend(std::iter::repeat("garbage".to_string()).take(30));
        lines.push(String::new());
        let (mut cam, _rx, counters) = camera(ReplayDetector::from_lines(lines));
        cam.session_mut().start(t0());

        for i in 0..33 {
            let result = cam.tick(at(i * 120)).await;
            if i == 15 {
                assert!(matches!(result, Err(DetectionError::Frame(_))));
                assert_eq!(cam.stabilizer().tracked_count(), 0);
            }
        }
        cam.tick(at(60_000)).await.unwrap();

        let summary = cam.session_mut().stop(at(61_000)).unwrap();
        // Stable at 240ms, evicted on the 1800ms tick
        assert_eq!(summary.person("anna").unwrap().total_ms(), 1560);
        let stats = counters.stats();
        assert_eq!(stats.detection_errors, 30);
        assert_eq!(stats.frames_processed, 4);
    }

    #[test]
    fn test_session_closes_at_eviction() {
        let (mut cam, rx, _) = camera(NoopDetector);
        cam.session_mut().start(t0());

        for i in 0..=41 {
            let faces = if i <= 10 { anna() } else { Vec::new() };
            cam.process(faces, at(i * 120));
        }

        let summary = cam.session_mut().stop(at(6_000)).unwrap();
        // Last seen 1200ms, first tick past grace is 2760ms
        assert_eq!(summary.person("anna").unwrap().total_ms(), 2520);
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn test_short_gap_keeps_interval_open() {
        let (mut cam, rx, _) = camera(NoopDetector);
        cam.session_mut().start(t0());

        for i in 0..=40 {
            let faces = if (11..=19).contains(&i) { Vec::new() } else { anna() };
            let report = cam.process(faces, at(i * 120));
            if i >= 2 {
                assert!(report.frame.get("anna").is_some());
            }
        }

        let summary = cam.session_mut().stop(at(5_000)).unwrap();
        assert_eq!(summary.person("anna").unwrap().total_ms(), 4760);
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[tokio::test]
    async fn test_start_forgets_tracked_identities() {
        let (mut cam, rx, _) = camera(NoopDetector);
        for i in 0..3 {
            cam.process(anna(), at(i * 120));
        }
        assert_eq!(cam.stabilizer().tracked_count(), 1);

        cam.start().await.unwrap();
        assert_eq!(cam.stabilizer().tracked_count(), 0);

        for i in 3..6 {
            cam.process(anna(), at(i * 120));
        }
        // Fresh emitter state: anna is announced again
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[tokio::test]
    async fn test_repeating_replay_runs_until_deadline() {
        let lines = vec![r#"[{"label": "eva", "expressionScores": {"sad": 0.9}}]"#.to_string()];
        let detector = ReplayDetector::from_lines(lines).repeating(true);
        let (mut cam, rx, counters) = camera(detector);
        cam.config.tick_delay = std::time::Duration::from_millis(5);

        let stop = AtomicBool::new(false);
        cam.run(&stop, Some(Utc::now() + Duration::milliseconds(200))).await;

        assert_eq!(cam.status(), &CameraStatus::Stopped);
        assert!(counters.stats().frames_processed > 3);
        assert_eq!(rx.try_iter().next().unwrap().name, "eva");
    }
}
