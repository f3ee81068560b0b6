//! moodwatch - per-camera mood stabilization and emotion analytics.
//!
//! A camera loop turns noisy per-frame face detections into stable
//! `(person, mood)` recognitions and posts them to a server, which stores
//! them and serves time-bucketed views: a live per-minute window, hour-bucketed
//! history over a date range, per-person detail and a risk leaderboard.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────── camera loop (one per camera) ───────────────────────┐
//! │ ┌──────────┐   ┌───────────┐   ┌────────────┐   ┌─────────┐   ┌───────────┐ │
//! │ │ Detector │──▶│ Classifier│──▶│ Stabilizer │──▶│ Emitter │──▶│   Sink    │ │
//! │ │(+gallery)│   │  (mood)   │   │ (k-of-n)   │   │ (policy)│   │(HTTP/chan)│ │
//! │ └──────────┘   └───────────┘   └─────┬──────┘   └─────────┘   └─────┬─────┘ │
//! │                                      ▼                              │       │
//! │                              ┌──────────────┐                       │       │
//! │                              │ Observation  │                       │       │
//! │                              └──────────────┘                       │       │
//! └─────────────────────────────────────────────────────────────────────┼───────┘
//!                                                                       ▼
//! ┌──────────────────────────────── server ─────────────────────────────────────┐
//! │  POST /recognitions ──▶ RecognitionStore ──▶ analytics (buckets, risk)      │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use moodwatch::camera::{CameraLoop, ChannelSink};
//! use moodwatch::detection::ReplayDetector;
//! use moodwatch::telemetry::PipelineCounters;
//! use std::sync::Arc;
//!
//! # async fn demo() {
//! let config = moodwatch::Config::default();
//! let (sink, recognitions) = ChannelSink::new(64);
//! let mut camera = CameraLoop::new(
//!     &config,
//!     ReplayDetector::new("frames.jsonl"),
//!     Box::new(sink),
//!     Arc::new(PipelineCounters::new()),
//! );
//!
//! let stop = std::sync::atomic::AtomicBool::new(false);
//! camera.run(&stop, None).await;
//! for r in recognitions.try_iter() {
//!     println!("{} is {}", r.name, r.mood);
//! }
//! # }
//! ```

pub mod analytics;
pub mod camera;
pub mod config;
pub mod core;
pub mod detection;
pub mod store;
pub mod telemetry;

#[cfg(feature = "ingest")]
pub mod ingest;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use camera::{CameraConfig, CameraLoop, CameraStatus, ChannelSink, RecognitionSink};
pub use config::{Config, ConfigError};
pub use core::{MoodClass, NewRecognition, RecognitionEvent, Sentiment};
pub use detection::{DetectionError, Detector, FaceDetection};
pub use store::{RecognitionStore, StoreError};
pub use telemetry::{PipelineCounters, PipelineStats, SharedCounters};

#[cfg(feature = "ingest")]
pub use ingest::{HttpSink, IngestClient, IngestError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
