//! Core logic for moodwatch.
//!
//! This module contains:
//! - Mood classification and sentiment grouping
//! - Per-camera identity stabilization and the emission policy
//! - Observation sessions (dwell time per person and mood)
//! - Time bucketing, range resolution and risk ranking for analytics
//!
//! Nothing here performs I/O; every operation takes `now` explicitly.

pub mod buckets;
pub mod emitter;
pub mod event;
pub mod mood;
pub mod observation;
pub mod range;
pub mod risk;
pub mod stabilizer;

// Re-export commonly used types
pub use buckets::{BucketPoint, LiveWindow, MinuteBucket};
pub use emitter::{EmitReason, Emission, EmitterConfig, RecognitionEmitter};
pub use event::{NewRecognition, RecognitionEvent};
pub use mood::{classify_expression, classify_sentiment, ClassifierConfig, MoodClass, Sentiment};
pub use observation::{ObservationConfig, ObservationSession, ObservationSummary};
pub use range::{RangeError, RangePolicy, RangeQuery, TimeRange};
pub use risk::{MoodTally, RiskEntry};
pub use stabilizer::{StabilizerConfig, StableFrame, Stabilizer, UNKNOWN_LABEL};
