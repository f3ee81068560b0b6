//! When to turn a stable mood into a durable recognition event.
//!
//! The emitter only decides; delivery is handed to a
//! [`RecognitionSink`](crate::camera::RecognitionSink) by the camera loop.

use crate::core::event::NewRecognition;
use crate::core::mood::MoodClass;
use crate::core::stabilizer::{StableFrame, UNKNOWN_LABEL};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Emission policy settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitterConfig {
    /// Re-send an unchanged mood after this long
    #[serde(with = "crate::config::millis")]
    pub resend_interval: std::time::Duration,
    /// Emit events for faces that matched no gallery entry
    pub track_anonymous: bool,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            resend_interval: std::time::Duration::from_secs(15),
            track_anonymous: false,
        }
    }
}

/// Why an emission was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitReason {
    Appeared,
    MoodChanged,
    Resend,
}

/// One outbound event decided this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emission {
    pub label: String,
    pub mood: MoodClass,
    pub at: DateTime<Utc>,
    pub reason: EmitReason,
}

impl Emission {
    pub fn to_recognition(&self) -> NewRecognition {
        NewRecognition::new(self.label.clone(), self.mood.as_str(), self.at)
    }
}

#[derive(Debug, Clone, Copy)]
struct Emitted {
    mood: MoodClass,
    at: DateTime<Utc>,
}

/// Dedup bookkeeping for one camera.
#[derive(Debug)]
pub struct RecognitionEmitter {
    config: EmitterConfig,
    last: HashMap<String, Emitted>,
}

impl RecognitionEmitter {
    pub fn new(config: EmitterConfig) -> Self {
        Self {
            config,
            last: HashMap::new(),
        }
    }

    /// Decide this tick's emissions from a stabilized frame.
    ///
    /// Labels evicted by the stabilizer are forgotten first, so their next
    /// sighting counts as a fresh appearance. Only labels actually observed
    /// this tick are considered; a label yields at most one emission.
    pub fn decide(&mut self, frame: &StableFrame, now: DateTime<Utc>) -> Vec<Emission> {
        for label in &frame.evicted {
            self.last.remove(label);
        }

        let resend = Duration::from_std(self.config.resend_interval)
            .unwrap_or_else(|_| Duration::days(365));
        let mut emissions = Vec::new();

        for identity in frame.identities.iter().filter(|i| i.seen_this_tick) {
            if identity.label == UNKNOWN_LABEL && !self.config.track_anonymous {
                continue;
            }

            let reason = match self.last.get(&identity.label) {
                None => Some(EmitReason::Appeared),
                Some(prev) if prev.mood != identity.mood => Some(EmitReason::MoodChanged),
                Some(prev) if now - prev.at >= resend => Some(EmitReason::Resend),
                Some(_) => None,
            };

            if let Some(reason) = reason {
                self.last.insert(
                    identity.label.clone(),
                    Emitted {
                        mood: identity.mood,
                        at: now,
                    },
                );
                emissions.push(Emission {
                    label: identity.label.clone(),
                    mood: identity.mood,
                    at: now,
                    reason,
                });
            }
        }

        emissions
    }

    /// Labels with emission bookkeeping.
    pub fn tracked(&self) -> usize {
        self.last.len()
    }

    pub fn reset(&mut self) {
        self.last.clear();
    }
}
