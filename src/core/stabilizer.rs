//! Per-camera identity and mood stabilization.
//!
//! Raw per-frame detections flicker: a face is missed for a frame, or its
//! expression is misclassified for one or two frames. The [`Stabilizer`]
//! smooths that stream into a debounced mood per label:
//!
//! 1. Each observed mood is pushed into a bounded window for its label.
//! 2. The window majority becomes a candidate; the candidate must win
//!    `min_hits` consecutive ticks before it is reported as the stable mood.
//! 3. A label not seen for longer than `absence_grace` is evicted, and a
//!    later sighting starts again from scratch.
//!
//! All timing is a comparison against stored timestamps; [`Stabilizer::advance`]
//! is synchronous and is invoked exactly once per detection tick.

use crate::core::mood::MoodClass;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Label assigned to faces that do not match any gallery entry.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Tunables for the stabilizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilizerConfig {
    /// Number of recent observations kept per label
    pub window: usize,
    /// Consecutive majority wins required before a mood is reported
    pub min_hits: u32,
    /// How long a label stays present after its last sighting
    #[serde(with = "crate::config::millis")]
    pub absence_grace: std::time::Duration,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            window: 6,
            min_hits: 3,
            absence_grace: std::time::Duration::from_millis(1500),
        }
    }
}

/// One per-frame observation: a label and its classified mood.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub label: String,
    pub mood: MoodClass,
}

impl Observation {
    pub fn new(label: impl Into<String>, mood: MoodClass) -> Self {
        Self {
            label: label.into(),
            mood,
        }
    }

    /// Whether this observation belongs to an unmatched face.
    pub fn is_anonymous(&self) -> bool {
        self.label == UNKNOWN_LABEL
    }
}

/// Stabilizer state for one label.
#[derive(Debug, Clone)]
pub struct TrackedIdentity {
    pub label: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    /// Last reported mood; `None` until `min_hits` is first reached
    pub stable_mood: Option<MoodClass>,
    /// Consecutive ticks the current candidate has been the window majority
    pub stable_hit_count: u32,
    candidate: Option<MoodClass>,
    mood_history: VecDeque<MoodClass>,
}

impl TrackedIdentity {
    fn new(label: String, now: DateTime<Utc>, window: usize) -> Self {
        Self {
            label,
            first_seen_at: now,
            last_seen_at: now,
            stable_mood: None,
            stable_hit_count: 0,
            candidate: None,
            mood_history: VecDeque::with_capacity(window),
        }
    }

    /// Recent moods, oldest first.
    pub fn mood_history(&self) -> impl Iterator<Item = &MoodClass> {
        self.mood_history.iter()
    }

    /// Record a sighting and advance the hit counter.
    fn observe(&mut self, mood: MoodClass, now: DateTime<Utc>, config: &StabilizerConfig) {
        self.last_seen_at = now;

        self.mood_history.push_back(mood);
        while self.mood_history.len() > config.window {
            self.mood_history.pop_front();
        }

        let majority = self.majority();
        if self.candidate == Some(majority) {
            self.stable_hit_count = (self.stable_hit_count + 1).min(config.window as u32);
        } else {
            self.candidate = Some(majority);
            self.stable_hit_count = 1;
        }

        if self.stable_hit_count >= config.min_hits {
            self.stable_mood = Some(majority);
        }
    }

    /// Most frequent mood in the window.
    ///
    /// Ties prefer the current stable mood, then the most recently observed.
    fn majority(&self) -> MoodClass {
        let mut counts: HashMap<MoodClass, usize> = HashMap::new();
        for mood in &self.mood_history {
            *counts.entry(*mood).or_insert(0) += 1;
        }
        let top = counts.values().copied().max().unwrap_or(0);

        if let Some(stable) = self.stable_mood {
            if counts.get(&stable).copied() == Some(top) {
                return stable;
            }
        }

        self.mood_history
            .iter()
            .rev()
            .find(|m| counts.get(m).copied() == Some(top))
            .copied()
            .unwrap_or(MoodClass::Neutral)
    }
}

/// A label currently reported as present, with its debounced mood.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StableIdentity {
    pub label: String,
    pub mood: MoodClass,
    /// Whether the label was actually observed this tick (vs. held by grace)
    pub seen_this_tick: bool,
}

/// Output of one [`Stabilizer::advance`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StableFrame {
    pub at: Option<DateTime<Utc>>,
    /// Stable labels, in the order they first became stable
    pub identities: Vec<StableIdentity>,
    /// Labels evicted during this tick
    pub evicted: Vec<String>,
}

impl StableFrame {
    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn get(&self, label: &str) -> Option<&StableIdentity> {
        self.identities.iter().find(|i| i.label == label)
    }

    /// `(label, mood)` pairs in display order.
    pub fn moods(&self) -> impl Iterator<Item = (&str, MoodClass)> {
        self.identities.iter().map(|i| (i.label.as_str(), i.mood))
    }
}

/// Debounces per-frame observations for one camera.
#[derive(Debug)]
pub struct Stabilizer {
    config: StabilizerConfig,
    identities: HashMap<String, TrackedIdentity>,
    stable_order: Vec<String>,
}

impl Stabilizer {
    pub fn new(config: StabilizerConfig) -> Self {
        Self {
            config,
            identities: HashMap::new(),
            stable_order: Vec::new(),
        }
    }

    pub fn config(&self) -> &StabilizerConfig {
        &self.config
    }

    /// Look up the tracked state for a label.
    pub fn identity(&self, label: &str) -> Option<&TrackedIdentity> {
        self.identities.get(label)
    }

    /// Number of labels currently tracked (stable or not).
    pub fn tracked_count(&self) -> usize {
        self.identities.len()
    }

    /// Fold this tick's observations into the state and report stable labels.
    ///
    /// Zero observations is a valid tick: eviction still runs. When a label
    /// appears more than once in a tick only its first observation counts.
    pub fn advance(&mut self, observations: &[Observation], now: DateTime<Utc>) -> StableFrame {
        let mut seen: Vec<&str> = Vec::with_capacity(observations.len());

        for obs in observations {
            if seen.contains(&obs.label.as_str()) {
                continue;
            }
            seen.push(obs.label.as_str());

            let window = self.config.window;
            let identity = self
                .identities
                .entry(obs.label.clone())
                .or_insert_with(|| TrackedIdentity::new(obs.label.clone(), now, window));
            identity.observe(obs.mood, now, &self.config);

            if identity.stable_mood.is_some() && !self.stable_order.contains(&obs.label) {
                self.stable_order.push(obs.label.clone());
            }
        }

        let evicted = self.evict_absent(now);

        let identities = self
            .stable_order
            .iter()
            .filter_map(|label| {
                let identity = self.identities.get(label)?;
                Some(StableIdentity {
                    label: label.clone(),
                    mood: identity.stable_mood?,
                    seen_this_tick: seen.contains(&label.as_str()),
                })
            })
            .collect();

        StableFrame {
            at: Some(now),
            identities,
            evicted,
        }
    }

    /// Drop every identity whose last sighting is older than the grace period.
    fn evict_absent(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let grace = Duration::from_std(self.config.absence_grace).unwrap_or(Duration::zero());

        let mut evicted: Vec<String> = self
            .identities
            .values()
            .filter(|identity| now - identity.last_seen_at > grace)
            .map(|identity| identity.label.clone())
            .collect();
        evicted.sort();

        for label in &evicted {
            self.identities.remove(label);
            tracing::debug!(label = %label, "identity evicted after absence grace");
        }
        self.stable_order.retain(|label| !evicted.contains(label));

        evicted
    }

    /// Forget everything (e.g. when the camera source changes).
    pub fn reset(&mut self) {
        self.identities.clear();
        self.stable_order.clear();
    }
}
