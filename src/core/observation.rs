//! Explicitly started/stopped observation sessions.
//!
//! While active, a session turns the stream of stabilized frames into
//! per-person, per-mood cumulative durations. Duration accounting is exact to
//! the tick; the change log is debounced by a dwell time so fast oscillation
//! does not spam it.

use crate::core::mood::MoodClass;
use crate::core::stabilizer::StableFrame;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Session settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationConfig {
    /// How long a new mood must persist before it is written to the change log
    #[serde(with = "crate::config::millis")]
    pub log_dwell: std::time::Duration,
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            log_dwell: std::time::Duration::from_secs(3),
        }
    }
}

/// One line of the mood change log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoodLogEntry {
    pub name: String,
    pub mood: MoodClass,
    pub at: DateTime<Utc>,
}

/// The mood with the largest accumulated duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopMood {
    pub mood: MoodClass,
    pub duration_ms: i64,
}

/// Per-person result of a finished session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonSummary {
    pub name: String,
    pub durations_ms: BTreeMap<MoodClass, i64>,
    pub top_mood: Option<TopMood>,
}

impl PersonSummary {
    pub fn total_ms(&self) -> i64 {
        self.durations_ms.values().sum()
    }
}

/// Result of [`ObservationSession::stop`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationSummary {
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub people: Vec<PersonSummary>,
    /// Largest mood summed across everyone
    pub overall_top_mood: Option<TopMood>,
}

impl ObservationSummary {
    pub fn elapsed(&self) -> Duration {
        self.stopped_at - self.started_at
    }

    pub fn person(&self, name: &str) -> Option<&PersonSummary> {
        self.people.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenInterval {
    mood: MoodClass,
    since: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct PendingChange {
    mood: MoodClass,
    since: DateTime<Utc>,
}

/// Two-state accumulator: inactive or active.
#[derive(Debug, Default)]
pub struct ObservationSession {
    config: ObservationConfig,
    active: bool,
    started_at: Option<DateTime<Utc>>,
    per_person: BTreeMap<String, BTreeMap<MoodClass, i64>>,
    open: HashMap<String, OpenInterval>,
    pending: HashMap<String, PendingChange>,
    last_logged: HashMap<String, MoodClass>,
    log: Vec<MoodLogEntry>,
}

impl ObservationSession {
    pub fn new(config: ObservationConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Change log entries, oldest first.
    pub fn log(&self) -> &[MoodLogEntry] {
        &self.log
    }

    /// Begin a session, discarding any previous accumulation.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.reset_accumulators();
        self.active = true;
        self.started_at = Some(now);
        tracing::info!(started_at = %now, "observation session started");
    }

    /// Feed one stabilized frame. Does nothing while inactive.
    ///
    /// Returns the change-log entries produced by this tick.
    pub fn update(&mut self, frame: &StableFrame, now: DateTime<Utc>) -> Vec<MoodLogEntry> {
        if !self.active {
            return Vec::new();
        }

        let visible: HashMap<&str, MoodClass> = frame.moods().collect();

        // Close intervals for people who left
        let gone: Vec<String> = self
            .open
            .keys()
            .filter(|name| !visible.contains_key(name.as_str()))
            .cloned()
            .collect();
        for name in gone {
            if let Some(interval) = self.open.remove(&name) {
                self.add_duration(&name, interval.mood, now - interval.since);
            }
            self.pending.remove(&name);
            self.last_logged.remove(&name);
        }

        // Open new intervals or switch moods
        for (name, mood) in frame.moods() {
            match self.open.get(name).copied() {
                None => {
                    self.open.insert(name.to_string(), OpenInterval { mood, since: now });
                    self.per_person.entry(name.to_string()).or_default();
                }
                Some(interval) if interval.mood != mood => {
                    self.add_duration(name, interval.mood, now - interval.since);
                    self.open.insert(name.to_string(), OpenInterval { mood, since: now });
                }
                Some(_) => {}
            }
        }

        self.advance_log(&visible, now)
    }

    fn advance_log(&mut self, visible: &HashMap<&str, MoodClass>, now: DateTime<Utc>) -> Vec<MoodLogEntry> {
        let dwell = Duration::from_std(self.config.log_dwell).unwrap_or(Duration::zero());
        let mut written = Vec::new();

        let mut names: Vec<&&str> = visible.keys().collect();
        names.sort();
        for name in names {
            let mood = visible[*name];
            match self.pending.get(*name).copied() {
                Some(pending) if pending.mood == mood => {
                    if now - pending.since >= dwell && self.last_logged.get(*name) != Some(&mood) {
                        let entry = MoodLogEntry {
                            name: name.to_string(),
                            mood,
                            at: now,
                        };
                        self.last_logged.insert(name.to_string(), mood);
                        self.log.push(entry.clone());
                        written.push(entry);
                    }
                }
                _ => {
                    self.pending
                        .insert(name.to_string(), PendingChange { mood, since: now });
                }
            }
        }

        written
    }

    /// End the session: flush open intervals and summarize.
    ///
    /// Returns `None` if the session was not active.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Option<ObservationSummary> {
        if !self.active {
            return None;
        }
        self.flush(now);
        self.active = false;

        let summary = self.summary(now);
        tracing::info!(
            people = summary.people.len(),
            elapsed_ms = summary.elapsed().num_milliseconds(),
            "observation session stopped"
        );
        Some(summary)
    }

    /// Reset every accumulator; the active flag is left as is.
    pub fn clear(&mut self) {
        self.reset_accumulators();
    }

    /// Close all open intervals at `now`.
    fn flush(&mut self, now: DateTime<Utc>) {
        let open: Vec<(String, OpenInterval)> = self.open.drain().collect();
        for (name, interval) in open {
            self.add_duration(&name, interval.mood, now - interval.since);
        }
        self.pending.clear();
        self.last_logged.clear();
    }

    /// Accumulated (closed) durations for one person.
    pub fn durations_for(&self, name: &str) -> Option<&BTreeMap<MoodClass, i64>> {
        self.per_person.get(name)
    }

    fn summary(&self, now: DateTime<Utc>) -> ObservationSummary {
        let mut overall: BTreeMap<MoodClass, i64> = BTreeMap::new();
        let people = self
            .per_person
            .iter()
            .map(|(name, moods)| {
                for (mood, ms) in moods {
                    *overall.entry(*mood).or_insert(0) += ms;
                }
                PersonSummary {
                    name: name.clone(),
                    durations_ms: moods.clone(),
                    top_mood: top_mood(moods),
                }
            })
            .collect();

        ObservationSummary {
            started_at: self.started_at.unwrap_or(now),
            stopped_at: now,
            people,
            overall_top_mood: top_mood(&overall),
        }
    }

    fn add_duration(&mut self, name: &str, mood: MoodClass, delta: Duration) {
        let ms = delta.num_milliseconds();
        if ms <= 0 {
            return;
        }
        *self
            .per_person
            .entry(name.to_string())
            .or_default()
            .entry(mood)
            .or_insert(0) += ms;
    }

    fn reset_accumulators(&mut self) {
        self.per_person.clear();
        self.open.clear();
        self.pending.clear();
        self.last_logged.clear();
        self.log.clear();
    }
}

/// Largest entry; on equal durations the first mood in enum order wins.
fn top_mood(moods: &BTreeMap<MoodClass, i64>) -> Option<TopMood> {
    moods
        .iter()
        .filter(|(_, ms)| **ms > 0)
        .fold(None, |best: Option<TopMood>, (mood, ms)| match best {
            Some(b) if b.duration_ms >= *ms => Some(b),
            _ => Some(TopMood {
                mood: *mood,
                duration_ms: *ms,
            }),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stabilizer::StableIdentity;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn secs(n: i64) -> Duration {
        Duration::seconds(n)
    }

    fn frame(people: &[(&str, MoodClass)]) -> StableFrame {
        StableFrame {
            at: None,
            identities: people
                .iter()
                .map(|(label, mood)| StableIdentity {
                    label: label.to_string(),
                    mood: *mood,
                    seen_this_tick: true,
                })
                .collect(),
            evicted: Vec::new(),
        }
    }

    #[test]
    fn test_inactive_session_ignores_frames() {
        let mut session = ObservationSession::new(ObservationConfig::default());
        session.update(&frame(&[("anna", MoodClass::Happy)]), t0());
        assert!(session.durations_for("anna").is_none());
        assert!(session.stop(t0()).is_none());
    }

    #[test]
    fn test_durations_sum_to_visible_time() {
        let mut session = ObservationSession::new(ObservationConfig::default());
        let start = t0();
        session.start(start);

        session.update(&frame(&[("anna", MoodClass::Neutral)]), start);
        session.update(&frame(&[("anna", MoodClass::Neutral)]), start + secs(4));
        session.update(&frame(&[("anna", MoodClass::Happy)]), start + secs(10));
        session.update(&frame(&[("anna", MoodClass::Sad)]), start + secs(12));
        session.update(&frame(&[]), start + secs(15));

        let summary = session.stop(start + secs(20)).unwrap();
        let anna = summary.person("anna").unwrap();
        assert_eq!(anna.durations_ms.get(&MoodClass::Neutral), Some(&10_000));
        assert_eq!(anna.durations_ms.get(&MoodClass::Happy), Some(&2_000));
        assert_eq!(anna.durations_ms.get(&MoodClass::Sad), Some(&3_000));
        assert_eq!(anna.total_ms(), 15_000);
        assert_eq!(anna.top_mood.map(|t| t.mood), Some(MoodClass::Neutral));
    }

    #[test]
    fn test_stop_flushes_open_intervals_and_overall_top() {
        let mut session = ObservationSession::new(ObservationConfig::default());
        let start = t0();
        session.start(start);
        session.update(
            &frame(&[("anna", MoodClass::Happy), ("boris", MoodClass::Angry)]),
            start,
        );
        session.update(&frame(&[("anna", MoodClass::Happy), ("boris", MoodClass::Happy)]), start + secs(5));

        let summary = session.stop(start + secs(8)).unwrap();
        assert_eq!(summary.person("anna").unwrap().total_ms(), 8_000);
        assert_eq!(summary.person("boris").unwrap().total_ms(), 8_000);
        assert_eq!(
            summary.overall_top_mood,
            Some(TopMood {
                mood: MoodClass::Happy,
                duration_ms: 11_000
            })
        );
        assert!(!session.is_active());
    }

    #[test]
    fn test_log_requires_dwell_and_change() {
        let mut session = ObservationSession::new(ObservationConfig::default());
        let start = t0();
        session.start(start);

        assert!(session.update(&frame(&[("anna", MoodClass::Happy)]), start).is_empty());
        assert!(session
            .update(&frame(&[("anna", MoodClass::Happy)]), start + secs(2))
            .is_empty());
        let written = session.update(&frame(&[("anna", MoodClass::Happy)]), start + secs(3));
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].mood, MoodClass::Happy);

        // Same mood again is not re-logged
        assert!(session
            .update(&frame(&[("anna", MoodClass::Happy)]), start + secs(9))
            .is_empty());

        // Short oscillation never reaches the dwell time
        session.update(&frame(&[("anna", MoodClass::Sad)]), start + secs(10));
        session.update(&frame(&[("anna", MoodClass::Happy)]), start + secs(11));
        session.update(&frame(&[("anna", MoodClass::Sad)]), start + secs(12));
        assert!(session
            .update(&frame(&[("anna", MoodClass::Sad)]), start + secs(14))
            .is_empty());
        let written = session.update(&frame(&[("anna", MoodClass::Sad)]), start + secs(15));
        assert_eq!(written.len(), 1);
        assert_eq!(session.log().len(), 2);
    }

    #[test]
    fn test_clear_keeps_active_flag() {
        let mut session = ObservationSession::new(ObservationConfig::default());
        let start = t0();
        session.start(start);
        session.update(&frame(&[("anna", MoodClass::Happy)]), start);
        session.update(&frame(&[]), start + secs(2));
        session.clear();

        assert!(session.is_active());
        assert!(session.durations_for("anna").is_none());
    }

    #[test]
    fn test_clear_keeps_session_start() {
        let mut session = ObservationSession::new(ObservationConfig::default());
        let start = t0();
        session.start(start);
        session.update(&frame(&[("anna", MoodClass::Happy)]), start);
        session.clear();
        assert_eq!(session.started_at(), Some(start));

        let summary = session.stop(start + secs(10)).unwrap();
        assert_eq!(summary.started_at, start);
        assert_eq!(summary.elapsed(), secs(10));
        assert!(summary.people.is_empty());
    }

    #[test]
    fn test_start_resets_previous_results() {
        let mut session = ObservationSession::new(ObservationConfig::default());
        let start = t0();
        session.start(start);
        session.update(&frame(&[("anna", MoodClass::Happy)]), start);
        session.stop(start + secs(5));

        session.start(start + secs(10));
        let summary = session.stop(start + secs(11)).unwrap();
        assert!(summary.people.is_empty());
        assert_eq!(summary.overall_top_mood, None);
    }
}
