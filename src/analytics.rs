//! Store-backed analytics queries.
//!
//! Each function is a stateless read (the live view also upserts and prunes
//! its own minute bucket) and returns a response-shaped struct that the HTTP
//! layer serializes as-is.

use crate::config::AggregationConfig;
use crate::core::buckets::{
    aggregate_minute, group_by_hour, group_by_minute, zero_fill, BucketPoint, LiveWindow,
    MinuteBucket,
};
use crate::core::event::RecognitionEvent;
use crate::core::mood::{classify_sentiment, Sentiment};
use crate::core::range::{RangeError, RangeQuery, TimeRange};
use crate::core::risk::{percent, rank, MoodTally, RiskEntry};
use crate::store::{RecognitionStore, StoreError};
use chrono::{DateTime, Duration, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use std::collections::BTreeMap;

/// Characters left unescaped by `encodeURIComponent`.
const PERSON_ID: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// URL-safe id for a person name.
pub fn person_id(name: &str) -> String {
    utf8_percent_encode(name, PERSON_ID).to_string()
}

/// Ranked lists by range never exceed this many people.
pub const RANGE_STUDENT_LIMIT: usize = 20;
/// Recent events attached to a person's 24 h detail.
pub const DETAIL_RECENT_LIMIT: usize = 15;
/// Recent events attached to a person's range view.
pub const RANGE_RECENT_LIMIT: usize = 20;

/// Errors from analytics queries.
#[derive(Debug)]
pub enum QueryError {
    InvalidRange(RangeError),
    PersonNotFound(String),
    Store(StoreError),
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::InvalidRange(e) => write!(f, "Invalid range: {e}"),
            QueryError::PersonNotFound(name) => write!(f, "No recognitions for {name}"),
            QueryError::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for QueryError {}

impl From<RangeError> for QueryError {
    fn from(e: RangeError) -> Self {
        QueryError::InvalidRange(e)
    }
}

impl From<StoreError> for QueryError {
    fn from(e: StoreError) -> Self {
        QueryError::Store(e)
    }
}

fn tally(events: &[RecognitionEvent]) -> MoodTally {
    let mut tally = MoodTally::default();
    for event in events {
        tally.add_raw(&event.mood);
    }
    tally
}

fn tally_by_person(events: &[RecognitionEvent]) -> BTreeMap<&str, MoodTally> {
    let mut people: BTreeMap<&str, MoodTally> = BTreeMap::new();
    for event in events {
        people.entry(event.name.as_str()).or_default().add_raw(&event.mood);
    }
    people
}

/// A bare event as listed on person pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBrief {
    pub id: String,
    pub mood: String,
    pub detected_at: DateTime<Utc>,
}

impl From<&RecognitionEvent> for EventBrief {
    fn from(e: &RecognitionEvent) -> Self {
        Self {
            id: e.id.clone(),
            mood: e.mood.clone(),
            detected_at: e.detected_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Live minute view
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveDynamics {
    /// One point per minute of the window, oldest first, zero-filled
    pub points: Vec<BucketPoint>,
    pub latest_snapshot: MinuteBucket,
}

/// Refresh the current minute bucket, prune stale ones and return the window.
///
/// Upsert, prune and scan are three separate statements; the prune is
/// housekeeping and its failure is only logged.
pub fn live_dynamics(
    store: &RecognitionStore,
    window: Duration,
    now: DateTime<Utc>,
) -> Result<LiveDynamics, StoreError> {
    let live = LiveWindow::ending_at(now, window);

    let events = store.minute_events(live.current, live.current_end())?;
    let current = aggregate_minute(live.current, &events);
    store.upsert_bucket(&current)?;

    match store.delete_buckets_before(live.first) {
        Ok(0) => {}
        Ok(removed) => tracing::debug!(removed, cutoff = %live.first, "pruned minute buckets"),
        Err(e) => tracing::warn!(error = %e, "failed to prune minute buckets"),
    }

    let stored: Vec<BucketPoint> = store
        .scan_buckets(live.first)?
        .into_iter()
        .map(|b| b.point)
        .filter(|p| p.bucket_start <= live.current)
        .collect();

    Ok(LiveDynamics {
        points: zero_fill(stored, live.first, live.current, Duration::minutes(1)),
        latest_snapshot: current,
    })
}

// ---------------------------------------------------------------------------
// Historical range view
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeSummary {
    pub risk_count: u64,
    pub negative_percent: u32,
    pub recognitions_count: u64,
    pub positive_count: u64,
    pub neutral_count: u64,
    pub negative_count: u64,
}

/// A person in a ranked list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedPerson {
    pub id: String,
    pub name: String,
    pub positive_count: u64,
    pub neutral_count: u64,
    pub negative_count: u64,
    pub risk_score: u32,
    pub risk_by_rule: bool,
}

impl From<&RiskEntry> for RankedPerson {
    fn from(entry: &RiskEntry) -> Self {
        Self {
            id: person_id(&entry.name),
            name: entry.name.clone(),
            positive_count: entry.tally.positive,
            neutral_count: entry.tally.neutral,
            negative_count: entry.tally.negative,
            risk_score: entry.risk_score,
            risk_by_rule: entry.risk_by_rule,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RangeStats {
    pub range: TimeRange,
    pub stats: RangeSummary,
    /// Hour buckets that received events, oldest first
    pub points: Vec<BucketPoint>,
    pub students: Vec<RankedPerson>,
}

/// Hour-bucketed statistics over a resolved range.
pub fn range_stats(
    store: &RecognitionStore,
    config: &AggregationConfig,
    query: &RangeQuery,
    now: DateTime<Utc>,
) -> Result<RangeStats, QueryError> {
    let range = query.resolve(&config.range_policy(), now)?;
    let tz = config.tz().unwrap_or(chrono_tz::UTC);

    let events = store.range(range.from, range.to, None)?;
    let total = tally(&events);
    let people = tally_by_person(&events);

    let entries: Vec<RiskEntry> = people
        .iter()
        .filter(|(_, t)| t.leans_non_positive())
        .map(|(name, t)| RiskEntry::new(*name, *t))
        .collect();
    // Counted over everyone listed, before the top-N cut
    let risk_count = entries.iter().filter(|e| e.risk_by_rule).count() as u64;

    Ok(RangeStats {
        range,
        stats: RangeSummary {
            risk_count,
            negative_percent: total.negative_percent(),
            recognitions_count: total.total(),
            positive_count: total.positive,
            neutral_count: total.neutral,
            negative_count: total.negative,
        },
        points: group_by_hour(&events, tz),
        students: rank(entries, RANGE_STUDENT_LIMIT)
            .iter()
            .map(RankedPerson::from)
            .collect(),
    })
}

// ---------------------------------------------------------------------------
// Leaderboard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub id: String,
    pub name: String,
    pub total: u64,
    pub positive_count: u64,
    pub neutral_count: u64,
    pub negative_count: u64,
    pub risk_percent: u32,
    pub risk_by_rule: bool,
    pub last_mood: String,
    pub last_detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Leaderboard {
    pub items: Vec<LeaderboardEntry>,
}

/// Everyone seen within `window` before `now`, ranked by risk.
pub fn leaderboard(
    store: &RecognitionStore,
    window: Duration,
    limit: usize,
    now: DateTime<Utc>,
) -> Result<Leaderboard, StoreError> {
    let events = store.range(now - window, now, None)?;

    let mut last_seen: BTreeMap<&str, &RecognitionEvent> = BTreeMap::new();
    for event in &events {
        // Events arrive oldest first, so the last write wins
        last_seen.insert(event.name.as_str(), event);
    }

    let ranked = rank(
        tally_by_person(&events)
            .into_iter()
            .map(|(name, t)| RiskEntry::new(name, t)),
        limit,
    );

    let items = ranked
        .into_iter()
        .enumerate()
        .filter_map(|(i, entry)| {
            let last = last_seen.get(entry.name.as_str())?;
            Some(LeaderboardEntry {
                rank: i + 1,
                id: person_id(&entry.name),
                total: entry.tally.total(),
                positive_count: entry.tally.positive,
                neutral_count: entry.tally.neutral,
                negative_count: entry.tally.negative,
                risk_percent: entry.risk_score,
                risk_by_rule: entry.risk_by_rule,
                last_mood: last.mood.clone(),
                last_detected_at: last.detected_at,
                name: entry.name,
            })
        })
        .collect();

    Ok(Leaderboard { items })
}

// ---------------------------------------------------------------------------
// Per-person views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRef {
    pub id: String,
    pub name: String,
    pub first_letter: String,
}

impl StudentRef {
    fn new(name: &str) -> Self {
        Self {
            id: person_id(name),
            name: name.to_string(),
            first_letter: name
                .chars()
                .next()
                .map(|c| c.to_uppercase().collect())
                .unwrap_or_else(|| "?".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonStats {
    pub total_recognitions: u64,
    pub positive_percent: u32,
    pub neutral_percent: u32,
    pub negative_percent: u32,
    pub positive_count: u64,
    pub neutral_count: u64,
    pub negative_count: u64,
    pub risk_percent: u32,
    pub risk_by_rule: bool,
}

impl From<MoodTally> for PersonStats {
    fn from(t: MoodTally) -> Self {
        Self {
            total_recognitions: t.total(),
            positive_percent: t.positive_percent(),
            neutral_percent: t.neutral_percent(),
            negative_percent: t.negative_percent(),
            positive_count: t.positive,
            neutral_count: t.neutral,
            negative_count: t.negative,
            risk_percent: t.risk_score(),
            risk_by_rule: t.risk_by_rule(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDetail {
    pub student: StudentRef,
    pub stats_24h: PersonStats,
    /// Events in the window, oldest first
    pub dynamics: Vec<EventBrief>,
    /// Minute buckets that received events, oldest first
    pub dynamics_points: Vec<BucketPoint>,
    /// Most recent events overall, newest first
    pub recent: Vec<EventBrief>,
}

/// One person's last `window`, or `PersonNotFound` if they were never seen.
pub fn student_detail(
    store: &RecognitionStore,
    name: &str,
    window: Duration,
    now: DateTime<Utc>,
) -> Result<StudentDetail, QueryError> {
    let recent = store.latest_for(name, DETAIL_RECENT_LIMIT)?;
    if recent.is_empty() {
        return Err(QueryError::PersonNotFound(name.to_string()));
    }

    let events = store.range(now - window, now, Some(name))?;

    Ok(StudentDetail {
        student: StudentRef::new(name),
        stats_24h: tally(&events).into(),
        dynamics: events.iter().map(EventBrief::from).collect(),
        dynamics_points: group_by_minute(&events),
        recent: recent.iter().map(EventBrief::from).collect(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonRangeStats {
    pub risk_by_rule: bool,
    pub risk_score: u32,
    pub negative_percent: u32,
    pub recognitions_count: u64,
    pub positive_count: u64,
    pub neutral_count: u64,
    pub negative_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentRange {
    pub student: StudentRef,
    pub range: TimeRange,
    pub stats: PersonRangeStats,
    pub points: Vec<BucketPoint>,
    /// Newest first
    pub recent: Vec<EventBrief>,
}

/// One person's hour-bucketed history over a resolved range.
///
/// The range is validated before the person lookup, so a bad range on an
/// unknown person reports the range.
pub fn student_range(
    store: &RecognitionStore,
    config: &AggregationConfig,
    name: &str,
    query: &RangeQuery,
    now: DateTime<Utc>,
) -> Result<StudentRange, QueryError> {
    let range = query.resolve(&config.range_policy(), now)?;
    if !store.has_person(name)? {
        return Err(QueryError::PersonNotFound(name.to_string()));
    }
    let tz = config.tz().unwrap_or(chrono_tz::UTC);

    let events = store.range(range.from, range.to, Some(name))?;
    let t = tally(&events);

    Ok(StudentRange {
        student: StudentRef::new(name),
        range,
        stats: PersonRangeStats {
            risk_by_rule: t.risk_by_rule(),
            risk_score: t.risk_score(),
            negative_percent: t.negative_percent(),
            recognitions_count: t.total(),
            positive_count: t.positive,
            neutral_count: t.neutral,
            negative_count: t.negative,
        },
        points: group_by_hour(&events, tz),
        recent: events
            .iter()
            .rev()
            .take(RANGE_RECENT_LIMIT)
            .map(EventBrief::from)
            .collect(),
    })
}

// ---------------------------------------------------------------------------
// Dashboard and people search
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub connected_cameras: usize,
    pub recognitions_last_24h: u64,
    pub negative_percent: u32,
    pub negative_delta_vs_prev_day: i64,
    pub risk_zone_count: u64,
}

/// Compare the last `window` with the one before it.
pub fn dashboard_summary(
    store: &RecognitionStore,
    window: Duration,
    now: DateTime<Utc>,
) -> Result<DashboardSummary, StoreError> {
    let current_start = now - window;
    let events = store.range(current_start - window, now, None)?;

    let (current, previous): (Vec<RecognitionEvent>, Vec<RecognitionEvent>) = events
        .into_iter()
        .partition(|e| e.detected_at >= current_start);

    let current_tally = tally(&current);
    let previous_negative = previous
        .iter()
        .filter(|e| classify_sentiment(&e.mood) == Sentiment::Negative)
        .count() as u64;
    let previous_percent = percent(previous_negative, previous.len() as u64);

    Ok(DashboardSummary {
        connected_cameras: store.distinct_cameras(current_start)?,
        recognitions_last_24h: current_tally.total(),
        negative_percent: current_tally.negative_percent(),
        negative_delta_vs_prev_day: current_tally.negative_percent() as i64
            - previous_percent as i64,
        risk_zone_count: tally_by_person(&current)
            .values()
            .filter(|t| t.risk_by_rule())
            .count() as u64,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonListItem {
    pub id: String,
    pub name: String,
    pub total: u64,
    pub last_mood: String,
    pub last_detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeoplePage {
    pub items: Vec<PersonListItem>,
    pub total: usize,
}

/// People matching `query`, most recently seen first.
pub fn search_people(
    store: &RecognitionStore,
    query: &str,
    limit: usize,
) -> Result<PeoplePage, StoreError> {
    let (rows, total) = store.people(query, limit)?;
    Ok(PeoplePage {
        items: rows
            .into_iter()
            .map(|row| PersonListItem {
                id: person_id(&row.name),
                name: row.name,
                total: row.total,
                last_mood: row.last_mood,
                last_detected_at: row.last_detected_at,
            })
            .collect(),
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::NewRecognition;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 30, 20).unwrap()
    }

    fn seeded(events: &[(&str, &str, Duration)]) -> RecognitionStore {
        let store = RecognitionStore::open_in_memory().unwrap();
        for (name, mood, ago) in events {
            let at = now() - *ago;
            store
                .insert_recognition(&NewRecognition::new(*name, *mood, at), at)
                .unwrap();
        }
        store
    }

    #[test]
    fn test_person_id_matches_uri_component_encoding() {
        assert_eq!(person_id("Anna Lee"), "Anna%20Lee");
        assert_eq!(person_id("Анна"), "%D0%90%D0%BD%D0%BD%D0%B0");
        assert_eq!(person_id("o'neil(1)"), "o'neil(1)");
    }

    #[test]
    fn test_live_dynamics_shape() {
        let store = seeded(&[
            ("anna", "Happy", Duration::seconds(5)),
            ("anna", "Happy", Duration::seconds(4)),
            ("boris", "Angry", Duration::seconds(3)),
            ("boris", "Sad", Duration::hours(30)),
        ]);

        let live = live_dynamics(&store, Duration::hours(24), now()).unwrap();
        assert_eq!(live.points.len(), 24 * 60);
        let last = live.points.last().unwrap();
        assert_eq!(last.bucket_start, Utc.with_ymd_and_hms(2024, 3, 10, 12, 30, 0).unwrap());
        assert_eq!(last.positive_count, 2);
        assert_eq!(last.negative_count, 1);
        assert_eq!(last.total_distinct_people, 2);
        assert_eq!(live.latest_snapshot.recognitions.len(), 3);
    }

    #[test]
    fn test_live_dynamics_prunes_and_is_idempotent() {
        let store = seeded(&[("anna", "Happy", Duration::seconds(1))]);
        let stale = aggregate_minute(now() - Duration::hours(25), &[]);
        store.upsert_bucket(&stale).unwrap();

        live_dynamics(&store, Duration::hours(24), now()).unwrap();
        let again = live_dynamics(&store, Duration::hours(24), now()).unwrap();

        let stored = store.scan_buckets(now() - Duration::days(2)).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(again.points.iter().map(|p| p.total()).sum::<u64>(), 1);
    }

    #[test]
    fn test_range_stats_lists_leaning_people() {
        let store = seeded(&[
            ("anna", "радость", Duration::hours(2)),
            ("anna", "грусть", Duration::hours(1)),
            ("anna", "грусть", Duration::hours(1)),
            ("boris", "neutral", Duration::hours(3)),
            ("boris", "neutral", Duration::hours(3)),
            ("cora", "happy", Duration::hours(1)),
            ("cora", "happy", Duration::hours(1)),
            ("cora", "angry", Duration::minutes(30)),
        ]);
        let config = AggregationConfig::default();

        let stats = range_stats(&store, &config, &RangeQuery::preset(2), now()).unwrap();
        assert_eq!(stats.stats.recognitions_count, 8);
        assert_eq!(stats.stats.negative_count, 3);
        assert_eq!(stats.stats.negative_percent, 38);
        // cora carries the rule flag but is not listed
        assert_eq!(stats.stats.risk_count, 2);

        let names: Vec<&str> = stats.students.iter().map(|s| s.name.as_str()).collect();
        // cora has more positive than non-positive and is left out
        assert_eq!(names, vec!["boris", "anna"]);
        assert_eq!(stats.students[1].risk_score, 67);
        // 09:30, 10:30, 11:30 and 12:00 fall in four distinct hours
        assert_eq!(stats.points.len(), 4);
    }

    #[test]
    fn test_risk_count_ignores_unlisted_people() {
        let store = seeded(&[
            ("cora", "happy", Duration::hours(3)),
            ("cora", "happy", Duration::hours(2)),
            ("cora", "angry", Duration::hours(1)),
            ("anna", "sad", Duration::hours(1)),
        ]);

        let stats = range_stats(
            &store,
            &AggregationConfig::default(),
            &RangeQuery::preset(2),
            now(),
        )
        .unwrap();
        let names: Vec<&str> = stats.students.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["anna"]);
        assert_eq!(stats.stats.risk_count, 1);
    }

    #[test]
    fn test_range_stats_rejects_long_range() {
        let store = seeded(&[]);
        let err = range_stats(
            &store,
            &AggregationConfig::default(),
            &RangeQuery::between("2024-01-01T00:00:00Z", "2024-02-15T00:00:00Z"),
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::InvalidRange(RangeError::TooLong { .. })));
    }

    #[test]
    fn test_leaderboard_ranks_and_limits() {
        let store = seeded(&[
            ("anna", "happy", Duration::hours(1)),
            ("anna", "neutral", Duration::minutes(50)),
            ("anna", "neutral", Duration::minutes(40)),
            ("anna", "neutral", Duration::minutes(30)),
            ("boris", "sad", Duration::minutes(10)),
            ("cora", "happy", Duration::minutes(5)),
            ("old", "sad", Duration::hours(30)),
        ]);

        let board = leaderboard(&store, Duration::hours(24), 20, now()).unwrap();
        let names: Vec<&str> = board.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["boris", "anna", "cora"]);
        assert_eq!(board.items[1].risk_percent, 50);
        assert_eq!(board.items[1].rank, 2);
        assert_eq!(board.items[1].last_mood, "neutral");

        let top = leaderboard(&store, Duration::hours(24), 1, now()).unwrap();
        assert_eq!(top.items.len(), 1);
    }

    #[test]
    fn test_student_detail() {
        let store = seeded(&[
            ("anna", "happy", Duration::hours(2)),
            ("anna", "sad", Duration::hours(1)),
            ("anna", "sad", Duration::hours(48)),
        ]);

        let detail = student_detail(&store, "anna", Duration::hours(24), now()).unwrap();
        assert_eq!(detail.stats_24h.total_recognitions, 2);
        assert_eq!(detail.stats_24h.negative_percent, 50);
        assert!(detail.stats_24h.risk_by_rule);
        assert_eq!(detail.dynamics.len(), 2);
        assert_eq!(detail.dynamics[0].mood, "happy");
        assert_eq!(detail.dynamics_points.len(), 2);
        assert_eq!(detail.recent.len(), 3);
        assert_eq!(detail.recent[0].mood, "sad");
        assert_eq!(detail.student.first_letter, "A");

        assert!(matches!(
            student_detail(&store, "nobody", Duration::hours(24), now()),
            Err(QueryError::PersonNotFound(_))
        ));
    }

    #[test]
    fn test_student_range() {
        let store = seeded(&[
            ("anna", "neutral", Duration::hours(5)),
            ("anna", "happy", Duration::hours(1)),
            ("boris", "sad", Duration::hours(1)),
        ]);
        let config = AggregationConfig::default();

        let view = student_range(&store, &config, "anna", &RangeQuery::preset(3), now()).unwrap();
        assert_eq!(view.stats.recognitions_count, 2);
        assert!(!view.stats.risk_by_rule);
        assert_eq!(view.points.len(), 2);
        assert_eq!(view.recent[0].mood, "happy");

        assert!(matches!(
            student_range(&store, &config, "nobody", &RangeQuery::preset(3), now()),
            Err(QueryError::PersonNotFound(_))
        ));
        assert!(matches!(
            student_range(&store, &config, "anna", &RangeQuery::preset(7), now()),
            Err(QueryError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_dashboard_summary_compares_days() {
        let store = seeded(&[
            ("anna", "sad", Duration::hours(1)),
            ("anna", "happy", Duration::hours(2)),
            ("boris", "happy", Duration::hours(30)),
            ("boris", "happy", Duration::hours(31)),
        ]);

        let summary = dashboard_summary(&store, Duration::hours(24), now()).unwrap();
        assert_eq!(summary.recognitions_last_24h, 2);
        assert_eq!(summary.negative_percent, 50);
        assert_eq!(summary.negative_delta_vs_prev_day, 50);
        assert_eq!(summary.risk_zone_count, 1);
        assert_eq!(summary.connected_cameras, 0);
    }

    #[test]
    fn test_search_people() {
        let store = seeded(&[
            ("Anna", "happy", Duration::hours(3)),
            ("Boris", "sad", Duration::hours(1)),
            ("Joanna", "happy", Duration::hours(2)),
        ]);
        let page = search_people(&store, "ANNA", 10).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].name, "Joanna");

        let page = search_people(&store, "", 1).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].name, "Boris");
    }
}
