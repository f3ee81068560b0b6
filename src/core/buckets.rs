//! Fixed-width time buckets over recognition events.
//!
//! Every view shares one principle: floor the timestamp to a fixed width,
//! count events per sentiment inside the bucket, and keep only a rolling
//! window. Minute buckets back the live dashboard and are persisted; hour
//! buckets are derived per query and never stored.

use crate::core::event::RecognitionEvent;
use crate::core::mood::{classify_sentiment, Sentiment};
use chrono::{DateTime, Duration, DurationRound, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Floor a timestamp to the start of its minute.
pub fn floor_to_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(Duration::minutes(1)).unwrap_or(ts)
}

/// Floor a timestamp to the start of its hour in `tz`, returned as UTC.
///
/// Zones with sub-hour offsets (e.g. UTC+05:30) get hour boundaries on their
/// local clock rather than on UTC.
pub fn floor_to_hour(ts: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    ts.with_timezone(&tz)
        .with_minute(0)
        .and_then(|d| d.with_second(0))
        .and_then(|d| d.with_nanosecond(0))
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|| ts.duration_trunc(Duration::hours(1)).unwrap_or(ts))
}

/// Counts for one bucket, as served to charts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketPoint {
    pub bucket_start: DateTime<Utc>,
    pub total_distinct_people: u64,
    pub positive_count: u64,
    pub neutral_count: u64,
    pub negative_count: u64,
}

impl BucketPoint {
    /// A point with no events.
    pub fn empty(bucket_start: DateTime<Utc>) -> Self {
        Self {
            bucket_start,
            total_distinct_people: 0,
            positive_count: 0,
            neutral_count: 0,
            negative_count: 0,
        }
    }

    pub fn total(&self) -> u64 {
        self.positive_count + self.neutral_count + self.negative_count
    }

    fn count(&mut self, sentiment: Sentiment) {
        match sentiment {
            Sentiment::Positive => self.positive_count += 1,
            Sentiment::Neutral => self.neutral_count += 1,
            Sentiment::Negative => self.negative_count += 1,
        }
    }
}

/// A person's mood as seen inside a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonMood {
    pub name: String,
    pub mood: String,
    pub detected_at: DateTime<Utc>,
}

/// A persisted minute bucket, keyed by `bucket_start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinuteBucket {
    #[serde(flatten)]
    pub point: BucketPoint,
    /// Latest mood per person inside the minute
    pub per_person_latest_mood: Vec<PersonMood>,
    /// Every recognition that fell in the minute
    pub recognitions: Vec<PersonMood>,
}

impl MinuteBucket {
    pub fn bucket_start(&self) -> DateTime<Utc> {
        self.point.bucket_start
    }
}

/// Fold the events of one minute into a bucket.
///
/// Callers pass events already restricted to
/// `[bucket_start, bucket_start + 1min)`; nothing is filtered here.
pub fn aggregate_minute(bucket_start: DateTime<Utc>, events: &[RecognitionEvent]) -> MinuteBucket {
    let mut point = BucketPoint::empty(bucket_start);
    let mut latest: BTreeMap<&str, &RecognitionEvent> = BTreeMap::new();

    for event in events {
        point.count(classify_sentiment(&event.mood));
        match latest.get(event.name.as_str()) {
            Some(current) if current.detected_at >= event.detected_at => {}
            _ => {
                latest.insert(event.name.as_str(), event);
            }
        }
    }
    point.total_distinct_people = latest.len() as u64;

    MinuteBucket {
        point,
        per_person_latest_mood: latest
            .values()
            .map(|e| PersonMood {
                name: e.name.clone(),
                mood: e.mood.clone(),
                detected_at: e.detected_at,
            })
            .collect(),
        recognitions: events
            .iter()
            .map(|e| PersonMood {
                name: e.name.clone(),
                mood: e.mood.clone(),
                detected_at: e.detected_at,
            })
            .collect(),
    }
}

/// Group events into buckets by an arbitrary floor function.
///
/// Only buckets that received events are returned, oldest first.
pub fn group_by<F>(events: &[RecognitionEvent], floor: F) -> Vec<BucketPoint>
where
    F: Fn(DateTime<Utc>) -> DateTime<Utc>,
{
    let mut buckets: BTreeMap<DateTime<Utc>, (BucketPoint, HashSet<&str>)> = BTreeMap::new();
    for event in events {
        let start = floor(event.detected_at);
        let (point, people) = buckets
            .entry(start)
            .or_insert_with(|| (BucketPoint::empty(start), HashSet::new()));
        point.count(classify_sentiment(&event.mood));
        people.insert(event.name.as_str());
    }

    buckets
        .into_values()
        .map(|(mut point, people)| {
            point.total_distinct_people = people.len() as u64;
            point
        })
        .collect()
}

/// Hour buckets in `tz`, oldest first.
pub fn group_by_hour(events: &[RecognitionEvent], tz: Tz) -> Vec<BucketPoint> {
    group_by(events, |ts| floor_to_hour(ts, tz))
}

/// Minute buckets, oldest first.
pub fn group_by_minute(events: &[RecognitionEvent]) -> Vec<BucketPoint> {
    group_by(events, floor_to_minute)
}

/// Produce exactly one point per `step` from `first` through `last`.
///
/// Points present in `stored` are kept as is (matched on exact
/// `bucket_start`); every other slot is zero-filled.
pub fn zero_fill(
    stored: Vec<BucketPoint>,
    first: DateTime<Utc>,
    last: DateTime<Utc>,
    step: Duration,
) -> Vec<BucketPoint> {
    if step <= Duration::zero() || last < first {
        return Vec::new();
    }
    let mut by_start: HashMap<DateTime<Utc>, BucketPoint> =
        stored.into_iter().map(|p| (p.bucket_start, p)).collect();

    let mut points = Vec::new();
    let mut t = first;
    while t <= last {
        points.push(by_start.remove(&t).unwrap_or_else(|| BucketPoint::empty(t)));
        t += step;
    }
    points
}

/// Bounds of a live minute window ending at the minute containing `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveWindow {
    /// Start of the minute containing `now`
    pub current: DateTime<Utc>,
    /// Oldest minute kept; buckets before it are pruned
    pub first: DateTime<Utc>,
}

impl LiveWindow {
    /// `window` is rounded down to whole minutes, with a minimum of one.
    pub fn ending_at(now: DateTime<Utc>, window: Duration) -> Self {
        let minutes = window.num_minutes().max(1);
        let current = floor_to_minute(now);
        Self {
            current,
            first: current - Duration::minutes(minutes - 1),
        }
    }

    /// Exclusive end of the current minute.
    pub fn current_end(&self) -> DateTime<Utc> {
        self.current + Duration::minutes(1)
    }

    pub fn point_count(&self) -> usize {
        ((self.current - self.first).num_minutes() + 1) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(name: &str, mood: &str, at: DateTime<Utc>) -> RecognitionEvent {
        RecognitionEvent {
            id: format!("{name}-{}", at.timestamp_millis()),
            name: name.to_string(),
            mood: mood.to_string(),
            camera_id: None,
            detected_at: at,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 15, 0).unwrap()
    }

    #[test]
    fn test_floor_to_minute() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 9, 15, 42).unwrap() + Duration::milliseconds(517);
        assert_eq!(floor_to_minute(ts), t0());
    }

    #[test]
    fn test_floor_to_hour_in_zone() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 9, 15, 42).unwrap();
        assert_eq!(
            floor_to_hour(ts, chrono_tz::UTC),
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
        );
        // 09:15Z is 14:45 in Kolkata; the local hour starts at 14:00 = 08:30Z
        assert_eq!(
            floor_to_hour(ts, chrono_tz::Asia::Kolkata),
            Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_aggregate_minute_example() {
        let events = vec![
            event("A", "Happy", t0()),
            event("A", "Happy", t0() + Duration::seconds(1)),
            event("B", "Angry", t0() + Duration::seconds(2)),
        ];
        let bucket = aggregate_minute(t0(), &events);
        assert_eq!(bucket.point.positive_count, 2);
        assert_eq!(bucket.point.negative_count, 1);
        assert_eq!(bucket.point.neutral_count, 0);
        assert_eq!(bucket.point.total_distinct_people, 2);
        assert_eq!(bucket.recognitions.len(), 3);

        let a = bucket
            .per_person_latest_mood
            .iter()
            .find(|p| p.name == "A")
            .unwrap();
        assert_eq!(a.detected_at, t0() + Duration::seconds(1));
    }

    #[test]
    fn test_group_by_hour_skips_empty_hours() {
        let events = vec![
            event("A", "sad", t0()),
            event("B", "happy", t0() + Duration::hours(3)),
            event("B", "neutral", t0() + Duration::hours(3) + Duration::minutes(10)),
        ];
        let points = group_by_hour(&events, chrono_tz::UTC);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].negative_count, 1);
        assert_eq!(points[1].total(), 2);
        assert_eq!(points[1].total_distinct_people, 1);
        assert!(points[0].bucket_start < points[1].bucket_start);
    }

    #[test]
    fn test_zero_fill_is_contiguous() {
        let window = LiveWindow::ending_at(t0() + Duration::seconds(30), Duration::hours(24));
        let mut stored_point = BucketPoint::empty(window.current - Duration::minutes(7));
        stored_point.positive_count = 4;

        let points = zero_fill(
            vec![stored_point.clone()],
            window.first,
            window.current,
            Duration::minutes(1),
        );

        assert_eq!(points.len(), 24 * 60);
        assert_eq!(points.len(), window.point_count());
        assert_eq!(points.first().unwrap().bucket_start, window.first);
        assert_eq!(points.last().unwrap().bucket_start, window.current);
        for pair in points.windows(2) {
            assert_eq!(pair[1].bucket_start - pair[0].bucket_start, Duration::minutes(1));
        }
        assert!(points.contains(&stored_point));
    }

    #[test]
    fn test_zero_fill_ignores_out_of_window_points() {
        let first = t0();
        let last = t0() + Duration::minutes(2);
        let stale = BucketPoint {
            positive_count: 9,
            ..BucketPoint::empty(t0() - Duration::minutes(5))
        };
        let points = zero_fill(vec![stale], first, last, Duration::minutes(1));
        assert_eq!(points.len(), 3);
        assert!(points.iter().all(|p| p.total() == 0));
    }
}
