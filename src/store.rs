//! SQLite-backed record store for recognitions and live minute buckets.
//!
//! Timestamps are stored as fixed-width RFC 3339 text with millisecond
//! precision in UTC (`2024-03-01T09:00:00.000Z`), so lexical order equals
//! chronological order and range predicates can compare strings directly.

use crate::core::buckets::{BucketPoint, MinuteBucket, PersonMood};
use crate::core::event::{NewRecognition, RecognitionEvent};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const CURRENT_SCHEMA_VERSION: i32 = 1;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS recognitions (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    mood        TEXT NOT NULL,
    camera_id   TEXT,
    detected_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_recognitions_detected_at ON recognitions(detected_at);
CREATE INDEX IF NOT EXISTS idx_recognitions_name_detected_at ON recognitions(name, detected_at);

CREATE TABLE IF NOT EXISTS emotion_snapshots (
    bucket_start      TEXT PRIMARY KEY,
    total_people      INTEGER NOT NULL,
    positive_count    INTEGER NOT NULL,
    neutral_count     INTEGER NOT NULL,
    negative_count    INTEGER NOT NULL,
    people_json       TEXT NOT NULL,
    recognitions_json TEXT NOT NULL
);
";

/// Store errors.
#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Io(String),
    /// A stored row could not be decoded
    Corrupt(String),
    /// Schema is newer than this build understands
    Schema(String),
    Poisoned,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "SQLite error: {e}"),
            StoreError::Io(e) => write!(f, "IO error: {e}"),
            StoreError::Corrupt(e) => write!(f, "Corrupt row: {e}"),
            StoreError::Schema(e) => write!(f, "Schema error: {e}"),
            StoreError::Poisoned => write!(f, "Store lock poisoned"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

/// One person as listed by [`RecognitionStore::people`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonRow {
    pub name: String,
    pub total: u64,
    pub last_mood: String,
    pub last_detected_at: DateTime<Utc>,
}

/// Rows removed by [`RecognitionStore::clear_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClearReport {
    pub recognitions: usize,
    pub snapshots: usize,
}

/// Format a timestamp the way it is stored.
pub fn to_db_time(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_db_time(raw: &str, field: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("{field} '{raw}': {e}")))
}

fn to_u64(value: i64, field: &str) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{field} is negative: {value}")))
}

type RawEvent = (String, String, String, Option<String>, String);

fn event_from_raw(raw: RawEvent) -> Result<RecognitionEvent, StoreError> {
    let (id, name, mood, camera_id, detected_at) = raw;
    Ok(RecognitionEvent {
        id,
        name,
        mood,
        camera_id,
        detected_at: parse_db_time(&detected_at, "detected_at")?,
    })
}

fn read_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEvent> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

const EVENT_COLUMNS: &str = "id, name, mood, camera_id, detected_at";

/// Recognition and snapshot storage.
pub struct RecognitionStore {
    conn: Mutex<Connection>,
}

impl RecognitionStore {
    /// Open (or create) a database file and apply pending migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
            }
        }
        let conn = Connection::open(path)?;
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            tracing::warn!(error = %err, "failed to enable WAL mode");
        }
        Self::init(conn)
    }

    /// A private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> Result<Self, StoreError> {
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Append a recognition. `detected_at` defaults to `now`.
    pub fn insert_recognition(
        &self,
        new: &NewRecognition,
        now: DateTime<Utc>,
    ) -> Result<RecognitionEvent, StoreError> {
        let event = RecognitionEvent {
            id: uuid::Uuid::new_v4().to_string(),
            name: new.name.clone(),
            mood: new.mood.clone(),
            camera_id: new.camera_id.clone(),
            detected_at: new.detected_at.unwrap_or(now),
        };

        self.conn()?.execute(
            "INSERT INTO recognitions (id, name, mood, camera_id, detected_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.id,
                event.name,
                event.mood,
                event.camera_id,
                to_db_time(event.detected_at),
            ],
        )?;
        Ok(event)
    }

    fn query_events(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<RecognitionEvent>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let raws = stmt
            .query_map(params, read_event)?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter().map(event_from_raw).collect()
    }

    /// Most recent recognitions, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<RecognitionEvent>, StoreError> {
        self.query_events(
            &format!(
                "SELECT {EVENT_COLUMNS} FROM recognitions
                 ORDER BY detected_at DESC, id DESC LIMIT ?1"
            ),
            params![limit as i64],
        )
    }

    /// Events with `from <= detected_at <= to`, oldest first, optionally for one person.
    pub fn range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        name: Option<&str>,
    ) -> Result<Vec<RecognitionEvent>, StoreError> {
        match name {
            Some(name) => self.query_events(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM recognitions
                     WHERE name = ?1 AND detected_at >= ?2 AND detected_at <= ?3
                     ORDER BY detected_at ASC, id ASC"
                ),
                params![name, to_db_time(from), to_db_time(to)],
            ),
            None => self.query_events(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM recognitions
                     WHERE detected_at >= ?1 AND detected_at <= ?2
                     ORDER BY detected_at ASC, id ASC"
                ),
                params![to_db_time(from), to_db_time(to)],
            ),
        }
    }

    /// Events with `start <= detected_at < end`, oldest first.
    pub fn minute_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RecognitionEvent>, StoreError> {
        self.query_events(
            &format!(
                "SELECT {EVENT_COLUMNS} FROM recognitions
                 WHERE detected_at >= ?1 AND detected_at < ?2
                 ORDER BY detected_at ASC, id ASC"
            ),
            params![to_db_time(start), to_db_time(end)],
        )
    }

    /// A person's most recent events, newest first.
    pub fn latest_for(&self, name: &str, limit: usize) -> Result<Vec<RecognitionEvent>, StoreError> {
        self.query_events(
            &format!(
                "SELECT {EVENT_COLUMNS} FROM recognitions
                 WHERE name = ?1
                 ORDER BY detected_at DESC, id DESC LIMIT ?2"
            ),
            params![name, limit as i64],
        )
    }

    pub fn has_person(&self, name: &str) -> Result<bool, StoreError> {
        let found: Option<i64> = self
            .conn()?
            .query_row(
                "SELECT 1 FROM recognitions WHERE name = ?1 LIMIT 1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// People whose name contains `query` (case-insensitive), most recently
    /// seen first. Returns the page and the total number of matches.
    pub fn people(&self, query: &str, limit: usize) -> Result<(Vec<PersonRow>, usize), StoreError> {
        let needle = query.trim().to_lowercase();
        let raws: Vec<(String, i64, String, String)> = {
            let conn = self.conn()?;
            // Bare columns next to MAX() come from the row holding the maximum
            let mut stmt = conn.prepare(
                "SELECT name, COUNT(*), mood, MAX(detected_at) AS last_at
                 FROM recognitions
                 GROUP BY name
                 ORDER BY last_at DESC, name ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut matched = Vec::new();
        for (name, total, last_mood, last_at) in raws {
            if !needle.is_empty() && !name.to_lowercase().contains(&needle) {
                continue;
            }
            matched.push(PersonRow {
                name,
                total: to_u64(total, "total")?,
                last_mood,
                last_detected_at: parse_db_time(&last_at, "detected_at")?,
            });
        }
        let total = matched.len();
        matched.truncate(limit);
        Ok((matched, total))
    }

    /// Distinct non-null camera ids seen since `since`.
    pub fn distinct_cameras(&self, since: DateTime<Utc>) -> Result<usize, StoreError> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(DISTINCT camera_id) FROM recognitions
             WHERE camera_id IS NOT NULL AND detected_at >= ?1",
            params![to_db_time(since)],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }

    /// Create or replace the bucket keyed by its start. Atomic per key.
    pub fn upsert_bucket(&self, bucket: &MinuteBucket) -> Result<(), StoreError> {
        let people = serde_json::to_string(&bucket.per_person_latest_mood)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let recognitions = serde_json::to_string(&bucket.recognitions)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let p = &bucket.point;

        self.conn()?.execute(
            "INSERT INTO emotion_snapshots
                (bucket_start, total_people, positive_count, neutral_count, negative_count,
                 people_json, recognitions_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(bucket_start) DO UPDATE SET
                total_people = excluded.total_people,
                positive_count = excluded.positive_count,
                neutral_count = excluded.neutral_count,
                negative_count = excluded.negative_count,
                people_json = excluded.people_json,
                recognitions_json = excluded.recognitions_json",
            params![
                to_db_time(p.bucket_start),
                p.total_distinct_people as i64,
                p.positive_count as i64,
                p.neutral_count as i64,
                p.negative_count as i64,
                people,
                recognitions,
            ],
        )?;
        Ok(())
    }

    /// Remove buckets starting before `cutoff`; returns the number removed.
    pub fn delete_buckets_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let removed = self.conn()?.execute(
            "DELETE FROM emotion_snapshots WHERE bucket_start < ?1",
            params![to_db_time(cutoff)],
        )?;
        Ok(removed)
    }

    /// Stored buckets with `bucket_start >= from`, oldest first.
    pub fn scan_buckets(&self, from: DateTime<Utc>) -> Result<Vec<MinuteBucket>, StoreError> {
        type RawBucket = (String, i64, i64, i64, i64, String, String);
        let raws: Vec<RawBucket> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT bucket_start, total_people, positive_count, neutral_count,
                        negative_count, people_json, recognitions_json
                 FROM emotion_snapshots
                 WHERE bucket_start >= ?1
                 ORDER BY bucket_start ASC",
            )?;
            let rows = stmt
                .query_map(params![to_db_time(from)], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        raws.into_iter()
            .map(|(start, total, pos, neu, neg, people, recognitions)| {
                let per_person_latest_mood: Vec<PersonMood> = serde_json::from_str(&people)
                    .map_err(|e| StoreError::Corrupt(format!("people_json: {e}")))?;
                let recognitions: Vec<PersonMood> = serde_json::from_str(&recognitions)
                    .map_err(|e| StoreError::Corrupt(format!("recognitions_json: {e}")))?;
                Ok(MinuteBucket {
                    point: BucketPoint {
                        bucket_start: parse_db_time(&start, "bucket_start")?,
                        total_distinct_people: to_u64(total, "total_people")?,
                        positive_count: to_u64(pos, "positive_count")?,
                        neutral_count: to_u64(neu, "neutral_count")?,
                        negative_count: to_u64(neg, "negative_count")?,
                    },
                    per_person_latest_mood,
                    recognitions,
                })
            })
            .collect()
    }

    /// Delete every recognition and snapshot in one transaction.
    pub fn clear_all(&self) -> Result<ClearReport, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let recognitions = tx.execute("DELETE FROM recognitions", [])?;
        let snapshots = tx.execute("DELETE FROM emotion_snapshots", [])?;
        tx.commit()?;
        Ok(ClearReport {
            recognitions,
            snapshots,
        })
    }
}

fn run_migrations(conn: &mut Connection) -> Result<(), StoreError> {
    let mut version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version > CURRENT_SCHEMA_VERSION {
        return Err(StoreError::Schema(format!(
            "database version ({version}) is newer than supported schema ({CURRENT_SCHEMA_VERSION})"
        )));
    }
    if version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    while version < CURRENT_SCHEMA_VERSION {
        version += 1;
        apply_migration(&tx, version)?;
        tracing::debug!(version, "applied schema migration");
    }
    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;
    tx.commit()?;
    Ok(())
}

fn apply_migration(tx: &Transaction<'_>, version: i32) -> Result<(), StoreError> {
    match version {
        1 => {
            tx.execute_batch(SCHEMA_V1)?;
            Ok(())
        }
        other => Err(StoreError::Schema(format!("no migration for version {other}"))),
    }
}
