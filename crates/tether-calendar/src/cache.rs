//! SQLite-backed cache of each user's calendar state.
//!
//! Every table is scoped by `owner_id`; no query returns another user's rows.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use rusqlite::types::Type;
use serde::Serialize;

use crate::error::CalendarError;
use crate::profile::{parse_hhmm, parse_weekdays, weekday_code, AvailabilityProfile, ProfileContext};
use crate::types::{CalendarEvent, EventStatus, EventTime};

/// Status recorded while a sync is in flight.
pub const SYNC_RUNNING: &str = "running";
pub const SYNC_OK: &str = "ok";

/// Last sync bookkeeping for one user.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncState {
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_status: Option<String>,
    pub upserted: u32,
    pub deleted: u32,
}

/// Cache handle shared between services. Never hold the lock across `.await`.
pub type SharedCache = Arc<Mutex<CalendarCache>>;

/// SQLite cache for calendar data.
pub struct CalendarCache {
    conn: Connection,
}

const EVENT_COLUMNS: &str = "id, owner_id, calendar_id, summary, description, location, start_ms, end_ms, all_day, conference_link, is_private, recurring_event_id, attendees_json, status, transparent, html_link, etag";

impl CalendarCache {
    /// Open (or create) the cache at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CalendarError> {
        let conn = Connection::open(path)?;
        let cache = Self { conn };
        cache.init_schema()?;
        Ok(cache)
    }

    pub fn in_memory() -> Result<Self, CalendarError> {
        let conn = Connection::open_in_memory()?;
        let cache = Self { conn };
        cache.init_schema()?;
        Ok(cache)
    }

    pub fn shared(self) -> SharedCache {
        Arc::new(Mutex::new(self))
    }

    fn init_schema(&self) -> Result<(), CalendarError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                calendar_id TEXT NOT NULL,
                summary TEXT NOT NULL,
                description TEXT,
                location TEXT,
                start_ms INTEGER NOT NULL,
                end_ms INTEGER NOT NULL,
                all_day INTEGER NOT NULL,
                conference_link TEXT,
                is_private INTEGER NOT NULL,
                recurring_event_id TEXT,
                attendees_json TEXT NOT NULL,
                status TEXT NOT NULL,
                transparent INTEGER NOT NULL,
                html_link TEXT,
                etag TEXT,
                cached_at INTEGER NOT NULL,
                PRIMARY KEY (owner_id, id)
            );

            CREATE TABLE IF NOT EXISTS sync_state (
                owner_id TEXT PRIMARY KEY,
                last_synced_ms INTEGER,
                last_status TEXT,
                upserted INTEGER NOT NULL DEFAULT 0,
                deleted INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS availability_profiles (
                owner_id TEXT NOT NULL,
                context TEXT NOT NULL,
                days TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                buffer_before INTEGER NOT NULL,
                buffer_after INTEGER NOT NULL,
                slot_minutes INTEGER NOT NULL,
                time_zone TEXT NOT NULL,
                PRIMARY KEY (owner_id, context)
            );

            CREATE TABLE IF NOT EXISTS busy_calendars (
                owner_id TEXT NOT NULL,
                calendar_id TEXT NOT NULL,
                PRIMARY KEY (owner_id, calendar_id)
            );

            CREATE INDEX IF NOT EXISTS idx_events_owner_start ON events(owner_id, start_ms);
            "#,
        )?;
        Ok(())
    }

    // Events

    /// Insert or replace an event, keyed by (owner, remote id).
    pub fn upsert_event(&self, event: &CalendarEvent) -> Result<(), CalendarError> {
        let now = Utc::now().timestamp_millis();
        let attendees_json = serde_json::to_string(&event.attendees)?;

        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO events
            (id, owner_id, calendar_id, summary, description, location, start_ms, end_ms, all_day,
             conference_link, is_private, recurring_event_id, attendees_json, status, transparent,
             html_link, etag, cached_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            "#,
            params![
                event.id,
                event.owner_id,
                event.calendar_id,
                event.summary,
                event.description,
                event.location,
                event.start.as_datetime().timestamp_millis(),
                event.end.as_datetime().timestamp_millis(),
                event.all_day,
                event.conference_link,
                event.is_private,
                event.recurring_event_id,
                attendees_json,
                event.status.as_str(),
                event.transparent,
                event.html_link,
                event.etag,
                now,
            ],
        )?;
        Ok(())
    }

    pub fn get_event(&self, owner_id: &str, event_id: &str) -> Result<Option<CalendarEvent>, CalendarError> {
        let sql = format!("SELECT {} FROM events WHERE owner_id = ?1 AND id = ?2", EVENT_COLUMNS);
        let event = self
            .conn
            .query_row(&sql, params![owner_id, event_id], Self::row_to_event)
            .optional()?;
        Ok(event)
    }

    /// Events overlapping `[time_min, time_max)`, ordered by start.
    pub fn list_events(
        &self,
        owner_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let sql = format!(
            "SELECT {} FROM events WHERE owner_id = ?1 AND start_ms < ?3 AND end_ms > ?2 ORDER BY start_ms ASC, id ASC",
            EVENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![owner_id, time_min.timestamp_millis(), time_max.timestamp_millis()],
            Self::row_to_event,
        )?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Like [`list_events`](Self::list_events), restricted to `calendar_ids`.
    pub fn list_events_in_calendars(
        &self,
        owner_id: &str,
        calendar_ids: &[String],
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let mut events = self.list_events(owner_id, time_min, time_max)?;
        events.retain(|e| calendar_ids.iter().any(|c| c == &e.calendar_id));
        Ok(events)
    }

    /// Returns whether a row was removed.
    pub fn delete_event(&self, owner_id: &str, event_id: &str) -> Result<bool, CalendarError> {
        let removed = self.conn.execute(
            "DELETE FROM events WHERE owner_id = ?1 AND id = ?2",
            params![owner_id, event_id],
        )?;
        Ok(removed > 0)
    }

    /// Delete events of `calendar_id` starting inside the window whose ids
    /// are not in `keep`. Returns the number removed.
    pub fn delete_missing(
        &self,
        owner_id: &str,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        keep: &HashSet<String>,
    ) -> Result<usize, CalendarError> {
        let stale: Vec<String> = {
            let mut stmt = self.conn.prepare(
                "SELECT id FROM events WHERE owner_id = ?1 AND calendar_id = ?2 AND start_ms >= ?3 AND start_ms < ?4",
            )?;
            let ids = stmt.query_map(
                params![
                    owner_id,
                    calendar_id,
                    time_min.timestamp_millis(),
                    time_max.timestamp_millis()
                ],
                |row| row.get::<_, String>(0),
            )?;
            ids.collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .filter(|id| !keep.contains(id))
                .collect()
        };

        let mut removed = 0;
        for id in &stale {
            removed += self.conn.execute(
                "DELETE FROM events WHERE owner_id = ?1 AND id = ?2",
                params![owner_id, id],
            )?;
        }
        Ok(removed)
    }

    /// Drop every cached row belonging to `owner_id`.
    pub fn clear_owner(&self, owner_id: &str) -> Result<(), CalendarError> {
        self.conn.execute("DELETE FROM events WHERE owner_id = ?1", params![owner_id])?;
        self.conn.execute("DELETE FROM sync_state WHERE owner_id = ?1", params![owner_id])?;
        Ok(())
    }

    // Sync state

    pub fn sync_state(&self, owner_id: &str) -> Result<SyncState, CalendarError> {
        let state = self
            .conn
            .query_row(
                "SELECT last_synced_ms, last_status, upserted, deleted FROM sync_state WHERE owner_id = ?1",
                params![owner_id],
                |row| {
                    let last_ms: Option<i64> = row.get(0)?;
                    Ok(SyncState {
                        last_synced_at: last_ms.and_then(DateTime::from_timestamp_millis),
                        last_status: row.get(1)?,
                        upserted: row.get(2)?,
                        deleted: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(state.unwrap_or_default())
    }

    /// Start a sync at `now` unless the previous one started less than
    /// `cooldown_secs` ago. The timestamp is written before returning.
    pub fn claim_sync(&self, owner_id: &str, now: DateTime<Utc>, cooldown_secs: u64) -> Result<(), CalendarError> {
        if let Some(last) = self.sync_state(owner_id)?.last_synced_at {
            let elapsed_ms = (now - last).num_milliseconds().max(0);
            let cooldown_ms = i64::try_from(cooldown_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
            if elapsed_ms < cooldown_ms {
                let remaining_ms = cooldown_ms - elapsed_ms;
                return Err(CalendarError::SyncCooldown {
                    retry_after_secs: u64::try_from((remaining_ms + 999) / 1000).unwrap_or(1),
                });
            }
        }

        self.conn.execute(
            r#"
            INSERT INTO sync_state (owner_id, last_synced_ms, last_status, upserted, deleted)
            VALUES (?1, ?2, ?3, 0, 0)
            ON CONFLICT(owner_id) DO UPDATE SET last_synced_ms = ?2, last_status = ?3
            "#,
            params![owner_id, now.timestamp_millis(), SYNC_RUNNING],
        )?;
        Ok(())
    }

    /// Record the outcome of the sync claimed by [`claim_sync`](Self::claim_sync).
    pub fn record_sync(
        &self,
        owner_id: &str,
        status: &str,
        upserted: u32,
        deleted: u32,
    ) -> Result<(), CalendarError> {
        self.conn.execute(
            "UPDATE sync_state SET last_status = ?2, upserted = ?3, deleted = ?4 WHERE owner_id = ?1",
            params![owner_id, status, upserted, deleted],
        )?;
        Ok(())
    }

    // Busy calendars

    pub fn busy_calendars(&self, owner_id: &str) -> Result<Vec<String>, CalendarError> {
        let mut stmt = self
            .conn
            .prepare("SELECT calendar_id FROM busy_calendars WHERE owner_id = ?1 ORDER BY calendar_id")?;
        let ids = stmt.query_map(params![owner_id], |row| row.get::<_, String>(0))?;
        Ok(ids.collect::<Result<Vec<_>, _>>()?)
    }

    /// Replace the user's busy calendar set.
    pub fn set_busy_calendars(&self, owner_id: &str, calendar_ids: &[String]) -> Result<(), CalendarError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM busy_calendars WHERE owner_id = ?1", params![owner_id])?;
        for id in calendar_ids {
            tx.execute(
                "INSERT OR IGNORE INTO busy_calendars (owner_id, calendar_id) VALUES (?1, ?2)",
                params![owner_id, id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // Availability profiles

    pub fn get_profile(
        &self,
        owner_id: &str,
        context: ProfileContext,
    ) -> Result<Option<AvailabilityProfile>, CalendarError> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT days, start_time, end_time, buffer_before, buffer_after, slot_minutes, time_zone
                FROM availability_profiles WHERE owner_id = ?1 AND context = ?2
                "#,
                params![owner_id, context.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, u32>(3)?,
                        row.get::<_, u32>(4)?,
                        row.get::<_, u32>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((days, start, end, before, after, slot, tz)) = row else {
            return Ok(None);
        };

        let profile = AvailabilityProfile {
            context,
            days: parse_weekdays(&days).map_err(|e| CalendarError::CacheError(e.to_string()))?,
            start_time: parse_hhmm(&start).map_err(|e| CalendarError::CacheError(e.to_string()))?,
            end_time: parse_hhmm(&end).map_err(|e| CalendarError::CacheError(e.to_string()))?,
            buffer_before_minutes: before,
            buffer_after_minutes: after,
            slot_minutes: slot,
            time_zone: tz,
        };
        Ok(Some(profile))
    }

    pub fn upsert_profile(&self, owner_id: &str, profile: &AvailabilityProfile) -> Result<(), CalendarError> {
        let days = profile
            .days
            .iter()
            .map(|d| weekday_code(*d))
            .collect::<Vec<_>>()
            .join(",");

        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO availability_profiles
            (owner_id, context, days, start_time, end_time, buffer_before, buffer_after, slot_minutes, time_zone)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                owner_id,
                profile.context.as_str(),
                days,
                profile.start_time.format("%H:%M").to_string(),
                profile.end_time.format("%H:%M").to_string(),
                profile.buffer_before_minutes,
                profile.buffer_after_minutes,
                profile.slot_minutes,
                profile.time_zone,
            ],
        )?;
        Ok(())
    }

    fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<CalendarEvent> {
        let start_ms: i64 = row.get(6)?;
        let end_ms: i64 = row.get(7)?;
        let all_day: bool = row.get(8)?;
        let attendees_json: String = row.get(12)?;
        let status: String = row.get(13)?;

        let to_time = |idx: usize, ms: i64| -> rusqlite::Result<EventTime> {
            let dt = DateTime::from_timestamp_millis(ms).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    Type::Integer,
                    format!("timestamp {} ms is out of range", ms).into(),
                )
            })?;
            Ok(if all_day {
                EventTime::Date(dt.date_naive())
            } else {
                EventTime::DateTime(dt)
            })
        };
        let attendees = serde_json::from_str(&attendees_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(12, Type::Text, Box::new(e)))?;

        Ok(CalendarEvent {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            calendar_id: row.get(2)?,
            summary: row.get(3)?,
            description: row.get(4)?,
            location: row.get(5)?,
            start: to_time(6, start_ms)?,
            end: to_time(7, end_ms)?,
            all_day,
            conference_link: row.get(9)?,
            is_private: row.get(10)?,
            recurring_event_id: row.get(11)?,
            attendees,
            status: EventStatus::parse(Some(&status)),
            transparent: row.get(14)?,
            html_link: row.get(15)?,
            etag: row.get(16)?,
        })
    }
}
