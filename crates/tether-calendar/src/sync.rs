//! Pulls remote events into the cache.

use std::collections::HashSet;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::cache::{SharedCache, SYNC_OK};
use crate::error::CalendarError;
use crate::provider::CalendarProvider;
use crate::types::CalendarEvent;

pub const PRIMARY_CALENDAR: &str = "primary";

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub cooldown_secs: u64,
    pub past_days: i64,
    pub future_days: i64,
    /// Remove cached events absent from a fetched window.
    pub delete_missing: bool,
    /// Longest explicit window, in days.
    pub max_window_days: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            cooldown_secs: 60,
            past_days: 7,
            future_days: 60,
            delete_missing: true,
            max_window_days: 366,
        }
    }
}

/// Half-open UTC range of events to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    /// Window from `past_days` before `now` to `future_days` after, clamped
    /// to the representable instant range.
    pub fn around(now: DateTime<Utc>, past_days: i64, future_days: i64) -> Self {
        let days = |n: i64| Days::new(u64::try_from(n).unwrap_or(0));
        Self {
            start: now
                .checked_sub_days(days(past_days))
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            end: now
                .checked_add_days(days(future_days))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Window covering whole UTC days `start..=end`, at most `max_days` long.
    pub fn from_dates(start: NaiveDate, end: NaiveDate, max_days: u32) -> Result<Self, CalendarError> {
        if end < start {
            return Err(CalendarError::InvalidQuery("end date is before start date".into()));
        }
        let span = (end - start).num_days() + 1;
        if span > i64::from(max_days) {
            return Err(CalendarError::InvalidQuery(format!(
                "sync window of {} days exceeds the {} day maximum",
                span, max_days
            )));
        }
        let after_end = end
            .checked_add_days(Days::new(1))
            .ok_or_else(|| CalendarError::InvalidQuery("end date is out of range".into()))?;

        Ok(Self {
            start: start.and_time(NaiveTime::MIN).and_utc(),
            end: after_end.and_time(NaiveTime::MIN).and_utc(),
        })
    }
}

/// Summary returned to the caller after a successful sync.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub calendars: Vec<String>,
    pub upserted: u32,
    pub deleted: u32,
    pub synced_at: DateTime<Utc>,
}

pub struct SyncService {
    cache: SharedCache,
    settings: SyncSettings,
}

impl SyncService {
    pub fn new(cache: SharedCache, settings: SyncSettings) -> Self {
        Self { cache, settings }
    }

    pub fn default_window(&self, now: DateTime<Utc>) -> SyncWindow {
        SyncWindow::around(now, self.settings.past_days, self.settings.future_days)
    }

    /// Client-requested window, bounded by `max_window_days`.
    pub fn explicit_window(&self, start: NaiveDate, end: NaiveDate) -> Result<SyncWindow, CalendarError> {
        SyncWindow::from_dates(start, end, self.settings.max_window_days)
    }

    /// Reconcile the user's cache with the remote calendars.
    ///
    /// Fails with [`CalendarError::SyncCooldown`] when the previous sync
    /// started within the cooldown. Writes made before a remote failure are
    /// kept; the failure text is stored as the sync status.
    pub async fn sync_user(
        &self,
        provider: &dyn CalendarProvider,
        user_id: &str,
        window: SyncWindow,
        now: DateTime<Utc>,
    ) -> Result<SyncReport, CalendarError> {
        self.cache
            .lock()
            .claim_sync(user_id, now, self.settings.cooldown_secs)?;

        match self.run(provider, user_id, window, now).await {
            Ok(report) => {
                self.cache
                    .lock()
                    .record_sync(user_id, SYNC_OK, report.upserted, report.deleted)?;
                info!(
                    user = %user_id,
                    upserted = report.upserted,
                    deleted = report.deleted,
                    "Calendar sync finished"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(user = %user_id, error = %e, "Calendar sync failed");
                if let Err(record_err) =
                    self.cache.lock().record_sync(user_id, &e.to_string(), 0, 0)
                {
                    warn!(user = %user_id, error = %record_err, "Failed to record sync failure");
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        provider: &dyn CalendarProvider,
        user_id: &str,
        window: SyncWindow,
        now: DateTime<Utc>,
    ) -> Result<SyncReport, CalendarError> {
        let mut calendars = self.cache.lock().busy_calendars(user_id)?;
        if calendars.is_empty() {
            calendars.push(PRIMARY_CALENDAR.to_string());
        }

        let mut upserted = 0u32;
        let mut deleted = 0u32;

        for calendar_id in &calendars {
            let mut seen = HashSet::new();
            let mut page_token: Option<String> = None;

            loop {
                let page = provider
                    .list_events(calendar_id, window.start, window.end, page_token.as_deref())
                    .await?;

                {
                    let cache = self.cache.lock();
                    for api_event in page.items {
                        if api_event.is_cancelled() {
                            if cache.delete_event(user_id, &api_event.id)? {
                                deleted += 1;
                            }
                            continue;
                        }
                        let event = match CalendarEvent::from_api(api_event, user_id, calendar_id) {
                            Ok(event) => event,
                            Err(e) => {
                                warn!(
                                    user = %user_id,
                                    calendar = %calendar_id,
                                    error = %e,
                                    "Skipping malformed event"
                                );
                                continue;
                            }
                        };
                        cache.upsert_event(&event)?;
                        seen.insert(event.id);
                        upserted += 1;
                    }
                }

                match page.next_page_token {
                    Some(next) => page_token = Some(next),
                    None => break,
                }
            }

            if self.settings.delete_missing {
                let removed = self.cache.lock().delete_missing(
                    user_id,
                    calendar_id,
                    window.start,
                    window.end,
                    &seen,
                )?;
                deleted += u32::try_from(removed).unwrap_or(u32::MAX);
            }
        }

        Ok(SyncReport {
            calendars,
            upserted,
            deleted,
            synced_at: now,
        })
    }
}
