//! Free-slot computation over busy intervals.
//!
//! Everything here is pure: callers load busy intervals from the cache and
//! pass them in together with the query.

use chrono::{
    DateTime, Datelike, Days, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday,
};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::CalendarError;
use crate::profile::AvailabilityProfile;
use crate::types::CalendarEvent;

/// Half-open `[start, end)` range during which the user is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BusyInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, other: &BusyInterval) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Pad the interval with buffer minutes on each side.
    /// Pad both sides, saturating at the representable range.
    pub fn expand(&self, before_minutes: u32, after_minutes: u32) -> Self {
        Self {
            start: self
                .start
                .checked_sub_signed(Duration::minutes(i64::from(before_minutes)))
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            end: self
                .end
                .checked_add_signed(Duration::minutes(i64::from(after_minutes)))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }
}

/// Sort and merge overlapping or touching intervals. Empty intervals are dropped.
pub fn merge_intervals(mut intervals: Vec<BusyInterval>) -> Vec<BusyInterval> {
    intervals.retain(|i| !i.is_empty());
    intervals.sort_by_key(|i| i.start);

    let mut merged: Vec<BusyInterval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        match merged.last_mut() {
            Some(last) if interval.start <= last.end => {
                if interval.end > last.end {
                    last.end = interval.end;
                }
            }
            _ => merged.push(interval),
        }
    }
    merged
}

/// Free parts of `window` after removing `busy`, which must already be merged.
pub fn subtract_busy(window: BusyInterval, busy: &[BusyInterval]) -> Vec<BusyInterval> {
    let mut free = Vec::new();
    let mut cursor = window.start;

    for interval in busy {
        if interval.end <= cursor {
            continue;
        }
        if interval.start >= window.end {
            break;
        }
        if interval.start > cursor {
            free.push(BusyInterval::new(cursor, interval.start));
        }
        cursor = cursor.max(interval.end);
        if cursor >= window.end {
            break;
        }
    }

    if cursor < window.end {
        free.push(BusyInterval::new(cursor, window.end));
    }
    free
}

/// Busy intervals contributed by cached events. All-day events block whole
/// days in `tz`; cancelled and transparent events are ignored.
pub fn busy_intervals(events: &[CalendarEvent], tz: Tz) -> Vec<BusyInterval> {
    events
        .iter()
        .filter(|e| e.is_busy())
        .map(|e| BusyInterval::new(e.start.as_datetime_in(tz), e.end.as_datetime_in(tz)))
        .filter(|i| !i.is_empty())
        .collect()
}

/// Queries must fall within these years.
const MIN_YEAR: i32 = 1900;
const MAX_YEAR: i32 = 9999;

/// Parameters for one availability computation.
#[derive(Debug, Clone)]
pub struct AvailabilityQuery {
    pub start_date: NaiveDate,
    /// Inclusive.
    pub end_date: NaiveDate,
    pub days: Vec<Weekday>,
    pub window_start: NaiveTime,
    pub window_end: NaiveTime,
    pub granularity_minutes: u32,
    pub buffer_before_minutes: u32,
    pub buffer_after_minutes: u32,
    pub time_zone: Tz,
    /// Slots starting before this instant are not offered.
    pub not_before: Option<DateTime<Utc>>,
}

impl AvailabilityQuery {
    /// Query covering `start_date..=end_date` with a profile's settings.
    pub fn from_profile(
        profile: &AvailabilityProfile,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Self, CalendarError> {
        Ok(Self {
            start_date,
            end_date,
            days: profile.days.clone(),
            window_start: profile.start_time,
            window_end: profile.end_time,
            granularity_minutes: profile.slot_minutes,
            buffer_before_minutes: profile.buffer_before_minutes,
            buffer_after_minutes: profile.buffer_after_minutes,
            time_zone: profile.tz()?,
            not_before: None,
        })
    }

    pub fn validate(&self, max_range_days: u32) -> Result<(), CalendarError> {
        const MAX_MINUTES: u32 = 24 * 60;
        if self.granularity_minutes == 0 || self.granularity_minutes > MAX_MINUTES {
            return Err(CalendarError::InvalidQuery(
                "granularity must be between 1 and 1440 minutes".into(),
            ));
        }
        if self.buffer_before_minutes > MAX_MINUTES || self.buffer_after_minutes > MAX_MINUTES {
            return Err(CalendarError::InvalidQuery("buffers cannot exceed one day".into()));
        }
        if self.window_start >= self.window_end {
            return Err(CalendarError::InvalidQuery(
                "window start must be before window end".into(),
            ));
        }
        if self.end_date < self.start_date {
            return Err(CalendarError::InvalidQuery("end date is before start date".into()));
        }
        if self.start_date.year() < MIN_YEAR || self.end_date.year() > MAX_YEAR {
            return Err(CalendarError::InvalidQuery(format!(
                "dates must fall between the years {} and {}",
                MIN_YEAR, MAX_YEAR
            )));
        }
        let span = (self.end_date - self.start_date).num_days() + 1;
        if span > i64::from(max_range_days) {
            return Err(CalendarError::InvalidQuery(format!(
                "range of {} days exceeds the {} day maximum",
                span, max_range_days
            )));
        }
        if self.days.is_empty() {
            return Err(CalendarError::InvalidQuery("no weekdays selected".into()));
        }
        Ok(())
    }

    /// UTC range of cached events that can affect this query. Padded by the
    /// buffers plus one day, since all-day events are stored at UTC midnight.
    pub fn search_bounds(&self) -> Result<BusyInterval, CalendarError> {
        const DAY_MINUTES: u32 = 24 * 60;
        let after_end = self
            .end_date
            .checked_add_days(Days::new(1))
            .ok_or_else(|| CalendarError::InvalidQuery("end date is out of range".into()))?;

        let start = local_instant(self.start_date, NaiveTime::MIN, self.time_zone);
        let end = local_instant(after_end, NaiveTime::MIN, self.time_zone);
        Ok(BusyInterval::new(start, end).expand(
            self.buffer_after_minutes + DAY_MINUTES,
            self.buffer_before_minutes + DAY_MINUTES,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Local start time, e.g. `09:30`.
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayAvailability {
    pub date: NaiveDate,
    /// Human label, e.g. `Monday, March 4`.
    pub label: String,
    pub slots: Vec<Slot>,
}

/// Compute free slots per matching day.
pub fn compute_availability(query: &AvailabilityQuery, busy: &[BusyInterval]) -> Vec<DayAvailability> {
    let padded = busy
        .iter()
        .map(|i| i.expand(query.buffer_before_minutes, query.buffer_after_minutes))
        .collect();
    let merged = merge_intervals(padded);
    let step = Duration::minutes(i64::from(query.granularity_minutes));

    let mut days = Vec::new();
    let mut date = query.start_date;
    while date <= query.end_date {
        if query.days.contains(&date.weekday()) {
            let window = BusyInterval::new(
                local_instant(date, query.window_start, query.time_zone),
                local_instant(date, query.window_end, query.time_zone),
            );
            let free = subtract_busy(window, &merged);

            let mut slots = Vec::new();
            let mut cursor = window.start;
            while cursor + step <= window.end {
                let candidate = BusyInterval::new(cursor, cursor + step);
                let in_future = query.not_before.map_or(true, |nb| cursor >= nb);
                if in_future && free.iter().any(|f| f.contains(&candidate)) {
                    slots.push(Slot {
                        start: candidate.start,
                        end: candidate.end,
                        label: candidate
                            .start
                            .with_timezone(&query.time_zone)
                            .format("%H:%M")
                            .to_string(),
                    });
                }
                cursor += step;
            }

            days.push(DayAvailability {
                date,
                label: date.format("%A, %B %-d").to_string(),
                slots,
            });
        }

        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }

    days
}

/// Resolve a local wall-clock time to UTC. Times inside a DST gap move
/// forward one hour; ambiguous times take the earlier instant.
fn local_instant(date: NaiveDate, time: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let naive = NaiveDateTime::new(date, time);
    naive
        .and_local_timezone(tz)
        .earliest()
        .or_else(|| {
            naive
                .checked_add_signed(Duration::hours(1))
                .and_then(|shifted| shifted.and_local_timezone(tz).earliest())
        })
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::types::{EventStatus, EventTime};
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    fn interval(from: (u32, u32), to: (u32, u32)) -> BusyInterval {
        BusyInterval::new(at(from.0, from.1), at(to.0, to.1))
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    // 2024-03-04 is a Monday.
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    fn query(granularity: u32, window: (NaiveTime, NaiveTime)) -> AvailabilityQuery {
        AvailabilityQuery {
            start_date: monday(),
            end_date: monday(),
            days: vec![Weekday::Mon],
            window_start: window.0,
            window_end: window.1,
            granularity_minutes: granularity,
            buffer_before_minutes: 0,
            buffer_after_minutes: 0,
            time_zone: chrono_tz::UTC,
            not_before: None,
        }
    }

    fn slot_starts(days: &[DayAvailability]) -> Vec<String> {
        days[0].slots.iter().map(|s| s.label.clone()).collect()
    }

    #[test]
    fn test_merge_overlapping_intervals() {
        let merged = merge_intervals(vec![interval((9, 30), (10, 30)), interval((9, 0), (10, 0))]);
        assert_eq!(merged, vec![interval((9, 0), (10, 30))]);
    }

    #[test]
    fn test_merge_keeps_disjoint_and_joins_touching() {
        let merged = merge_intervals(vec![
            interval((13, 0), (14, 0)),
            interval((9, 0), (10, 0)),
            interval((10, 0), (10, 30)),
            interval((9, 15), (9, 45)),
            interval((15, 0), (15, 0)),
        ]);
        assert_eq!(
            merged,
            vec![interval((9, 0), (10, 30)), interval((13, 0), (14, 0))]
        );
    }

    #[test]
    fn test_subtract_busy() {
        let window = interval((9, 0), (18, 0));
        let busy = vec![
            interval((8, 0), (9, 30)),
            interval((12, 0), (13, 0)),
            interval((17, 30), (19, 0)),
        ];
        assert_eq!(
            subtract_busy(window, &busy),
            vec![interval((9, 30), (12, 0)), interval((13, 0), (17, 30))]
        );
    }

    #[test]
    fn test_buffer_excludes_padded_range() {
        let mut q = query(10, (hm(9, 0), hm(12, 0)));
        q.buffer_before_minutes = 10;
        q.buffer_after_minutes = 10;

        let days = compute_availability(&q, &[interval((10, 0), (11, 0))]);
        let starts = slot_starts(&days);

        assert!(starts.contains(&"09:40".to_string()));
        assert!(!starts.contains(&"09:50".to_string()));
        assert!(!starts.contains(&"10:30".to_string()));
        assert!(!starts.contains(&"11:00".to_string()));
        assert!(starts.contains(&"11:10".to_string()));

        for slot in &days[0].slots {
            let candidate = BusyInterval::new(slot.start, slot.end);
            assert!(candidate.end <= at(9, 50) || candidate.start >= at(11, 10));
        }
    }

    #[test]
    fn test_fully_busy_day_has_no_slots() {
        let q = query(30, (hm(9, 0), hm(18, 0)));
        let days = compute_availability(&q, &[interval((8, 0), (19, 0))]);

        assert_eq!(days.len(), 1);
        assert!(days[0].slots.is_empty());
        assert_eq!(days[0].label, "Monday, March 4");
    }

    #[test]
    fn test_slot_needs_full_increment_free() {
        // Busy 9:15-9:45 knocks out both half-hour slots it touches.
        let q = query(30, (hm(9, 0), hm(11, 0)));
        let days = compute_availability(&q, &[interval((9, 15), (9, 45))]);
        assert_eq!(slot_starts(&days), vec!["10:00", "10:30"]);
    }

    #[test]
    fn test_buffers_can_close_small_gaps() {
        // A 20 minute gap between meetings disappears with 10+10 minute buffers.
        let mut q = query(10, (hm(9, 0), hm(12, 0)));
        q.buffer_before_minutes = 10;
        q.buffer_after_minutes = 10;

        let busy = [interval((9, 0), (10, 0)), interval((10, 20), (11, 0))];
        let days = compute_availability(&q, &busy);
        assert_eq!(slot_starts(&days), vec!["11:10", "11:20", "11:30", "11:40", "11:50"]);
    }

    #[test]
    fn test_day_filter_and_ordering() {
        let mut q = query(60, (hm(9, 0), hm(11, 0)));
        q.end_date = monday() + Duration::days(6);
        q.days = vec![Weekday::Wed, Weekday::Mon];

        let days = compute_availability(&q, &[]);
        let dates: Vec<_> = days.iter().map(|d| d.date.weekday()).collect();
        assert_eq!(dates, vec![Weekday::Mon, Weekday::Wed]);
        assert!(days.iter().all(|d| d.slots.len() == 2));
    }

    #[test]
    fn test_time_zone_window() {
        let mut q = query(60, (hm(9, 0), hm(10, 0)));
        q.time_zone = chrono_tz::America::New_York;

        let days = compute_availability(&q, &[]);
        assert_eq!(days[0].slots.len(), 1);
        // 09:00 EST is 14:00 UTC.
        assert_eq!(days[0].slots[0].start, at(14, 0));
        assert_eq!(days[0].slots[0].label, "09:00");
    }

    #[test]
    fn test_not_before_skips_past_slots() {
        let mut q = query(60, (hm(9, 0), hm(12, 0)));
        q.not_before = Some(at(10, 15));

        let days = compute_availability(&q, &[]);
        assert_eq!(slot_starts(&days), vec!["11:00"]);
    }

    #[test]
    fn test_busy_intervals_from_events() {
        let base = CalendarEvent {
            id: "e1".into(),
            owner_id: "u1".into(),
            calendar_id: "primary".into(),
            summary: "Sync".into(),
            description: None,
            location: None,
            start: EventTime::DateTime(at(9, 0)),
            end: EventTime::DateTime(at(10, 0)),
            all_day: false,
            conference_link: None,
            is_private: false,
            recurring_event_id: None,
            attendees: vec![],
            status: EventStatus::Confirmed,
            transparent: false,
            html_link: None,
            etag: None,
        };
        let mut free = base.clone();
        free.transparent = true;
        let mut cancelled = base.clone();
        cancelled.status = EventStatus::Cancelled;
        let mut holiday = base.clone();
        holiday.all_day = true;
        holiday.start = EventTime::Date(monday());
        holiday.end = EventTime::Date(monday() + Duration::days(1));

        let intervals = busy_intervals(&[base, free, cancelled, holiday], chrono_tz::UTC);
        assert_eq!(
            intervals,
            vec![
                interval((9, 0), (10, 0)),
                BusyInterval::new(at(0, 0), at(0, 0) + Duration::days(1)),
            ]
        );
    }

    #[test]
    fn test_query_validation() {
        let q = query(30, (hm(9, 0), hm(18, 0)));
        assert!(q.validate(62).is_ok());

        let mut bad = q.clone();
        bad.granularity_minutes = 0;
        assert!(bad.validate(62).is_err());

        let mut bad = q.clone();
        bad.window_end = hm(8, 0);
        assert!(bad.validate(62).is_err());

        let mut bad = q.clone();
        bad.end_date = monday() - Duration::days(1);
        assert!(bad.validate(62).is_err());

        let mut bad = q.clone();
        bad.end_date = monday() + Duration::days(62);
        assert!(bad.validate(62).is_err());

        let mut bad = q;
        bad.days.clear();
        assert!(bad.validate(62).is_err());
    }

    #[test]
    fn test_search_bounds_include_buffers() {
        let mut q = query(30, (hm(9, 0), hm(18, 0)));
        q.buffer_before_minutes = 15;
        q.buffer_after_minutes = 30;

        let bounds = q.search_bounds().unwrap();
        assert_eq!(bounds.start, at(0, 0) - Duration::days(1) - Duration::minutes(30));
        assert_eq!(bounds.end, at(0, 0) + Duration::days(2) + Duration::minutes(15));
    }

    #[test]
    fn test_validate_rejects_dates_outside_supported_years() {
        let mut q = query(30, (hm(9, 0), hm(17, 0)));
        q.start_date = NaiveDate::MAX;
        q.end_date = NaiveDate::MAX;
        q.days = vec![
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ];
        let result = q.validate(62);
        assert!(matches!(result, Err(CalendarError::InvalidQuery(msg)) if msg.contains("years")));
        assert!(q.search_bounds().is_err());

        let mut q = query(30, (hm(9, 0), hm(17, 0)));
        q.start_date = NaiveDate::from_ymd_opt(1850, 1, 1).unwrap();
        q.end_date = NaiveDate::from_ymd_opt(1850, 1, 2).unwrap();
        assert!(q.validate(62).is_err());
    }

    #[test]
    fn test_expand_saturates_at_range_limits() {
        let edge = BusyInterval::new(DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC);
        assert_eq!(edge.expand(60, 60), edge);
    }

    #[test]
    fn test_local_time_in_dst_gap_moves_forward() {
        let tz = chrono_tz::America::New_York;
        // 2024-03-10 02:30 does not exist in New York; 03:30 EDT is 07:30 UTC.
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let resolved = local_instant(date, hm(2, 30), tz);
        assert_eq!(resolved, Utc.with_ymd_and_hms(2024, 3, 10, 7, 30, 0).unwrap());
    }

    #[test]
    fn test_ambiguous_local_time_takes_earlier_instant() {
        let tz = chrono_tz::America::New_York;
        // 2024-11-03 01:30 happens twice; the EDT reading is 05:30 UTC.
        let date = NaiveDate::from_ymd_opt(2024, 11, 3).unwrap();
        let resolved = local_instant(date, hm(1, 30), tz);
        assert_eq!(resolved, Utc.with_ymd_and_hms(2024, 11, 3, 5, 30, 0).unwrap());
    }

    #[test]
    fn test_window_starting_in_dst_gap() {
        let mut q = query(30, (hm(2, 30), hm(4, 0)));
        q.start_date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        q.end_date = q.start_date;
        q.days = vec![Weekday::Sun];
        q.time_zone = chrono_tz::America::New_York;

        let days = compute_availability(&q, &[]);
        assert_eq!(slot_starts(&days), vec!["03:30"]);
    }
}
