//! Calendar API types and data structures.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::CalendarError;

/// Title shown in place of a private event's details.
pub const PRIVATE_EVENT_TITLE: &str = "Busy";

/// Calendar event as mirrored in the local cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarEvent {
    pub id: String,
    pub owner_id: String,
    pub calendar_id: String,
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    pub all_day: bool,
    pub conference_link: Option<String>,
    pub is_private: bool,
    pub recurring_event_id: Option<String>,
    pub attendees: Vec<Attendee>,
    pub status: EventStatus,
    /// Event does not block time ("show as available").
    pub transparent: bool,
    pub html_link: Option<String>,
    pub etag: Option<String>,
}

/// Event time - can be a specific datetime or an all-day date.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventTime {
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
}

impl EventTime {
    /// Instant of this time, treating all-day dates as UTC midnight.
    pub fn as_datetime(&self) -> DateTime<Utc> {
        match self {
            EventTime::DateTime(dt) => *dt,
            EventTime::Date(d) => d.and_time(NaiveTime::MIN).and_utc(),
        }
    }

    /// Instant of this time, treating all-day dates as midnight in `tz`.
    pub fn as_datetime_in(&self, tz: Tz) -> DateTime<Utc> {
        match self {
            EventTime::DateTime(dt) => *dt,
            EventTime::Date(d) => d
                .and_time(NaiveTime::MIN)
                .and_local_timezone(tz)
                .earliest()
                .map(|local| local.with_timezone(&Utc))
                .unwrap_or_else(|| d.and_time(NaiveTime::MIN).and_utc()),
        }
    }

    pub fn is_date(&self) -> bool {
        matches!(self, EventTime::Date(_))
    }

    /// Google Calendar JSON representation.
    pub fn to_api_json(&self) -> serde_json::Value {
        match self {
            EventTime::DateTime(dt) => serde_json::json!({ "dateTime": dt.to_rfc3339() }),
            EventTime::Date(d) => serde_json::json!({ "date": d.format("%Y-%m-%d").to_string() }),
        }
    }
}

/// Event status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    #[default]
    Confirmed,
    Tentative,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Tentative => "tentative",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("tentative") => Self::Tentative,
            Some("cancelled") => Self::Cancelled,
            _ => Self::Confirmed,
        }
    }
}

/// Event attendee.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attendee {
    pub email: String,
    pub display_name: Option<String>,
    pub response_status: ResponseStatus,
    pub is_organizer: bool,
}

/// Attendee RSVP status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    #[default]
    NeedsAction,
    Declined,
    Tentative,
    Accepted,
}

/// Calendar metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calendar {
    pub id: String,
    pub summary: String,
    pub time_zone: Option<String>,
    pub background_color: Option<String>,
    pub is_primary: bool,
    pub access_role: AccessRole,
}

/// Calendar access role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccessRole {
    Owner,
    Writer,
    #[default]
    Reader,
    FreeBusyReader,
}

/// Fields for a new event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDraft {
    #[serde(default)]
    pub calendar_id: Option<String>,
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    #[serde(default)]
    pub attendees: Vec<String>,
    #[serde(default)]
    pub is_private: bool,
}

impl EventDraft {
    pub fn validate(&self) -> Result<(), CalendarError> {
        if self.summary.trim().is_empty() {
            return Err(CalendarError::InvalidEventData("title is required".into()));
        }
        validate_times(&self.start, &self.end)
    }

    pub fn to_api_json(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "summary": self.summary,
            "start": self.start.to_api_json(),
            "end": self.end.to_api_json(),
        });

        if let Some(desc) = &self.description {
            body["description"] = serde_json::Value::String(desc.clone());
        }
        if let Some(loc) = &self.location {
            body["location"] = serde_json::Value::String(loc.clone());
        }
        if !self.attendees.is_empty() {
            body["attendees"] = self
                .attendees
                .iter()
                .map(|email| serde_json::json!({ "email": email }))
                .collect();
        }
        if self.is_private {
            body["visibility"] = serde_json::Value::String("private".to_string());
        }
        body
    }
}

/// Partial update of an existing event; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventPatch {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub start: Option<EventTime>,
    #[serde(default)]
    pub end: Option<EventTime>,
    #[serde(default)]
    pub attendees: Option<Vec<String>>,
    #[serde(default)]
    pub is_private: Option<bool>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none()
            && self.description.is_none()
            && self.location.is_none()
            && self.start.is_none()
            && self.end.is_none()
            && self.attendees.is_none()
            && self.is_private.is_none()
    }

    pub fn validate(&self) -> Result<(), CalendarError> {
        if self.is_empty() {
            return Err(CalendarError::InvalidEventData("nothing to update".into()));
        }
        if matches!(&self.summary, Some(s) if s.trim().is_empty()) {
            return Err(CalendarError::InvalidEventData("title cannot be empty".into()));
        }
        if let (Some(start), Some(end)) = (&self.start, &self.end) {
            validate_times(start, end)?;
        }
        Ok(())
    }

    pub fn to_api_json(&self) -> serde_json::Value {
        let mut body = serde_json::Map::new();

        if let Some(s) = &self.summary {
            body.insert("summary".to_string(), serde_json::Value::String(s.clone()));
        }
        if let Some(d) = &self.description {
            body.insert("description".to_string(), serde_json::Value::String(d.clone()));
        }
        if let Some(l) = &self.location {
            body.insert("location".to_string(), serde_json::Value::String(l.clone()));
        }
        if let Some(s) = &self.start {
            body.insert("start".to_string(), s.to_api_json());
        }
        if let Some(e) = &self.end {
            body.insert("end".to_string(), e.to_api_json());
        }
        if let Some(attendees) = &self.attendees {
            body.insert(
                "attendees".to_string(),
                attendees
                    .iter()
                    .map(|email| serde_json::json!({ "email": email }))
                    .collect(),
            );
        }
        if let Some(private) = self.is_private {
            let visibility = if private { "private" } else { "default" };
            body.insert(
                "visibility".to_string(),
                serde_json::Value::String(visibility.to_string()),
            );
        }

        serde_json::Value::Object(body)
    }
}

fn validate_times(start: &EventTime, end: &EventTime) -> Result<(), CalendarError> {
    if start.is_date() != end.is_date() {
        return Err(CalendarError::InvalidEventData(
            "start and end must both be dates or both be date-times".into(),
        ));
    }
    if end.as_datetime() <= start.as_datetime() {
        return Err(CalendarError::InvalidEventData("end must be after start".into()));
    }
    Ok(())
}

// API Response Types

/// Google Calendar API event response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEvent {
    pub id: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: Option<ApiEventTime>,
    pub end: Option<ApiEventTime>,
    #[serde(default)]
    pub attendees: Vec<ApiAttendee>,
    pub status: Option<String>,
    pub visibility: Option<String>,
    pub transparency: Option<String>,
    pub recurring_event_id: Option<String>,
    pub hangout_link: Option<String>,
    pub conference_data: Option<ApiConferenceData>,
    pub html_link: Option<String>,
    pub etag: Option<String>,
}

impl ApiEvent {
    pub fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some("cancelled")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEventTime {
    pub date_time: Option<String>,
    pub date: Option<String>,
    pub time_zone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiAttendee {
    pub email: String,
    pub display_name: Option<String>,
    pub response_status: Option<String>,
    #[serde(default)]
    pub organizer: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConferenceData {
    #[serde(default)]
    pub entry_points: Vec<ApiEntryPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEntryPoint {
    pub entry_point_type: Option<String>,
    pub uri: Option<String>,
}

/// API response for event list.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventListResponse {
    #[serde(default)]
    pub items: Vec<ApiEvent>,
    pub next_page_token: Option<String>,
}

/// API response for calendar list.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarListResponse {
    #[serde(default)]
    pub items: Vec<ApiCalendar>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCalendar {
    pub id: String,
    pub summary: Option<String>,
    pub time_zone: Option<String>,
    pub background_color: Option<String>,
    #[serde(default)]
    pub primary: bool,
    pub access_role: Option<String>,
}

impl CalendarEvent {
    /// Convert an API response to a cached event owned by `owner_id`.
    /// Fails when the event has no parseable start.
    pub fn from_api(
        api: ApiEvent,
        owner_id: &str,
        calendar_id: &str,
    ) -> Result<Self, CalendarError> {
        let (start, all_day) = api
            .start
            .as_ref()
            .and_then(parse_event_time)
            .ok_or_else(|| {
                CalendarError::ApiError(format!("event {} has no usable start time", api.id))
            })?;

        let end = api
            .end
            .as_ref()
            .and_then(parse_event_time)
            .map(|(end, _)| end)
            .unwrap_or(start);

        let attendees = api
            .attendees
            .into_iter()
            .map(|a| {
                let response_status = match a.response_status.as_deref() {
                    Some("accepted") => ResponseStatus::Accepted,
                    Some("declined") => ResponseStatus::Declined,
                    Some("tentative") => ResponseStatus::Tentative,
                    _ => ResponseStatus::NeedsAction,
                };
                Attendee {
                    email: a.email,
                    display_name: a.display_name,
                    response_status,
                    is_organizer: a.organizer,
                }
            })
            .collect();

        let conference_link = api.hangout_link.or_else(|| {
            api.conference_data.and_then(|data| {
                data.entry_points
                    .into_iter()
                    .find(|ep| ep.entry_point_type.as_deref() == Some("video"))
                    .and_then(|ep| ep.uri)
            })
        });

        let is_private = matches!(api.visibility.as_deref(), Some("private" | "confidential"));

        let event = Self {
            id: api.id,
            owner_id: owner_id.to_string(),
            calendar_id: calendar_id.to_string(),
            summary: api.summary.unwrap_or_default(),
            description: api.description,
            location: api.location,
            start,
            end,
            all_day,
            conference_link,
            is_private,
            recurring_event_id: api.recurring_event_id,
            attendees,
            status: EventStatus::parse(api.status.as_deref()),
            transparent: api.transparency.as_deref() == Some("transparent"),
            html_link: api.html_link,
            etag: api.etag,
        };

        Ok(event.redacted())
    }

    /// Apply the privacy policy: private events keep their time but lose
    /// every detail except a generic title.
    pub fn redacted(mut self) -> Self {
        if self.is_private {
            self.summary = PRIVATE_EVENT_TITLE.to_string();
            self.description = None;
            self.location = None;
            self.conference_link = None;
            self.attendees.clear();
        }
        self
    }

    /// Whether the event should block availability.
    pub fn is_busy(&self) -> bool {
        self.status != EventStatus::Cancelled && !self.transparent
    }
}

impl From<ApiCalendar> for Calendar {
    fn from(api: ApiCalendar) -> Self {
        let access_role = match api.access_role.as_deref() {
            Some("owner") => AccessRole::Owner,
            Some("writer") => AccessRole::Writer,
            Some("freeBusyReader") => AccessRole::FreeBusyReader,
            _ => AccessRole::Reader,
        };

        Self {
            id: api.id,
            summary: api.summary.unwrap_or_default(),
            time_zone: api.time_zone,
            background_color: api.background_color,
            is_primary: api.primary,
            access_role,
        }
    }
}

/// Timed events carry `dateTime`, all-day events only `date`.
fn parse_event_time(api: &ApiEventTime) -> Option<(EventTime, bool)> {
    let timed = api
        .date_time
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| (EventTime::DateTime(dt.with_timezone(&Utc)), false));

    timed.or_else(|| {
        api.date
            .as_deref()
            .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
            .map(|date| (EventTime::Date(date), true))
    })
}
