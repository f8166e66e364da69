use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use tether_auth::AuthenticatedUser;
use tether_calendar::{CalendarEvent, EventDraft, EventPatch};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    start: String,
    end: String,
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    events: Vec<CalendarEvent>,
}

pub async fn list_events(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let start = parse_instant(&query.start, "start")?;
    let end = parse_instant(&query.end, "end")?;
    if end <= start {
        return Err(ApiError::bad_request("end must be after start"));
    }

    let events = state.cache.lock().list_events(&user.user_id, start, end)?;
    Ok(Json(EventsResponse { events }))
}

pub async fn create_event(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(draft): Json<EventDraft>,
) -> Result<(StatusCode, Json<CalendarEvent>), ApiError> {
    draft.validate()?;
    let provider = state.providers.provider_for(&user.user_id).await?;
    let event = state
        .mutator
        .create_event(provider.as_ref(), &user.user_id, &draft)
        .await?;
    Ok((StatusCode::CREATED, Json(event)))
}

#[derive(Debug, Deserialize)]
pub struct CalendarHint {
    calendar_id: Option<String>,
}

pub async fn update_event(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(event_id): Path<String>,
    Query(hint): Query<CalendarHint>,
    Json(patch): Json<EventPatch>,
) -> Result<Json<CalendarEvent>, ApiError> {
    patch.validate()?;
    let provider = state.providers.provider_for(&user.user_id).await?;
    let event = state
        .mutator
        .update_event(
            provider.as_ref(),
            &user.user_id,
            &event_id,
            hint.calendar_id.as_deref(),
            &patch,
        )
        .await?;
    Ok(Json(event))
}

pub async fn delete_event(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(event_id): Path<String>,
    Query(hint): Query<CalendarHint>,
) -> Result<StatusCode, ApiError> {
    let provider = state.providers.provider_for(&user.user_id).await?;
    state
        .mutator
        .delete_event(
            provider.as_ref(),
            &user.user_id,
            &event_id,
            hint.calendar_id.as_deref(),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Accepts RFC 3339 instants or bare `YYYY-MM-DD` dates (UTC midnight).
fn parse_instant(value: &str, field: &str) -> Result<DateTime<Utc>, ApiError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .map_err(|_| ApiError::bad_request(format!("{} must be an RFC 3339 timestamp or date", field)))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_parse_instant() {
        assert_eq!(
            parse_instant("2024-03-04T10:00:00+02:00", "start").unwrap().to_rfc3339(),
            "2024-03-04T08:00:00+00:00"
        );
        assert_eq!(
            parse_instant("2024-03-04", "start").unwrap().to_rfc3339(),
            "2024-03-04T00:00:00+00:00"
        );
        assert!(parse_instant("next tuesday", "start").is_err());
    }
}
