use axum::extract::{Query, State};
use axum::{Extension, Json};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use tether_auth::AuthenticatedUser;
use tether_calendar::profile::{parse_hhmm, parse_time_zone, parse_weekdays};
use tether_calendar::{
    busy_intervals, compute_availability, AvailabilityProfile, AvailabilityQuery, DayAvailability,
    ProfileContext, PRIMARY_CALENDAR,
};

use crate::error::ApiError;
use crate::state::AppState;

/// Query string of `GET /availability`. Anything omitted comes from the
/// stored profile for `context`, then from the built-in defaults.
#[derive(Debug, Deserialize)]
pub struct AvailabilityParams {
    start: NaiveDate,
    end: NaiveDate,
    days: Option<String>,
    window_start: Option<String>,
    window_end: Option<String>,
    granularity: Option<u32>,
    buffer_before: Option<u32>,
    buffer_after: Option<u32>,
    timezone: Option<String>,
    context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    time_zone: String,
    granularity_minutes: u32,
    days: Vec<DayAvailability>,
}

pub async fn get_availability(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(params): Query<AvailabilityParams>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let context = match params.context.as_deref() {
        Some(raw) => raw.parse::<ProfileContext>()?,
        None => ProfileContext::Standard,
    };

    let (profile, busy_calendars) = {
        let cache = state.cache.lock();
        let profile = cache
            .get_profile(&user.user_id, context)?
            .unwrap_or_else(|| AvailabilityProfile {
                context,
                ..AvailabilityProfile::default()
            });
        (profile, cache.busy_calendars(&user.user_id)?)
    };

    let query = build_query(&profile, &params)?;
    query.validate(state.config.availability.max_range_days)?;

    let calendars = if busy_calendars.is_empty() {
        vec![PRIMARY_CALENDAR.to_string()]
    } else {
        busy_calendars
    };
    let bounds = query.search_bounds()?;
    let events = state.cache.lock().list_events_in_calendars(
        &user.user_id,
        &calendars,
        bounds.start,
        bounds.end,
    )?;

    let busy = busy_intervals(&events, query.time_zone);
    let days = compute_availability(&query, &busy);
    tracing::debug!(user = %user.user_id, days = days.len(), busy = busy.len(), "Computed availability");

    Ok(Json(AvailabilityResponse {
        time_zone: query.time_zone.name().to_string(),
        granularity_minutes: query.granularity_minutes,
        days,
    }))
}

fn build_query(
    profile: &AvailabilityProfile,
    params: &AvailabilityParams,
) -> Result<AvailabilityQuery, ApiError> {
    let mut query = AvailabilityQuery::from_profile(profile, params.start, params.end)?;

    if let Some(days) = &params.days {
        query.days = parse_weekdays(days)?;
    }
    if let Some(start) = &params.window_start {
        query.window_start = parse_hhmm(start)?;
    }
    if let Some(end) = &params.window_end {
        query.window_end = parse_hhmm(end)?;
    }
    if let Some(granularity) = params.granularity {
        query.granularity_minutes = granularity;
    }
    if let Some(before) = params.buffer_before {
        query.buffer_before_minutes = before;
    }
    if let Some(after) = params.buffer_after {
        query.buffer_after_minutes = after;
    }
    if let Some(tz) = &params.timezone {
        query.time_zone = parse_time_zone(tz)?;
    }
    query.not_before = Some(Utc::now());

    Ok(query)
}
