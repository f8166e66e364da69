//! Busy-calendar selection and availability profiles.

use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use tether_auth::AuthenticatedUser;
use tether_calendar::{AvailabilityProfile, Calendar, ProfileContext, PRIMARY_CALENDAR};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CalendarEntry {
    #[serde(flatten)]
    calendar: Calendar,
    /// Whether events on this calendar block availability.
    busy: bool,
}

pub async fn list_calendars(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<CalendarEntry>>, ApiError> {
    let provider = state.providers.provider_for(&user.user_id).await?;
    let calendars = provider.list_calendars().await?;
    let selected = state.cache.lock().busy_calendars(&user.user_id)?;

    let entries = calendars
        .into_iter()
        .map(|calendar| {
            let busy = if selected.is_empty() {
                calendar.is_primary || calendar.id == PRIMARY_CALENDAR
            } else {
                selected.contains(&calendar.id)
            };
            CalendarEntry { calendar, busy }
        })
        .collect();
    Ok(Json(entries))
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BusyCalendars {
    calendar_ids: Vec<String>,
}

pub async fn get_busy_calendars(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<BusyCalendars>, ApiError> {
    let calendar_ids = state.cache.lock().busy_calendars(&user.user_id)?;
    Ok(Json(BusyCalendars { calendar_ids }))
}

/// Replace the set of calendars counted as busy. An empty list falls back
/// to the primary calendar.
pub async fn set_busy_calendars(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<BusyCalendars>,
) -> Result<Json<BusyCalendars>, ApiError> {
    let mut calendar_ids: Vec<String> = Vec::with_capacity(request.calendar_ids.len());
    for id in request.calendar_ids {
        let id = id.trim().to_string();
        if id.is_empty() {
            return Err(ApiError::bad_request("calendar ids cannot be empty"));
        }
        if !calendar_ids.contains(&id) {
            calendar_ids.push(id);
        }
    }

    let stored = {
        let cache = state.cache.lock();
        cache.set_busy_calendars(&user.user_id, &calendar_ids)?;
        cache.busy_calendars(&user.user_id)?
    };
    tracing::info!(user = %user.user_id, count = stored.len(), "Updated busy calendars");
    Ok(Json(BusyCalendars {
        calendar_ids: stored,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ProfileQuery {
    context: Option<String>,
}

/// Stored profile for the context, or the defaults when none was saved.
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<ProfileQuery>,
) -> Result<Json<AvailabilityProfile>, ApiError> {
    let context = match query.context.as_deref() {
        Some(raw) => raw.parse::<ProfileContext>()?,
        None => ProfileContext::Standard,
    };

    let profile = state
        .cache
        .lock()
        .get_profile(&user.user_id, context)?
        .unwrap_or_else(|| AvailabilityProfile {
            context,
            ..AvailabilityProfile::default()
        });
    Ok(Json(profile))
}

pub async fn save_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(profile): Json<AvailabilityProfile>,
) -> Result<Json<AvailabilityProfile>, ApiError> {
    profile.validate()?;
    state.cache.lock().upsert_profile(&user.user_id, &profile)?;
    tracing::info!(user = %user.user_id, context = profile.context.as_str(), "Saved availability profile");
    Ok(Json(profile))
}
