use axum::body::Bytes;
use axum::extract::State;
use axum::{Extension, Json};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use tether_auth::AuthenticatedUser;
use tether_calendar::{SyncReport, SyncState};

use crate::error::ApiError;
use crate::state::AppState;

/// Optional body of `POST /sync`; both dates or neither.
#[derive(Debug, Default, Deserialize)]
struct SyncRequest {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

pub async fn run_sync(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Bytes,
) -> Result<Json<SyncReport>, ApiError> {
    let request: SyncRequest = if body.is_empty() {
        SyncRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("Invalid sync request: {}", e)))?
    };

    let now = Utc::now();
    let window = match (request.start, request.end) {
        (Some(start), Some(end)) => state.sync.explicit_window(start, end)?,
        (None, None) => state.sync.default_window(now),
        _ => return Err(ApiError::bad_request("start and end must be given together")),
    };

    let provider = state.providers.provider_for(&user.user_id).await?;
    let report = state
        .sync
        .sync_user(provider.as_ref(), &user.user_id, window, now)
        .await?;
    Ok(Json(report))
}

pub async fn sync_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<SyncState>, ApiError> {
    let status = state.cache.lock().sync_state(&user.user_id)?;
    Ok(Json(status))
}
