//! Google account connection. The client runs the OAuth consent flow and
//! hands the resulting tokens over here.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use tether_auth::{AuthenticatedUser, GoogleTokenResponse};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    connected: bool,
    expires_at: Option<DateTime<Utc>>,
    scopes: Vec<String>,
    can_refresh: bool,
}

pub async fn connect(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(tokens): Json<GoogleTokenResponse>,
) -> Result<Json<ConnectResponse>, ApiError> {
    if tokens.access_token.trim().is_empty() {
        return Err(ApiError::bad_request("access_token is required"));
    }
    let representable = tokens
        .expires_at(Utc::now().timestamp())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .is_some();
    if !representable {
        return Err(ApiError::bad_request("expires_in is out of range"));
    }

    let token_set = state.tokens.connect(&user.user_id, tokens)?;
    Ok(Json(ConnectResponse {
        connected: true,
        expires_at: DateTime::from_timestamp(token_set.expires_at, 0),
        scopes: token_set.scopes,
        can_refresh: token_set.refresh_token.is_some(),
    }))
}

/// Forget the user's Google tokens and everything cached from them.
pub async fn disconnect(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<StatusCode, ApiError> {
    state.tokens.store().delete_token(&user.user_id)?;
    state.cache.lock().clear_owner(&user.user_id)?;
    tracing::info!(user = %user.user_id, "Disconnected Google account");
    Ok(StatusCode::NO_CONTENT)
}
