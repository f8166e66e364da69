use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use tether_auth::extract_bearer_token;

use crate::error::ApiError;
use crate::state::AppState;

/// Verify the bearer token and attach the [`tether_auth::AuthenticatedUser`]
/// to the request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let token = extract_bearer_token(header)?;
    let user = state.verifier.verify(token)?;

    tracing::debug!(user = %user.user_id, "Authenticated request");
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
