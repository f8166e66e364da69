mod availability;
mod connect;
mod events;
mod settings;
mod sync;

use axum::middleware;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::require_auth;
use crate::state::AppState;

pub fn app_router(state: AppState) -> Router {
    let calendar_routes = Router::new()
        .route("/events", get(events::list_events))
        .route(
            "/events/{id}",
            patch(events::update_event).delete(events::delete_event),
        )
        .route("/create-event", post(events::create_event))
        .route("/sync", post(sync::run_sync).get(sync::sync_status))
        .route("/availability", get(availability::get_availability))
        .route("/calendars", get(settings::list_calendars))
        .route(
            "/busy-calendars",
            post(settings::set_busy_calendars).get(settings::get_busy_calendars),
        )
        .route(
            "/availability-profile",
            post(settings::save_profile).get(settings::get_profile),
        )
        .route("/connect", post(connect::connect).delete(connect::disconnect))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api/calendar", calendar_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
    })
}
