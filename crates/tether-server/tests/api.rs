#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;

use tether_auth::session::SessionClaims;
use tether_auth::{GoogleTokenManager, TokenStore};
use tether_calendar::testing::{FakeProvider, FakeProviderSource};
use tether_calendar::CalendarCache;
use tether_core::Config;
use tether_server::{app_router, AppState};

const SECRET: &str = "test-secret-that-is-long-enough-for-hs256";

struct TestApp {
    router: Router,
    provider: Arc<FakeProvider>,
}

impl TestApp {
    fn new() -> Self {
        let mut config = Config::default();
        config.auth.jwt_secret = SECRET.to_string();

        let provider = Arc::new(FakeProvider::new());
        let cache = CalendarCache::in_memory().unwrap().shared();
        let tokens = Arc::new(GoogleTokenManager::new(
            Arc::new(TokenStore::in_memory().unwrap()),
            None,
        ));
        let state = AppState::new(
            config,
            cache,
            tokens,
            Arc::new(FakeProviderSource::new(provider.clone())),
        );

        Self {
            router: app_router(state),
            provider,
        }
    }

    async fn request(
        &self,
        method: Method,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, HeaderMap, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token_for(user)));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, headers, value)
    }

    async fn get(&self, uri: &str, user: &str) -> (StatusCode, Value) {
        let (status, _, body) = self.request(Method::GET, uri, Some(user), None).await;
        (status, body)
    }

    async fn post(&self, uri: &str, user: &str, body: Value) -> (StatusCode, Value) {
        let (status, _, body) = self.request(Method::POST, uri, Some(user), Some(body)).await;
        (status, body)
    }

    async fn sync_march_2030(&self, user: &str) -> (StatusCode, HeaderMap, Value) {
        self.request(
            Method::POST,
            "/api/calendar/sync",
            Some(user),
            Some(json!({"start": "2030-03-01", "end": "2030-03-10"})),
        )
        .await
    }
}

fn token_for(user: &str) -> String {
    let claims = SessionClaims {
        sub: user.to_string(),
        exp: Utc::now().timestamp() + 3600,
        aud: "authenticated".to_string(),
        role: Some("authenticated".to_string()),
        email: Some(format!("{}@example.com", user)),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn remote_event(id: &str, summary: &str, start: &str, end: &str) -> Value {
    json!({
        "id": id,
        "summary": summary,
        "start": {"dateTime": start},
        "end": {"dateTime": end}
    })
}

// 2030-03-04 is a Monday.
const MONDAY: &str = "2030-03-04";

#[tokio::test]
async fn healthz_is_public() {
    let app = TestApp::new();
    let (status, _, body) = app.request(Method::GET, "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn calendar_routes_require_a_session() {
    let app = TestApp::new();

    let (status, _, body) = app
        .request(Method::GET, "/api/calendar/sync", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let forged = Request::builder()
        .uri("/api/calendar/sync")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(forged).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn second_sync_within_cooldown_is_rate_limited() {
    let app = TestApp::new();

    let (status, _, report) = app.sync_march_2030("u1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["calendars"], json!(["primary"]));

    let (status, headers, body) = app.sync_march_2030("u1").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = headers[header::RETRY_AFTER].to_str().unwrap().parse().unwrap();
    assert!(retry_after > 0 && retry_after <= 60);
    assert!(body["error"].as_str().unwrap().contains("synced"));

    // The cooldown is per user.
    let (status, _, _) = app.sync_march_2030("u2").await;
    assert_eq!(status, StatusCode::OK);

    let (status, state) = app.get("/api/calendar/sync", "u1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["last_status"], "ok");
}

#[tokio::test]
async fn sync_rejects_half_a_window() {
    let app = TestApp::new();
    let (status, _) = app
        .post("/api/calendar/sync", "u1", json!({"start": "2030-03-01"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sync_rejects_windows_it_cannot_fetch() {
    let app = TestApp::new();

    let (status, _) = app
        .post(
            "/api/calendar/sync",
            "u1",
            json!({"start": "+262142-12-31", "end": "+262142-12-31"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/api/calendar/sync",
            "u1",
            json!({"start": "2030-01-01", "end": "2031-06-30"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.provider.list_calls(), 0);
}

#[tokio::test]
async fn private_event_details_never_leave_the_server() {
    let app = TestApp::new();
    app.provider.add_event(
        "primary",
        json!({
            "id": "secret",
            "summary": "Therapy session",
            "description": "Discuss anxiety",
            "location": "Dr. Lee's office",
            "visibility": "private",
            "start": {"dateTime": "2030-03-04T10:00:00Z"},
            "end": {"dateTime": "2030-03-04T11:00:00Z"}
        }),
    );

    let (status, _, _) = app.sync_march_2030("u1").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .get(
            "/api/calendar/events?start=2030-03-04T00:00:00Z&end=2030-03-05T00:00:00Z",
            "u1",
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let event = &body["events"][0];
    assert_eq!(event["summary"], "Busy");
    assert_eq!(event["is_private"], true);

    let (status, availability) = app
        .get(
            &format!("/api/calendar/availability?start={MONDAY}&end={MONDAY}&timezone=UTC"),
            "u1",
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    for text in [body.to_string(), availability.to_string()] {
        assert!(!text.contains("Therapy"));
        assert!(!text.contains("anxiety"));
        assert!(!text.contains("Dr. Lee"));
    }
}

#[tokio::test]
async fn fully_busy_day_has_no_slots() {
    let app = TestApp::new();
    app.provider.add_event(
        "primary",
        remote_event("offsite", "Offsite", "2030-03-04T09:00:00Z", "2030-03-04T18:00:00Z"),
    );
    app.sync_march_2030("u1").await;

    let (status, body) = app
        .get(
            &format!(
                "/api/calendar/availability?start={MONDAY}&end={MONDAY}&days=mon&window_start=09:00&window_end=18:00&timezone=UTC"
            ),
            "u1",
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let days = body["days"].as_array().unwrap();
    assert_eq!(days.len(), 1);
    assert_eq!(days[0]["label"], "Monday, March 4");
    assert_eq!(days[0]["slots"], json!([]));
}

#[tokio::test]
async fn buffers_exclude_time_around_meetings() {
    let app = TestApp::new();
    app.provider.add_event(
        "primary",
        remote_event("m1", "Review", "2030-03-04T10:00:00Z", "2030-03-04T11:00:00Z"),
    );
    app.sync_march_2030("u1").await;

    let (status, body) = app
        .get(
            &format!(
                "/api/calendar/availability?start={MONDAY}&end={MONDAY}&window_start=09:00&window_end=12:00&granularity=10&buffer_before=10&buffer_after=10&timezone=UTC"
            ),
            "u1",
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let labels: Vec<&str> = body["days"][0]["slots"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["label"].as_str().unwrap())
        .collect();
    assert!(labels.contains(&"09:40"));
    assert!(!labels.contains(&"09:50"));
    assert!(!labels.contains(&"11:00"));
    assert!(labels.contains(&"11:10"));
    assert_eq!(body["granularity_minutes"], 10);
}

#[tokio::test]
async fn availability_validates_input() {
    let app = TestApp::new();

    let (status, body) = app
        .get("/api/calendar/availability?start=2030-03-10&end=2030-03-01", "u1")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = app
        .get(
            &format!("/api/calendar/availability?start={MONDAY}&end={MONDAY}&granularity=0"),
            "u1",
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .get(
            &format!("/api/calendar/availability?start={MONDAY}&end={MONDAY}&timezone=Nowhere/Land"),
            "u1",
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .get("/api/calendar/availability?start=2030-01-01&end=2030-12-31", "u1")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn availability_rejects_dates_at_the_edge_of_the_calendar() {
    let app = TestApp::new();
    let (status, body) = app
        .get(
            "/api/calendar/availability?start=%2B262142-12-31&end=%2B262142-12-31&days=mon,tue,wed,thu,fri,sat,sun",
            "u1",
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn stored_profile_drives_availability() {
    let app = TestApp::new();

    let (status, saved) = app
        .post(
            "/api/calendar/availability-profile",
            "u1",
            json!({
                "context": "priority",
                "days": ["tue"],
                "start_time": "08:00",
                "end_time": "10:00",
                "slot_minutes": 60,
                "time_zone": "UTC"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["days"], json!(["tue"]));

    let (status, profile) = app
        .get("/api/calendar/availability-profile?context=priority", "u1")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["start_time"], "08:00");

    let (_, standard) = app.get("/api/calendar/availability-profile", "u1").await;
    assert_eq!(standard["days"], json!(["mon", "tue", "wed", "thu", "fri"]));

    let (status, body) = app
        .get(
            "/api/calendar/availability?start=2030-03-04&end=2030-03-06&context=priority",
            "u1",
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let days = body["days"].as_array().unwrap();
    assert_eq!(days.len(), 1);
    assert_eq!(days[0]["date"], "2030-03-05");
    assert_eq!(days[0]["slots"].as_array().unwrap().len(), 2);

    let (status, _) = app
        .post(
            "/api/calendar/availability-profile",
            "u1",
            json!({"days": ["mon"], "start_time": "17:00", "end_time": "09:00"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn busy_calendars_select_what_blocks_time() {
    let app = TestApp::new();
    app.provider.add_event(
        "work",
        remote_event("w1", "Standup", "2030-03-04T09:00:00Z", "2030-03-04T10:00:00Z"),
    );
    app.provider.add_event(
        "primary",
        remote_event("p1", "Gym", "2030-03-04T12:00:00Z", "2030-03-04T13:00:00Z"),
    );

    let (status, calendars) = app.get("/api/calendar/calendars", "u1").await;
    assert_eq!(status, StatusCode::OK);
    let busy: Vec<(&str, bool)> = calendars
        .as_array()
        .unwrap()
        .iter()
        .map(|c| (c["id"].as_str().unwrap(), c["busy"].as_bool().unwrap()))
        .collect();
    assert_eq!(busy, vec![("primary", true), ("work", false)]);

    let (status, body) = app
        .post(
            "/api/calendar/busy-calendars",
            "u1",
            json!({"calendar_ids": ["work", " work "]}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["calendar_ids"], json!(["work"]));

    let (status, _, report) = app.sync_march_2030("u1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["calendars"], json!(["work"]));

    let (_, body) = app
        .get(
            &format!(
                "/api/calendar/availability?start={MONDAY}&end={MONDAY}&window_start=09:00&window_end=13:00&granularity=60&timezone=UTC"
            ),
            "u1",
        )
        .await;
    let labels: Vec<&str> = body["days"][0]["slots"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["label"].as_str().unwrap())
        .collect();
    assert_eq!(labels, vec!["10:00", "11:00", "12:00"]);

    let (status, _) = app
        .post("/api/calendar/busy-calendars", "u1", json!({"calendar_ids": [""]}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn event_mutations_round_trip_through_the_cache() {
    let app = TestApp::new();

    let (status, created) = app
        .post(
            "/api/calendar/create-event",
            "u1",
            json!({
                "summary": "Coffee with Ana",
                "start": {"date_time": "2030-03-04T15:00:00Z"},
                "end": {"date_time": "2030-03-04T15:30:00Z"},
                "attendees": ["ana@example.com"]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();

    let (status, _, updated) = app
        .request(
            Method::PATCH,
            &format!("/api/calendar/events/{}", id),
            Some("u1"),
            Some(json!({"location": "Blue Bottle"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["location"], "Blue Bottle");

    let (_, listed) = app
        .get(
            "/api/calendar/events?start=2030-03-04&end=2030-03-05",
            "u1",
        )
        .await;
    assert_eq!(listed["events"][0]["location"], "Blue Bottle");

    // Other users never see it.
    let (_, other) = app
        .get(
            "/api/calendar/events?start=2030-03-04&end=2030-03-05",
            "u2",
        )
        .await;
    assert_eq!(other["events"], json!([]));

    let uri = format!("/api/calendar/events/{}", id);
    let (status, _, _) = app.request(Method::DELETE, &uri, Some("u1"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(app.provider.event("primary", &id).is_none());

    let (status, _, _) = app.request(Method::DELETE, &uri, Some("u1"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_drafts_are_rejected() {
    let app = TestApp::new();
    let (status, body) = app
        .post(
            "/api/calendar/create-event",
            "u1",
            json!({
                "summary": "  ",
                "start": {"date_time": "2030-03-04T15:00:00Z"},
                "end": {"date_time": "2030-03-04T16:00:00Z"}
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("title"));
}

#[tokio::test]
async fn remote_failures_surface_as_500() {
    let app = TestApp::new();
    app.provider
        .fail_with(|| tether_calendar::CalendarError::ApiError("backend exploded".into()));

    let (status, _, body) = app.sync_march_2030("u1").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("backend exploded"));
}

#[tokio::test]
async fn connect_and_disconnect_google_account() {
    let app = TestApp::new();

    let (status, body) = app
        .post(
            "/api/calendar/connect",
            "u1",
            json!({
                "access_token": "ya29.token",
                "refresh_token": "1//refresh",
                "expires_in": 3599,
                "scope": "https://www.googleapis.com/auth/calendar"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected"], true);
    assert_eq!(body["can_refresh"], true);

    let (status, _) = app
        .post("/api/calendar/connect", "u1", json!({"access_token": "", "expires_in": 10}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    for expires_in in [json!(u64::MAX), json!(i64::MAX), json!(1_000_000_000_000_000_000u64)] {
        let (status, body) = app
            .post(
                "/api/calendar/connect",
                "u2",
                json!({"access_token": "ya29.token", "expires_in": expires_in}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    let (status, _, _) = app
        .request(Method::DELETE, "/api/calendar/connect", Some("u1"), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}
