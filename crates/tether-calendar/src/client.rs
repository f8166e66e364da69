//! Google Calendar API client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::instrument;

use crate::error::CalendarError;
use crate::provider::CalendarProvider;
use crate::types::{ApiEvent, Calendar, CalendarListResponse, EventDraft, EventListResponse, EventPatch};

const DEFAULT_PAGE_SIZE: u32 = 250;

/// Seconds to wait when Google rate-limits without a usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Calendar API client bound to one user's access token.
pub struct GoogleCalendarClient {
    http: reqwest::Client,
    access_token: String,
    base_url: String,
    page_size: u32,
}

impl GoogleCalendarClient {
    /// Build a client that shares `http` (and its connection pool) across users.
    pub fn with_http_client(http: reqwest::Client, access_token: &str, base_url: &str) -> Self {
        Self {
            http,
            access_token: access_token.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// HTTP client with the request timeout used for all Google calls.
    pub fn http_client(timeout: Duration) -> Result<reqwest::Client, CalendarError> {
        Ok(reqwest::Client::builder().timeout(timeout).build()?)
    }

    fn authorized(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.access_token)
    }

    fn events_path(calendar_id: &str) -> String {
        format!("/calendars/{}/events", urlencoding::encode(calendar_id))
    }

    fn event_path(calendar_id: &str, event_id: &str) -> String {
        format!(
            "{}/{}",
            Self::events_path(calendar_id),
            urlencoding::encode(event_id)
        )
    }

    async fn json_body<T: DeserializeOwned>(response: Response) -> Result<T, CalendarError> {
        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| CalendarError::ApiError(format!("JSON parse error: {}", e)))
    }

    /// Map a non-success response onto the calendar error taxonomy.
    ///
    /// Google reports quota exhaustion as 403 with a usage-limit reason, so a
    /// 403 is only an authorization failure when the body says otherwise.
    async fn status_error(response: Response) -> CalendarError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);

        match status.as_u16() {
            401 => CalendarError::TokenExpired,
            403 => {
                let body = response.text().await.unwrap_or_default();
                if is_usage_limit(&body) {
                    CalendarError::RateLimited(retry_after)
                } else {
                    CalendarError::AuthRequired
                }
            }
            404 | 410 => CalendarError::EventNotFound(response.text().await.unwrap_or_default()),
            429 => CalendarError::RateLimited(retry_after),
            _ => {
                let body = response.text().await.unwrap_or_default();
                CalendarError::ApiError(format!("{}: {}", status, body))
            }
        }
    }
}

/// Whether a Google error body reports a quota or rate limit.
fn is_usage_limit(body: &str) -> bool {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return false;
    };
    let Some(errors) = value["error"]["errors"].as_array() else {
        return false;
    };
    errors.iter().any(|e| {
        matches!(
            e["reason"].as_str(),
            Some(
                "rateLimitExceeded"
                    | "userRateLimitExceeded"
                    | "quotaExceeded"
                    | "dailyLimitExceeded"
            )
        ) || e["domain"].as_str() == Some("usageLimits")
    })
}

#[async_trait]
impl CalendarProvider for GoogleCalendarClient {
    #[instrument(skip(self), level = "info")]
    async fn list_calendars(&self) -> Result<Vec<Calendar>, CalendarError> {
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.authorized(Method::GET, "/users/me/calendarList");
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let page: CalendarListResponse = Self::json_body(request.send().await?).await?;
            calendars.extend(page.items.into_iter().map(Calendar::from));

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok(calendars)
    }

    #[instrument(skip(self), level = "info")]
    async fn list_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        page_token: Option<&str>,
    ) -> Result<EventListResponse, CalendarError> {
        // showDeleted surfaces cancellations so sync can drop them from the cache.
        let mut request = self
            .authorized(Method::GET, &Self::events_path(calendar_id))
            .query(&[
                ("timeMin", time_min.to_rfc3339()),
                ("timeMax", time_max.to_rfc3339()),
                ("singleEvents", "true".to_string()),
                ("showDeleted", "true".to_string()),
                ("orderBy", "startTime".to_string()),
                ("maxResults", self.page_size.to_string()),
            ]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        Self::json_body(request.send().await?).await
    }

    #[instrument(skip(self, draft), level = "info")]
    async fn create_event(
        &self,
        calendar_id: &str,
        draft: &EventDraft,
    ) -> Result<ApiEvent, CalendarError> {
        let response = self
            .authorized(Method::POST, &Self::events_path(calendar_id))
            .json(&draft.to_api_json())
            .send()
            .await?;
        Self::json_body(response).await
    }

    #[instrument(skip(self, patch), level = "info")]
    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<ApiEvent, CalendarError> {
        let response = self
            .authorized(Method::PATCH, &Self::event_path(calendar_id, event_id))
            .json(&patch.to_api_json())
            .send()
            .await?;
        Self::json_body(response).await
    }

    #[instrument(skip(self), level = "info")]
    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<(), CalendarError> {
        let response = self
            .authorized(Method::DELETE, &Self::event_path(calendar_id, event_id))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::status_error(response).await)
        }
    }
}
