//! Remote calendar abstraction.
//!
//! `CalendarProvider` is the seam between cache logic and the Google API so
//! sync and mutation code can run against an in-memory fake in tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CalendarError;
use crate::types::{ApiEvent, Calendar, EventDraft, EventListResponse, EventPatch};

#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// List calendars visible to the account.
    async fn list_calendars(&self) -> Result<Vec<Calendar>, CalendarError>;

    /// One page of expanded events overlapping `[time_min, time_max)`.
    async fn list_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        page_token: Option<&str>,
    ) -> Result<EventListResponse, CalendarError>;

    async fn create_event(
        &self,
        calendar_id: &str,
        draft: &EventDraft,
    ) -> Result<ApiEvent, CalendarError>;

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<ApiEvent, CalendarError>;

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<(), CalendarError>;
}

/// Resolves the remote calendar connection for a user.
#[async_trait]
pub trait ProviderSource: Send + Sync {
    async fn provider_for(&self, user_id: &str) -> Result<Arc<dyn CalendarProvider>, CalendarError>;
}
