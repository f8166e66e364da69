//! Create, update and delete events remotely, then mirror the result locally.
//!
//! The remote call is authoritative: a cache write that fails afterwards is
//! logged and otherwise ignored.

use tracing::{info, warn};

use crate::cache::SharedCache;
use crate::error::CalendarError;
use crate::provider::CalendarProvider;
use crate::sync::PRIMARY_CALENDAR;
use crate::types::{CalendarEvent, EventDraft, EventPatch, EventStatus};

pub struct EventMutator {
    cache: SharedCache,
}

impl EventMutator {
    pub fn new(cache: SharedCache) -> Self {
        Self { cache }
    }

    pub async fn create_event(
        &self,
        provider: &dyn CalendarProvider,
        user_id: &str,
        draft: &EventDraft,
    ) -> Result<CalendarEvent, CalendarError> {
        draft.validate()?;
        let calendar_id = draft.calendar_id.as_deref().unwrap_or(PRIMARY_CALENDAR);

        let created = provider.create_event(calendar_id, draft).await?;
        let event = CalendarEvent::from_api(created, user_id, calendar_id)?;
        info!(user = %user_id, event = %event.id, calendar = %calendar_id, "Created event");

        self.mirror(&event);
        Ok(event)
    }

    pub async fn update_event(
        &self,
        provider: &dyn CalendarProvider,
        user_id: &str,
        event_id: &str,
        calendar_hint: Option<&str>,
        patch: &EventPatch,
    ) -> Result<CalendarEvent, CalendarError> {
        patch.validate()?;
        let calendar_id = self.resolve_calendar(user_id, event_id, calendar_hint)?;

        let updated = provider.update_event(&calendar_id, event_id, patch).await?;
        let event = CalendarEvent::from_api(updated, user_id, &calendar_id)?;
        info!(user = %user_id, event = %event.id, calendar = %calendar_id, "Updated event");

        self.mirror(&event);
        Ok(event)
    }

    /// Delete remotely. An event the remote no longer knows is dropped from
    /// the cache before the not-found error is returned.
    pub async fn delete_event(
        &self,
        provider: &dyn CalendarProvider,
        user_id: &str,
        event_id: &str,
        calendar_hint: Option<&str>,
    ) -> Result<(), CalendarError> {
        let calendar_id = self.resolve_calendar(user_id, event_id, calendar_hint)?;

        let result = provider.delete_event(&calendar_id, event_id).await;
        if matches!(result, Ok(()) | Err(CalendarError::EventNotFound(_))) {
            if let Err(e) = self.cache.lock().delete_event(user_id, event_id) {
                warn!(user = %user_id, event = %event_id, error = %e, "Failed to remove event from cache");
            }
        }
        result?;

        info!(user = %user_id, event = %event_id, calendar = %calendar_id, "Deleted event");
        Ok(())
    }

    /// Cached calendar of the event, else the caller's hint, else primary.
    fn resolve_calendar(
        &self,
        user_id: &str,
        event_id: &str,
        calendar_hint: Option<&str>,
    ) -> Result<String, CalendarError> {
        let cached = self.cache.lock().get_event(user_id, event_id)?;
        Ok(cached
            .map(|e| e.calendar_id)
            .or_else(|| calendar_hint.map(str::to_string))
            .unwrap_or_else(|| PRIMARY_CALENDAR.to_string()))
    }

    fn mirror(&self, event: &CalendarEvent) {
        let result = if event.status == EventStatus::Cancelled {
            self.cache.lock().delete_event(&event.owner_id, &event.id).map(|_| ())
        } else {
            self.cache.lock().upsert_event(event)
        };
        if let Err(e) = result {
            warn!(user = %event.owner_id, event = %event.id, error = %e, "Failed to mirror event into cache");
        }
    }
}
