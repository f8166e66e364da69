//! In-memory [`CalendarProvider`] for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::CalendarError;
use crate::provider::{CalendarProvider, ProviderSource};
use crate::types::{AccessRole, ApiEvent, Calendar, EventDraft, EventListResponse, EventPatch};

type ErrorFactory = Box<dyn Fn() -> CalendarError + Send + Sync>;

/// Stores Google-shaped event JSON per calendar. The time range passed to
/// `list_events` is ignored.
pub struct FakeProvider {
    events: Mutex<Vec<(String, Value)>>,
    page_size: usize,
    next_id: AtomicUsize,
    list_calls: AtomicUsize,
    failure: Mutex<Option<ErrorFactory>>,
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            page_size: 250,
            next_id: AtomicUsize::new(1),
            list_calls: AtomicUsize::new(0),
            failure: Mutex::new(None),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Add an event, replacing any event with the same id in that calendar.
    pub fn add_event(&self, calendar_id: &str, event: Value) {
        let mut events = self.events.lock();
        let id = event["id"].clone();
        events.retain(|(cal, e)| !(cal == calendar_id && e["id"] == id));
        events.push((calendar_id.to_string(), event));
    }

    pub fn remove_event(&self, calendar_id: &str, event_id: &str) {
        self.events
            .lock()
            .retain(|(cal, e)| !(cal == calendar_id && e["id"] == event_id));
    }

    pub fn event(&self, calendar_id: &str, event_id: &str) -> Option<Value> {
        self.events
            .lock()
            .iter()
            .find(|(cal, e)| cal == calendar_id && e["id"] == event_id)
            .map(|(_, e)| e.clone())
    }

    /// Make every subsequent call fail with the produced error.
    pub fn fail_with(&self, factory: impl Fn() -> CalendarError + Send + Sync + 'static) {
        *self.failure.lock() = Some(Box::new(factory));
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn check_failure(&self) -> Result<(), CalendarError> {
        match self.failure.lock().as_ref() {
            Some(factory) => Err(factory()),
            None => Ok(()),
        }
    }

    fn parse(value: Value) -> Result<ApiEvent, CalendarError> {
        serde_json::from_value(value).map_err(|e| CalendarError::ApiError(e.to_string()))
    }
}

#[async_trait]
impl CalendarProvider for FakeProvider {
    async fn list_calendars(&self) -> Result<Vec<Calendar>, CalendarError> {
        self.check_failure()?;
        let mut ids: Vec<String> = vec!["primary".to_string()];
        for (cal, _) in self.events.lock().iter() {
            if !ids.contains(cal) {
                ids.push(cal.clone());
            }
        }
        Ok(ids
            .into_iter()
            .map(|id| Calendar {
                is_primary: id == "primary",
                summary: id.clone(),
                id,
                time_zone: None,
                background_color: None,
                access_role: AccessRole::Owner,
            })
            .collect())
    }

    async fn list_events(
        &self,
        calendar_id: &str,
        _time_min: DateTime<Utc>,
        _time_max: DateTime<Utc>,
        page_token: Option<&str>,
    ) -> Result<EventListResponse, CalendarError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        let offset: usize = page_token.and_then(|t| t.parse().ok()).unwrap_or(0);
        let matching: Vec<Value> = self
            .events
            .lock()
            .iter()
            .filter(|(cal, _)| cal == calendar_id)
            .map(|(_, e)| e.clone())
            .collect();

        let end = (offset + self.page_size).min(matching.len());
        let items = matching
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .cloned()
            .map(Self::parse)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(EventListResponse {
            items,
            next_page_token: (end < matching.len()).then(|| end.to_string()),
        })
    }

    async fn create_event(
        &self,
        calendar_id: &str,
        draft: &EventDraft,
    ) -> Result<ApiEvent, CalendarError> {
        self.check_failure()?;
        let mut body = draft.to_api_json();
        body["id"] = Value::String(format!(
            "fake-{}",
            self.next_id.fetch_add(1, Ordering::SeqCst)
        ));
        self.add_event(calendar_id, body.clone());
        Self::parse(body)
    }

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<ApiEvent, CalendarError> {
        self.check_failure()?;
        let mut event = self
            .event(calendar_id, event_id)
            .ok_or_else(|| CalendarError::EventNotFound(event_id.to_string()))?;

        if let (Value::Object(target), Value::Object(changes)) = (&mut event, patch.to_api_json()) {
            target.extend(changes);
        }
        self.add_event(calendar_id, event.clone());
        Self::parse(event)
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<(), CalendarError> {
        self.check_failure()?;
        if self.event(calendar_id, event_id).is_none() {
            return Err(CalendarError::EventNotFound(event_id.to_string()));
        }
        self.remove_event(calendar_id, event_id);
        Ok(())
    }
}

/// Hands every user the same [`FakeProvider`].
#[derive(Clone, Default)]
pub struct FakeProviderSource {
    pub provider: Arc<FakeProvider>,
}

impl FakeProviderSource {
    pub fn new(provider: Arc<FakeProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ProviderSource for FakeProviderSource {
    async fn provider_for(&self, _user_id: &str) -> Result<Arc<dyn CalendarProvider>, CalendarError> {
        let provider: Arc<dyn CalendarProvider> = self.provider.clone();
        Ok(provider)
    }
}
