//! Calendar sync and availability for Tether.
//!
//! Mirrors each user's Google calendars into a SQLite cache, computes free
//! slots from cached busy time, and proxies event mutations.

pub mod availability;
pub mod cache;
pub mod client;
pub mod error;
pub mod mutation;
pub mod profile;
pub mod provider;
pub mod sync;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use availability::{
    busy_intervals, compute_availability, merge_intervals, AvailabilityQuery, BusyInterval,
    DayAvailability, Slot,
};
pub use cache::{CalendarCache, SharedCache, SyncState};
pub use client::GoogleCalendarClient;
pub use error::CalendarError;
pub use mutation::EventMutator;
pub use profile::{AvailabilityProfile, ProfileContext};
pub use provider::{CalendarProvider, ProviderSource};
pub use sync::{SyncReport, SyncService, SyncSettings, SyncWindow, PRIMARY_CALENDAR};
pub use types::{
    AccessRole, Attendee, Calendar, CalendarEvent, EventDraft, EventPatch, EventStatus, EventTime,
    ResponseStatus, PRIVATE_EVENT_TITLE,
};
