//! Calendar-specific error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalendarError {
    #[error("Authentication required")]
    AuthRequired,

    #[error("Token expired")]
    TokenExpired,

    #[error("Rate limited by calendar provider, retry after {0} seconds")]
    RateLimited(u64),

    #[error("Sync already ran recently, retry after {retry_after_secs} seconds")]
    SyncCooldown { retry_after_secs: u64 },

    #[error("Event not found: {0}")]
    EventNotFound(String),

    #[error("Invalid event data: {0}")]
    InvalidEventData(String),

    #[error("Invalid availability query: {0}")]
    InvalidQuery(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl CalendarError {
    /// Short message suitable for API clients.
    pub fn user_message(&self) -> String {
        match self {
            Self::AuthRequired => "Please connect your Google account".to_string(),
            Self::TokenExpired => "Google access expired. Please reconnect.".to_string(),
            Self::RateLimited(secs) => format!("Too many requests. Please wait {} seconds.", secs),
            Self::SyncCooldown { retry_after_secs } => {
                format!("Calendar was just synced. Try again in {} seconds.", retry_after_secs)
            }
            Self::EventNotFound(_) => "Event not found".to_string(),
            Self::InvalidEventData(msg) => format!("Invalid event: {}", msg),
            Self::InvalidQuery(msg) => format!("Invalid availability query: {}", msg),
            Self::ApiError(msg) => format!("Calendar error: {}", msg),
            Self::CacheError(_) => "Local calendar cache error".to_string(),
            Self::NetworkError(_) => "Could not reach the calendar provider.".to_string(),
        }
    }
}

impl From<rusqlite::Error> for CalendarError {
    fn from(err: rusqlite::Error) -> Self {
        use tether_core::error::RusqliteErrorExt;
        Self::CacheError(err.into_database_error().to_string())
    }
}

impl From<serde_json::Error> for CalendarError {
    fn from(err: serde_json::Error) -> Self {
        Self::CacheError(format!("serialization failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_user_messages() {
        let err = CalendarError::AuthRequired;
        assert!(err.user_message().contains("connect"));

        let err = CalendarError::RateLimited(30);
        assert!(err.user_message().contains("30"));

        let err = CalendarError::SyncCooldown {
            retry_after_secs: 42,
        };
        assert!(err.user_message().contains("42"));
    }

    #[test]
    fn test_rusqlite_conversion() {
        let err: CalendarError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, CalendarError::CacheError(_)));
    }
}
