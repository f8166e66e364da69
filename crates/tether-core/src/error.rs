//! Shared error types for the Tether services.
//!
//! Variants carry enough context for logs. `AuthError::user_message()` gives
//! a short string that is safe to return to API clients.

use thiserror::Error;

/// Network-related errors (HTTP, connectivity).
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },
}

/// Database/storage errors (SQLite).
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Data corruption detected: {0}")]
    Corruption(String),
}

/// Authentication errors (session tokens, Google OAuth tokens).
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing or malformed credentials: {0}")]
    MissingCredentials(String),

    #[error("Invalid session token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("No Google account connected for user {0}")]
    TokenNotFound(String),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Token storage error: {0}")]
    StorageError(String),
}

impl AuthError {
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials(_) => "Please sign in.",
            AuthError::InvalidToken(_) => "Authentication invalid. Please sign in again.",
            AuthError::TokenExpired => "Your session has expired. Please sign in again.",
            AuthError::TokenNotFound(_) => "Connect your Google account to use the calendar.",
            AuthError::RefreshFailed(_) => "Google access expired. Please reconnect your account.",
            AuthError::StorageError(_) => "Failed to load credentials. Please try again.",
        }
    }

    /// Whether the caller should answer 401 rather than 500.
    pub fn is_unauthenticated(&self) -> bool {
        !matches!(self, AuthError::StorageError(_))
    }
}

/// Extension trait for converting reqwest errors to our error types.
pub trait ReqwestErrorExt {
    fn into_network_error(self) -> NetworkError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_network_error(self) -> NetworkError {
        if self.is_timeout() {
            NetworkError::Timeout
        } else if let Some(status) = self.status() {
            NetworkError::ServerError {
                status: status.as_u16(),
                message: self.to_string(),
            }
        } else {
            NetworkError::ConnectionFailed(self.to_string())
        }
    }
}

/// Extension trait for converting rusqlite errors to our error types.
pub trait RusqliteErrorExt {
    fn into_database_error(self) -> DatabaseError;
}

impl RusqliteErrorExt for rusqlite::Error {
    fn into_database_error(self) -> DatabaseError {
        match &self {
            rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("corrupt") => {
                DatabaseError::Corruption(self.to_string())
            }
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::CannotOpen =>
            {
                DatabaseError::ConnectionFailed(self.to_string())
            }
            _ => DatabaseError::QueryFailed(self.to_string()),
        }
    }
}
