//! Per-user Google OAuth token storage backed by SQLite.

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;

use tether_core::error::RusqliteErrorExt;
use tether_core::AuthError;

/// Seconds before expiry at which a token is treated as stale.
const REFRESH_MARGIN_SECS: i64 = 300;

/// Token set for OAuth2 authentication
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenSet {
    /// Access token for API requests
    pub access_token: String,

    /// Optional refresh token for token renewal
    pub refresh_token: Option<String>,

    /// Token expiration timestamp (Unix seconds)
    pub expires_at: i64,

    /// Scopes granted to this token
    pub scopes: Vec<String>,
}

impl TokenSet {
    /// Check if the token needs refresh (within 5 minutes of expiry)
    pub fn needs_refresh(&self) -> bool {
        Utc::now().timestamp() >= self.expires_at.saturating_sub(REFRESH_MARGIN_SECS)
    }

    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.expires_at
    }
}

/// SQLite table of Google tokens keyed by user id.
pub struct TokenStore {
    conn: Mutex<Connection>,
}

impl TokenStore {
    /// Open (or create) the token table in the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, AuthError> {
        let conn = Connection::open(path).map_err(storage_error)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory store (for tests).
    pub fn in_memory() -> Result<Self, AuthError> {
        let conn = Connection::open_in_memory().map_err(storage_error)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, AuthError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS google_tokens (
                user_id TEXT PRIMARY KEY,
                access_token TEXT NOT NULL,
                refresh_token TEXT,
                expires_at INTEGER NOT NULL,
                scopes TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .map_err(storage_error)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert or replace the token set for a user.
    pub fn store_token(&self, user_id: &str, token_set: &TokenSet) -> Result<(), AuthError> {
        self.conn
            .lock()
            .execute(
                r#"
                INSERT OR REPLACE INTO google_tokens
                (user_id, access_token, refresh_token, expires_at, scopes, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    user_id,
                    token_set.access_token,
                    token_set.refresh_token,
                    token_set.expires_at,
                    token_set.scopes.join(" "),
                    Utc::now().timestamp(),
                ],
            )
            .map_err(storage_error)?;

        tracing::debug!(user = user_id, "Stored Google token");
        Ok(())
    }

    /// Fetch the token set for a user, if one is stored.
    pub fn retrieve_token(&self, user_id: &str) -> Result<Option<TokenSet>, AuthError> {
        self.conn
            .lock()
            .query_row(
                "SELECT access_token, refresh_token, expires_at, scopes FROM google_tokens WHERE user_id = ?1",
                params![user_id],
                |row| {
                    let scopes: String = row.get(3)?;
                    Ok(TokenSet {
                        access_token: row.get(0)?,
                        refresh_token: row.get(1)?,
                        expires_at: row.get(2)?,
                        scopes: scopes.split_whitespace().map(str::to_string).collect(),
                    })
                },
            )
            .optional()
            .map_err(storage_error)
    }

    /// Remove a user's tokens (account disconnected).
    pub fn delete_token(&self, user_id: &str) -> Result<(), AuthError> {
        self.conn
            .lock()
            .execute(
                "DELETE FROM google_tokens WHERE user_id = ?1",
                params![user_id],
            )
            .map_err(storage_error)?;
        Ok(())
    }
}

fn storage_error(err: rusqlite::Error) -> AuthError {
    AuthError::StorageError(err.into_database_error().to_string())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    fn token(expires_in: i64) -> TokenSet {
        TokenSet {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: Utc::now().timestamp() + expires_in,
            scopes: vec!["https://www.googleapis.com/auth/calendar".to_string()],
        }
    }

    #[test]
    fn test_token_expiry() {
        let expired = token(-3600);
        assert!(expired.is_expired());
        assert!(expired.needs_refresh());

        let valid = token(3600);
        assert!(!valid.is_expired());
        assert!(!valid.needs_refresh());

        let soon = token(200);
        assert!(!soon.is_expired());
        assert!(soon.needs_refresh());
    }

    #[test]
    fn test_store_and_retrieve() {
        let store = TokenStore::in_memory().unwrap();
        let set = token(3600);

        store.store_token("user-1", &set).unwrap();
        let loaded = store.retrieve_token("user-1").unwrap().unwrap();
        assert_eq!(loaded, set);

        assert!(store.retrieve_token("user-2").unwrap().is_none());
    }

    #[test]
    fn test_store_replaces_existing() {
        let store = TokenStore::in_memory().unwrap();
        store.store_token("user-1", &token(3600)).unwrap();

        let mut newer = token(7200);
        newer.access_token = "newer".to_string();
        store.store_token("user-1", &newer).unwrap();

        let loaded = store.retrieve_token("user-1").unwrap().unwrap();
        assert_eq!(loaded.access_token, "newer");
    }

    #[test]
    fn test_delete_token() {
        let store = TokenStore::in_memory().unwrap();
        store.store_token("user-1", &token(3600)).unwrap();
        store.delete_token("user-1").unwrap();
        assert!(store.retrieve_token("user-1").unwrap().is_none());
    }

    #[test]
    fn test_open_file_backed_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.db");

        {
            let store = TokenStore::open(&path).unwrap();
            store.store_token("user-1", &token(3600)).unwrap();
        }

        let reopened = TokenStore::open(&path).unwrap();
        assert!(reopened.retrieve_token("user-1").unwrap().is_some());
    }
}
