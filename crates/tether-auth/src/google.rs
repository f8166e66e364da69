//! Google OAuth2 token refresh and per-user access token lookup.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use tether_core::error::ReqwestErrorExt;
use tether_core::{AuthError, GoogleConfig};

use crate::storage::{TokenSet, TokenStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleTokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
}

impl GoogleTokenResponse {
    /// Unix expiry for a token issued at `now`, or `None` if `expires_in`
    /// does not fit.
    pub fn expires_at(&self, now: i64) -> Option<i64> {
        i64::try_from(self.expires_in)
            .ok()
            .and_then(|secs| now.checked_add(secs))
    }

    /// Build a token set, keeping `previous_refresh` when Google omits a new one.
    pub fn into_token_set(self, previous_refresh: Option<String>) -> Result<TokenSet, AuthError> {
        let expires_at = self.expires_at(Utc::now().timestamp()).ok_or_else(|| {
            AuthError::RefreshFailed(format!("token lifetime out of range: {}", self.expires_in))
        })?;

        Ok(TokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at,
            scopes: self.scope.split_whitespace().map(str::to_string).collect(),
        })
    }
}

pub struct GoogleOAuth2Provider {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    token_url: String,
}

impl GoogleOAuth2Provider {
    pub fn new(config: &GoogleConfig) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AuthError::RefreshFailed(e.into_network_error().to_string()))?;

        Ok(Self {
            client,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token_url: config.token_url.clone(),
        })
    }

    /// Refresh an expired access token.
    #[tracing::instrument(skip(self, refresh_token), level = "info")]
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<GoogleTokenResponse, AuthError> {
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| AuthError::RefreshFailed(e.into_network_error().to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AuthError::RefreshFailed(format!("{}: {}", status, error_text)));
        }

        response
            .json::<GoogleTokenResponse>()
            .await
            .map_err(|e| AuthError::RefreshFailed(format!("Failed to parse refresh response: {}", e)))
    }
}

/// Hands out valid Google access tokens for users, refreshing stale ones.
pub struct GoogleTokenManager {
    store: Arc<TokenStore>,
    oauth: Option<GoogleOAuth2Provider>,
}

impl GoogleTokenManager {
    /// `oauth` is `None` when client credentials are not configured; stale
    /// tokens then surface as `TokenExpired`.
    pub fn new(store: Arc<TokenStore>, oauth: Option<GoogleOAuth2Provider>) -> Self {
        Self { store, oauth }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Persist tokens handed over by the client after the Google sign-in.
    pub fn connect(&self, user_id: &str, response: GoogleTokenResponse) -> Result<TokenSet, AuthError> {
        let previous_refresh = self
            .store
            .retrieve_token(user_id)?
            .and_then(|t| t.refresh_token);
        let token_set = response.into_token_set(previous_refresh)?;
        self.store.store_token(user_id, &token_set)?;
        tracing::info!(user = user_id, "Connected Google account");
        Ok(token_set)
    }

    /// Return a usable access token for `user_id`.
    pub async fn access_token(&self, user_id: &str) -> Result<String, AuthError> {
        let token_set = self
            .store
            .retrieve_token(user_id)?
            .ok_or_else(|| AuthError::TokenNotFound(user_id.to_string()))?;

        if !token_set.needs_refresh() {
            return Ok(token_set.access_token);
        }

        let (Some(oauth), Some(refresh_token)) = (&self.oauth, token_set.refresh_token.as_deref())
        else {
            if token_set.is_expired() {
                return Err(AuthError::TokenExpired);
            }
            return Ok(token_set.access_token);
        };

        tracing::debug!(user = user_id, "Refreshing Google access token");
        let refreshed = oauth
            .refresh_token(refresh_token)
            .await?
            .into_token_set(token_set.refresh_token.clone())?;
        self.store.store_token(user_id, &refreshed)?;

        Ok(refreshed.access_token)
    }
}
