use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use tether_auth::{GoogleOAuth2Provider, GoogleTokenManager, SessionVerifier, TokenStore};
use tether_calendar::{
    CalendarCache, CalendarError, CalendarProvider, EventMutator, GoogleCalendarClient,
    ProviderSource, SharedCache, SyncService, SyncSettings,
};
use tether_core::{AuthError, Config};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub verifier: Arc<SessionVerifier>,
    pub tokens: Arc<GoogleTokenManager>,
    pub providers: Arc<dyn ProviderSource>,
    pub cache: SharedCache,
    pub sync: Arc<SyncService>,
    pub mutator: Arc<EventMutator>,
}

impl AppState {
    /// Wire up the production state: SQLite at `database.path`, Google as
    /// the remote calendar.
    pub fn from_config(config: Config) -> Result<Self> {
        let db_path = &config.database.path;
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let cache = CalendarCache::open(db_path)
            .context("Failed to open calendar cache")?
            .shared();
        let store = Arc::new(TokenStore::open(db_path).context("Failed to open token store")?);

        let oauth = if config.google.is_configured() {
            Some(GoogleOAuth2Provider::new(&config.google)?)
        } else {
            tracing::warn!("Google OAuth client not configured; tokens will not be refreshed");
            None
        };
        let tokens = Arc::new(GoogleTokenManager::new(store, oauth));

        let http = GoogleCalendarClient::http_client(Duration::from_secs(
            config.google.request_timeout_secs,
        ))?;
        let providers = Arc::new(GoogleProviderSource {
            tokens: tokens.clone(),
            http,
            base_url: config.google.api_base_url.clone(),
            page_size: config.sync.page_size,
        });

        Ok(Self::new(config, cache, tokens, providers))
    }

    pub fn new(
        config: Config,
        cache: SharedCache,
        tokens: Arc<GoogleTokenManager>,
        providers: Arc<dyn ProviderSource>,
    ) -> Self {
        let settings = SyncSettings {
            cooldown_secs: config.sync.cooldown_secs,
            past_days: i64::from(config.sync.past_days),
            future_days: i64::from(config.sync.future_days),
            delete_missing: config.sync.delete_missing,
            max_window_days: config.sync.max_window_days,
        };

        Self {
            verifier: Arc::new(SessionVerifier::new(&config.auth)),
            sync: Arc::new(SyncService::new(cache.clone(), settings)),
            mutator: Arc::new(EventMutator::new(cache.clone())),
            config: Arc::new(config),
            tokens,
            providers,
            cache,
        }
    }
}

/// Builds a Google Calendar client per request from the user's stored token.
pub struct GoogleProviderSource {
    tokens: Arc<GoogleTokenManager>,
    http: reqwest::Client,
    base_url: String,
    page_size: u32,
}

#[async_trait]
impl ProviderSource for GoogleProviderSource {
    async fn provider_for(&self, user_id: &str) -> Result<Arc<dyn CalendarProvider>, CalendarError> {
        let token = self
            .tokens
            .access_token(user_id)
            .await
            .map_err(auth_to_calendar_error)?;

        let client: Arc<dyn CalendarProvider> = Arc::new(
            GoogleCalendarClient::with_http_client(self.http.clone(), &token, &self.base_url)
                .with_page_size(self.page_size),
        );
        Ok(client)
    }
}

fn auth_to_calendar_error(err: AuthError) -> CalendarError {
    match err {
        AuthError::TokenNotFound(_) => CalendarError::AuthRequired,
        AuthError::StorageError(msg) => CalendarError::CacheError(msg),
        other => {
            tracing::debug!(error = %other, "Google token unavailable");
            CalendarError::TokenExpired
        }
    }
}
