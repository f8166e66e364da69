use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Environment variable pointing at an explicit config file.
pub const CONFIG_PATH_ENV: &str = "TETHER_CONFIG";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub google: GoogleConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub availability: AvailabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP API binds to
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file holding the calendar cache, profiles and OAuth tokens
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_data_dir().join("tether.db"),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Supabase JWT secret (HS256). Usually supplied via `TETHER_JWT_SECRET`.
    #[serde(default)]
    pub jwt_secret: String,

    /// Expected `aud` claim
    #[serde(default = "default_jwt_audience")]
    pub jwt_audience: String,
}

fn default_jwt_audience() -> String {
    "authenticated".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_audience: default_jwt_audience(),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_audience", &self.jwt_audience)
            .finish()
    }
}

/// Google OAuth and Calendar API settings
#[derive(Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    #[serde(default = "default_google_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_google_token_url")]
    pub token_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_google_api_base_url() -> String {
    "https://www.googleapis.com/calendar/v3".to_string()
}

fn default_google_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_request_timeout_secs() -> u64 {
    20
}

impl GoogleConfig {
    /// Check if OAuth credentials are configured (not placeholders)
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty()
            && !self.client_secret.is_empty()
            && !self.client_id.starts_with("YOUR_")
            && !self.client_secret.starts_with("YOUR_")
    }
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: "YOUR_GOOGLE_CLIENT_ID".to_string(),
            client_secret: "YOUR_GOOGLE_CLIENT_SECRET".to_string(),
            api_base_url: default_google_api_base_url(),
            token_url: default_google_token_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for GoogleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url)
            .field("token_url", &self.token_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Minimum seconds between two syncs for the same user
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Days before today included in the default sync window
    #[serde(default = "default_past_days")]
    pub past_days: u32,

    /// Days after today included in the default sync window
    #[serde(default = "default_future_days")]
    pub future_days: u32,

    /// Delete cached events that the remote no longer returns for the window
    #[serde(default = "default_delete_missing")]
    pub delete_missing: bool,

    /// Events requested per remote page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Longest explicit window a client may request, in days
    #[serde(default = "default_max_window_days")]
    pub max_window_days: u32,
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_past_days() -> u32 {
    7
}

fn default_future_days() -> u32 {
    60
}

fn default_delete_missing() -> bool {
    true
}

fn default_page_size() -> u32 {
    250
}

fn default_max_window_days() -> u32 {
    366
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            past_days: default_past_days(),
            future_days: default_future_days(),
            delete_missing: default_delete_missing(),
            page_size: default_page_size(),
            max_window_days: default_max_window_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityConfig {
    /// Longest date range a single availability query may cover
    #[serde(default = "default_max_range_days")]
    pub max_range_days: u32,
}

fn default_max_range_days() -> u32 {
    62
}

impl Default for AvailabilityConfig {
    fn default() -> Self {
        Self {
            max_range_days: default_max_range_days(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tether")
}

impl Config {
    /// Load configuration from `$TETHER_CONFIG` or the default location,
    /// creating a default file if none exists, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from an explicit file path.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            tracing::info!("Wrote default config to {}", config_path.display());
            return Ok(config);
        }

        let contents =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;

        toml::from_str(&contents).context("Failed to parse config file")
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Overlay secrets and deployment settings from the environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup("TETHER_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(client_id) = lookup("GOOGLE_CLIENT_ID") {
            self.google.client_id = client_id;
        }
        if let Some(client_secret) = lookup("GOOGLE_CLIENT_SECRET") {
            self.google.client_secret = client_secret;
        }
        if let Some(addr) = lookup("TETHER_BIND_ADDR") {
            self.server.bind_addr = addr;
        }
        if let Some(path) = lookup("TETHER_DATABASE_PATH") {
            self.database.path = PathBuf::from(path);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.server.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            result.add_error(
                "server.bind_addr",
                format!("Not a socket address: {}", self.server.bind_addr),
            );
        }

        if self.auth.jwt_secret.is_empty() {
            result.add_error(
                "auth.jwt_secret",
                "JWT secret is not set (use TETHER_JWT_SECRET)",
            );
        } else if self.auth.jwt_secret.len() < 32 {
            result.add_warning("auth.jwt_secret", "JWT secret is shorter than 32 bytes");
        }

        Self::validate_url(&self.google.api_base_url, "google.api_base_url", &mut result);
        Self::validate_url(&self.google.token_url, "google.token_url", &mut result);

        if !self.google.is_configured() {
            result.add_warning(
                "google",
                "Google OAuth not configured - expired tokens cannot be refreshed",
            );
        }

        if self.google.request_timeout_secs == 0 {
            result.add_error("google.request_timeout_secs", "Timeout must be greater than 0");
        }

        if self.sync.cooldown_secs == 0 {
            result.add_warning("sync.cooldown_secs", "Sync cooldown disabled (0 seconds)");
        }
        if self.sync.past_days == 0 && self.sync.future_days == 0 {
            result.add_error("sync", "Default sync window is empty");
        }
        if self.sync.page_size == 0 || self.sync.page_size > 2500 {
            result.add_error("sync.page_size", "Page size must be between 1 and 2500");
        }
        if self.sync.max_window_days == 0 {
            result.add_error("sync.max_window_days", "Maximum window must be at least one day");
        }

        if self.availability.max_range_days == 0 {
            result.add_error(
                "availability.max_range_days",
                "Maximum range must be at least one day",
            );
        }

        result
    }

    fn validate_url(url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }
                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("tether");

        Ok(config_dir.join("config.toml"))
    }
}
