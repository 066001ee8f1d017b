//! Configuration loading and validation.
//!
//! Supports JSON5 format. Config location: `~/.cardfile/cardfile.json`,
//! overridable with `CARDFILE_STATE_DIR`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default access-token expiry in minutes.
const DEFAULT_ACCESS_EXPIRY_MINUTES: u64 = 15;
/// Default refresh-token expiry in days.
const DEFAULT_REFRESH_EXPIRY_DAYS: u64 = 7;
/// Default confirmation-token expiry in hours (long enough to survive inbox delay).
const DEFAULT_CONFIRM_EXPIRY_HOURS: u64 = 72;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON5 parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] json5::Error),

    /// Config validation error.
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Authentication configuration.
    #[serde(default)]
    pub auth: AuthSettings,

    /// Rate-limit policy.
    #[serde(default)]
    pub limits: RateLimitSettings,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Missing file yields defaults rather than an error.
    ///
    /// # Errors
    ///
    /// Returns error if an existing config cannot be read or parsed.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a path.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the file write fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        Self::state_dir().join("cardfile.json")
    }

    /// Get the Cardfile state directory.
    ///
    /// Uses `CARDFILE_STATE_DIR` env var if set, otherwise `~/.cardfile`.
    #[must_use]
    pub fn state_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("CARDFILE_STATE_DIR") {
            PathBuf::from(dir)
        } else if let Some(home) = dirs::home_dir() {
            home.join(".cardfile")
        } else {
            PathBuf::from(".cardfile")
        }
    }

    /// Validate the loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns error when token lifetimes violate the class separation
    /// invariant (refresh must outlive access by at least an order of
    /// magnitude) or the server port is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("server port must be nonzero".into()));
        }
        self.auth.validate()
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bind address.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Enable CORS.
    #[serde(default = "default_true")]
    pub cors: bool,

    /// Data directory for persistent storage.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_port() -> u16 {
    8000
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    Config::state_dir().join("data")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            cors: default_true(),
            data_dir: default_data_dir(),
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSettings {
    /// JWT signing secret (hex-encoded). Auto-generated if not set.
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// Access-token expiry in minutes.
    #[serde(default = "default_access_expiry")]
    pub access_expiry_minutes: u64,

    /// Refresh-token expiry in days.
    #[serde(default = "default_refresh_expiry")]
    pub refresh_expiry_days: u64,

    /// Confirmation-token expiry in hours.
    #[serde(default = "default_confirm_expiry")]
    pub confirm_expiry_hours: u64,
}

fn default_access_expiry() -> u64 {
    DEFAULT_ACCESS_EXPIRY_MINUTES
}

fn default_refresh_expiry() -> u64 {
    DEFAULT_REFRESH_EXPIRY_DAYS
}

fn default_confirm_expiry() -> u64 {
    DEFAULT_CONFIRM_EXPIRY_HOURS
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            access_expiry_minutes: default_access_expiry(),
            refresh_expiry_days: default_refresh_expiry(),
            confirm_expiry_hours: default_confirm_expiry(),
        }
    }
}

impl AuthSettings {
    /// Create a new auth settings builder.
    #[must_use]
    pub fn builder() -> AuthSettingsBuilder {
        AuthSettingsBuilder::default()
    }

    /// Access-token expiry as a Duration.
    #[must_use]
    pub const fn access_expiry(&self) -> Duration {
        Duration::from_secs(self.access_expiry_minutes * 60)
    }

    /// Refresh-token expiry as a Duration.
    #[must_use]
    pub const fn refresh_expiry(&self) -> Duration {
        Duration::from_secs(self.refresh_expiry_days * 24 * 3600)
    }

    /// Confirmation-token expiry as a Duration.
    #[must_use]
    pub const fn confirm_expiry(&self) -> Duration {
        Duration::from_secs(self.confirm_expiry_hours * 3600)
    }

    /// Load settings overrides from environment variables.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(secret) = std::env::var("CARDFILE_JWT_SECRET") {
            if !secret.is_empty() {
                self.jwt_secret = Some(secret);
            }
        }
        self
    }

    /// Validate token lifetimes.
    ///
    /// The refresh class must outlive the access class by at least an order
    /// of magnitude; a refresh token short enough to be mistaken for an
    /// access token defeats the class separation.
    ///
    /// # Errors
    ///
    /// Returns error when either expiry is zero or the ratio is below 10x.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_expiry_minutes == 0 {
            return Err(ConfigError::Validation(
                "access-token expiry must be nonzero".into(),
            ));
        }
        let access = self.access_expiry().as_secs();
        let refresh = self.refresh_expiry().as_secs();
        if refresh < access * 10 {
            return Err(ConfigError::Validation(
                "refresh-token expiry must exceed access-token expiry by at least 10x".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`AuthSettings`].
#[derive(Debug, Default)]
pub struct AuthSettingsBuilder {
    settings: AuthSettings,
}

impl AuthSettingsBuilder {
    /// Set the JWT secret (hex-encoded).
    #[must_use]
    pub fn jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.settings.jwt_secret = Some(secret.into());
        self
    }

    /// Set access-token expiry in minutes.
    #[must_use]
    pub const fn access_expiry_minutes(mut self, minutes: u64) -> Self {
        self.settings.access_expiry_minutes = minutes;
        self
    }

    /// Set refresh-token expiry in days.
    #[must_use]
    pub const fn refresh_expiry_days(mut self, days: u64) -> Self {
        self.settings.refresh_expiry_days = days;
        self
    }

    /// Set confirmation-token expiry in hours.
    #[must_use]
    pub const fn confirm_expiry_hours(mut self, hours: u64) -> Self {
        self.settings.confirm_expiry_hours = hours;
        self
    }

    /// Build the settings.
    #[must_use]
    pub fn build(self) -> AuthSettings {
        self.settings
    }
}

/// Rate-limit policy for gated routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSettings {
    /// Allowed requests per window on authentication routes.
    #[serde(default = "default_auth_requests")]
    pub auth_requests: u32,

    /// Window length in seconds for authentication routes.
    #[serde(default = "default_auth_window")]
    pub auth_window_seconds: u64,

    /// Allowed requests per window on contact routes.
    #[serde(default = "default_contact_requests")]
    pub contact_requests: u32,

    /// Window length in seconds for contact routes.
    #[serde(default = "default_contact_window")]
    pub contact_window_seconds: u64,

    /// Coarse per-client ceiling in requests per minute, applied in front of
    /// every route.
    #[serde(default = "default_client_rpm")]
    pub client_requests_per_minute: u32,
}

fn default_auth_requests() -> u32 {
    5
}

fn default_auth_window() -> u64 {
    60
}

fn default_contact_requests() -> u32 {
    2
}

fn default_contact_window() -> u64 {
    5
}

fn default_client_rpm() -> u32 {
    100
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            auth_requests: default_auth_requests(),
            auth_window_seconds: default_auth_window(),
            contact_requests: default_contact_requests(),
            contact_window_seconds: default_contact_window(),
            client_requests_per_minute: default_client_rpm(),
        }
    }
}

impl RateLimitSettings {
    /// Auth-route window as a Duration.
    #[must_use]
    pub const fn auth_window(&self) -> Duration {
        Duration::from_secs(self.auth_window_seconds)
    }

    /// Contact-route window as a Duration.
    #[must_use]
    pub const fn contact_window(&self) -> Duration {
        Duration::from_secs(self.contact_window_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.auth.access_expiry_minutes, 15);
        assert_eq!(config.auth.refresh_expiry_days, 7);
    }

    #[test]
    fn class_separation_enforced() {
        let settings = AuthSettings::builder()
            .access_expiry_minutes(60 * 24 * 7) // one week
            .refresh_expiry_days(7)
            .build();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn durations() {
        let settings = AuthSettings::default();
        assert_eq!(settings.access_expiry(), Duration::from_secs(15 * 60));
        assert_eq!(settings.refresh_expiry(), Duration::from_secs(7 * 24 * 3600));
        assert_eq!(settings.confirm_expiry(), Duration::from_secs(72 * 3600));
    }

    #[test]
    fn parses_json5_with_partial_fields() {
        let raw = r"{ server: { port: 9000 }, auth: { accessExpiryMinutes: 5 } }";
        let config: Config = json5::from_str(raw).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.auth.access_expiry_minutes, 5);
        // Untouched fields keep defaults.
        assert_eq!(config.auth.refresh_expiry_days, 7);
        assert_eq!(config.limits.contact_requests, 2);
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cardfile.json");

        let mut config = Config::default();
        config.server.port = 9999;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.server.port, 9999);
    }
}
