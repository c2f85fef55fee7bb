//! Shared configuration for Kelmah client applications.
//!
//! TOML profiles layered with environment overrides, translation to
//! [`kelmah_core::ClientConfig`], and a keyring-backed
//! [`TokenStore`](kelmah_api::TokenStore) so sessions survive restarts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use kelmah_api::{DEFAULT_REFRESH_PATH, TlsMode, TokenStore};
use kelmah_core::{ClientConfig, QueryOptions};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const KEYRING_SERVICE: &str = "kelmah";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("unknown profile '{profile}'")]
    UnknownProfile { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named.
    pub default_profile: Option<String>,

    /// Global defaults, overridable per profile.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named backend profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up a profile by name, falling back to `default_profile`.
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_transport_timeout_ms")]
    pub transport_timeout_ms: u64,

    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            transport_timeout_ms: default_transport_timeout_ms(),
            query_timeout_ms: default_query_timeout_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

fn default_transport_timeout_ms() -> u64 {
    8_000
}
fn default_query_timeout_ms() -> u64 {
    10_000
}
fn default_cache_ttl_secs() -> u64 {
    60
}
fn default_retry_max_attempts() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    400
}
fn default_retry_max_delay_ms() -> u64 {
    8_000
}
fn default_poll_interval_secs() -> u64 {
    15
}

/// A named backend profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// API base URL (e.g., "https://api.kelmah.com/api").
    pub api_url: String,

    /// Token refresh endpoint relative to `api_url`.
    pub refresh_path: Option<String>,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Accept invalid certificates (local backends only).
    pub insecure: Option<bool>,

    pub transport_timeout_ms: Option<u64>,
    pub query_timeout_ms: Option<u64>,
    pub cache_ttl_secs: Option<u64>,
    pub retry_max_attempts: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub retry_max_delay_ms: Option<u64>,
    pub poll_interval_secs: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "kelmah", "kelmah").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("kelmah");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file. A missing file yields the defaults.
///
/// Environment variables use `__` between levels, for example
/// `KELMAH_DEFAULTS__QUERY_TIMEOUT_MS=15000`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("KELMAH_").split("__"));

    let config: Config = figment.extract()?;
    debug!(path = %path.display(), profiles = config.profiles.len(), "config loaded");
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(&config_path(), cfg)
}

pub fn save_config_to(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Profile → ClientConfig ──────────────────────────────────────────

/// Build a validated `ClientConfig` from a profile and the global defaults.
pub fn profile_to_client_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<ClientConfig, ConfigError> {
    let url: url::Url = profile.api_url.parse().map_err(|_| ConfigError::Validation {
        field: "api_url".into(),
        reason: format!("invalid URL: {}", profile.api_url),
    })?;

    let mut config = ClientConfig::new(url);

    config.transport.tls = if profile.insecure.unwrap_or(false) {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };
    config.transport.timeout = Duration::from_millis(
        profile
            .transport_timeout_ms
            .unwrap_or(defaults.transport_timeout_ms),
    );

    config.query = QueryOptions {
        timeout: Duration::from_millis(
            profile.query_timeout_ms.unwrap_or(defaults.query_timeout_ms),
        ),
        ttl: Duration::from_secs(profile.cache_ttl_secs.unwrap_or(defaults.cache_ttl_secs)),
    };

    config.retry.max_attempts = profile
        .retry_max_attempts
        .unwrap_or(defaults.retry_max_attempts);
    config.retry.base_delay = Duration::from_millis(
        profile
            .retry_base_delay_ms
            .unwrap_or(defaults.retry_base_delay_ms),
    );
    config.retry.max_delay = Duration::from_millis(
        profile
            .retry_max_delay_ms
            .unwrap_or(defaults.retry_max_delay_ms),
    );

    config.poll_interval = Duration::from_secs(
        profile
            .poll_interval_secs
            .unwrap_or(defaults.poll_interval_secs),
    );
    config.refresh_path = profile
        .refresh_path
        .clone()
        .unwrap_or_else(|| DEFAULT_REFRESH_PATH.to_owned());

    config.validate().map_err(|e| ConfigError::Validation {
        field: "profile".into(),
        reason: e.to_string(),
    })?;

    Ok(config)
}

// ── Keyring token store ─────────────────────────────────────────────

/// Session tokens persisted in the OS keyring under service `kelmah`.
pub struct KeyringTokenStore {
    access: keyring::Entry,
    refresh: keyring::Entry,
}

impl KeyringTokenStore {
    pub fn new(profile_name: &str) -> Result<Self, kelmah_api::Error> {
        Ok(Self {
            access: entry(&format!("{profile_name}/access-token"))?,
            refresh: entry(&format!("{profile_name}/refresh-token"))?,
        })
    }
}

fn entry(user: &str) -> Result<keyring::Entry, kelmah_api::Error> {
    keyring::Entry::new(KEYRING_SERVICE, user).map_err(keyring_error)
}

fn keyring_error(err: keyring::Error) -> kelmah_api::Error {
    kelmah_api::Error::TokenStore(err.to_string())
}

fn read(entry: &keyring::Entry) -> Result<Option<SecretString>, kelmah_api::Error> {
    match entry.get_password() {
        Ok(secret) => Ok(Some(SecretString::from(secret))),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(keyring_error(e)),
    }
}

fn remove(entry: &keyring::Entry) -> Result<(), kelmah_api::Error> {
    match entry.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(keyring_error(e)),
    }
}

impl TokenStore for KeyringTokenStore {
    fn access_token(&self) -> Result<Option<SecretString>, kelmah_api::Error> {
        read(&self.access)
    }

    fn refresh_token(&self) -> Result<Option<SecretString>, kelmah_api::Error> {
        read(&self.refresh)
    }

    fn set_access_token(&self, token: SecretString) -> Result<(), kelmah_api::Error> {
        self.access
            .set_password(token.expose_secret())
            .map_err(keyring_error)
    }

    fn set_refresh_token(&self, token: SecretString) -> Result<(), kelmah_api::Error> {
        self.refresh
            .set_password(token.expose_secret())
            .map_err(keyring_error)
    }

    fn clear(&self) -> Result<(), kelmah_api::Error> {
        remove(&self.access)?;
        remove(&self.refresh)
    }
}
