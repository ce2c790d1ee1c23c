//! Shared configuration for the ccpipes CLI.
//!
//! TOML profiles naming a relay endpoint and session, layered with
//! `CCPIPES_*` environment variables, and translation to
//! `ccpipes_core::EditorConfig` / `ccpipes_api::ReconnectConfig`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ccpipes_api::ReconnectConfig;
use ccpipes_core::EditorConfig;
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no profile named '{profile}'")]
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
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is given on the command line.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named relay profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::from([("default".into(), Profile::default())]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Seconds a request may stay unconfirmed.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    #[serde(default = "default_auto_resync")]
    pub auto_resync: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            request_timeout: default_request_timeout(),
            auto_resync: default_auto_resync(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_auto_resync() -> bool {
    true
}

/// A named relay endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// Relay WebSocket URL (e.g., "ws://localhost:3000").
    #[serde(default = "default_relay")]
    pub relay: String,

    /// Session to join on connect.
    pub session: Option<String>,

    /// Reconnect attempts before giving up. 0 retries forever.
    pub max_retries: Option<u32>,

    /// First reconnect delay in milliseconds.
    pub initial_delay_ms: Option<u64>,

    /// Reconnect delay ceiling in milliseconds.
    pub max_delay_ms: Option<u64>,

    /// Override `defaults.request_timeout`.
    pub request_timeout: Option<u64>,

    /// Override `defaults.auto_resync`.
    pub auto_resync: Option<bool>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            relay: default_relay(),
            session: None,
            max_retries: None,
            initial_delay_ms: None,
            max_delay_ms: None,
            request_timeout: None,
            auto_resync: None,
        }
    }
}

fn default_relay() -> String {
    "ws://localhost:3000".into()
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "ccpipes", "ccpipes").map_or_else(
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
    p.push("ccpipes");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Defaults, then the TOML file at `path`, then `CCPIPES_*` variables.
///
/// Nested keys use a double underscore: `CCPIPES_DEFAULTS__OUTPUT=json`.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("CCPIPES_").split("__"))
}

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = figment(path).extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Profile resolution ──────────────────────────────────────────────

/// Pick `name`, else the configured default, else `"default"`.
pub fn resolve_profile<'a>(
    cfg: &'a Config,
    name: Option<&'a str>,
) -> Result<(&'a str, &'a Profile), ConfigError> {
    let name = name
        .or(cfg.default_profile.as_deref())
        .unwrap_or("default");
    cfg.profiles
        .get(name)
        .map(|profile| (name, profile))
        .ok_or_else(|| ConfigError::UnknownProfile {
            profile: name.into(),
        })
}

/// Parse and check the profile's relay URL.
pub fn relay_url(profile: &Profile) -> Result<Url, ConfigError> {
    let url: Url = profile.relay.parse().map_err(|_| ConfigError::Validation {
        field: "relay".into(),
        reason: format!("invalid URL: {}", profile.relay),
    })?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ConfigError::Validation {
            field: "relay".into(),
            reason: format!("expected a ws:// or wss:// URL, got '{other}://'"),
        }),
    }
}

/// Build the editor settings for a profile, falling back to `defaults`.
pub fn profile_to_editor_config(profile: &Profile, defaults: &Defaults) -> EditorConfig {
    let timeout = profile.request_timeout.unwrap_or(defaults.request_timeout);
    EditorConfig {
        session_id: profile.session.clone(),
        request_timeout: Duration::from_secs(timeout),
        auto_resync: profile.auto_resync.unwrap_or(defaults.auto_resync),
        ..EditorConfig::default()
    }
}

/// Build the relay reconnect policy for a profile.
pub fn profile_to_reconnect_config(profile: &Profile) -> Result<ReconnectConfig, ConfigError> {
    let base = ReconnectConfig::default();
    let initial_delay = profile
        .initial_delay_ms
        .map_or(base.initial_delay, Duration::from_millis);
    let max_delay = profile
        .max_delay_ms
        .map_or(base.max_delay, Duration::from_millis);
    if initial_delay > max_delay {
        return Err(ConfigError::Validation {
            field: "initial_delay_ms".into(),
            reason: "must not exceed max_delay_ms".into(),
        });
    }
    let max_retries = match profile.max_retries {
        Some(0) => None,
        Some(n) => Some(n),
        None => base.max_retries,
    };
    Ok(ReconnectConfig {
        initial_delay,
        max_delay,
        max_retries,
    })
}
