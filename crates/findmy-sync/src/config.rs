//! # Agent Configuration
//!
//! Configuration management for the device agent.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     FINDMY_SERVER_URL=https://api.example.com                          │
//! │     FINDMY_POLL_INTERVAL_SECS=30                                       │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/findmy-agent/agent.toml (Linux)                          │
//! │     ~/Library/Application Support/com.demoody.findmy-agent/agent.toml  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The server URL here only seeds the persisted `server_url` key on first
//! run. After that the persisted value wins, so an operator can repoint a
//! device without touching its config file.
//!
//! ## Configuration File Format
//! ```toml
//! # agent.toml
//! [device]
//! name = "Warehouse tablet"
//! manufacturer = "Samsung"
//! model = "SM-T220"
//!
//! [server]
//! url = "https://api.findmydevice.demoody.com"
//! request_timeout_secs = 30
//!
//! [location]
//! interval_secs = 300
//! fresh_timeout_secs = 30
//! track_on_start = true
//!
//! [commands]
//! poll_interval_secs = 60
//! wipe_destructive = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use findmy_core::{
    ALARM_CEILING_MS, FRESH_LOCATION_TIMEOUT_SECS, FRESH_LOCATION_UPDATE_SECS,
    LOCATION_INTERVAL_SECS,
};

use crate::error::{SyncError, SyncResult};

/// Server used when neither config nor persisted state names one.
pub const DEFAULT_SERVER_URL: &str = "https://api.findmydevice.demoody.com";

const CONFIG_FILE_NAME: &str = "agent.toml";
const DATABASE_FILE_NAME: &str = "state.db";

// =============================================================================
// Device Settings
// =============================================================================

/// What the host reports about itself at registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Explicit device name. Derived from manufacturer + model when unset.
    #[serde(default)]
    pub name: Option<String>,

    /// Stable platform identifier, if the host has one.
    #[serde(default)]
    pub platform_id: Option<String>,

    #[serde(default = "default_manufacturer")]
    pub manufacturer: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_os_version")]
    pub os_version: String,
}

fn default_manufacturer() -> String {
    "Generic".to_string()
}

fn default_model() -> String {
    "Headless Agent".to_string()
}

fn default_os_version() -> String {
    std::env::consts::OS.to_string()
}

impl Default for DeviceSettings {
    fn default() -> Self {
        DeviceSettings {
            name: None,
            platform_id: None,
            manufacturer: default_manufacturer(),
            model: default_model(),
            os_version: default_os_version(),
        }
    }
}

// =============================================================================
// Server Settings
// =============================================================================

/// FindMy server connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Base URL of the FindMy API.
    #[serde(default = "default_server_url")]
    pub url: String,

    /// Fixed connect/read/write timeout for every request (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            url: default_server_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// =============================================================================
// Location Settings
// =============================================================================

/// A fixed position for hosts without a location source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StaticFix {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub accuracy_meters: Option<f64>,
}

/// Location reporting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationSettings {
    /// Reporting period (seconds).
    #[serde(default = "default_location_interval")]
    pub interval_secs: u64,

    /// Fresh-fix timeout (seconds).
    #[serde(default = "default_fresh_timeout")]
    pub fresh_timeout_secs: u64,

    /// Update interval requested for fresh fixes (seconds).
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,

    /// Turn tracking on at startup even if it was never enabled.
    #[serde(default)]
    pub track_on_start: bool,

    /// Fixed position served by the headless location provider.
    #[serde(default)]
    pub static_fix: Option<StaticFix>,
}

fn default_location_interval() -> u64 {
    LOCATION_INTERVAL_SECS
}

fn default_fresh_timeout() -> u64 {
    FRESH_LOCATION_TIMEOUT_SECS
}

fn default_update_interval() -> u64 {
    FRESH_LOCATION_UPDATE_SECS
}

impl Default for LocationSettings {
    fn default() -> Self {
        LocationSettings {
            interval_secs: default_location_interval(),
            fresh_timeout_secs: default_fresh_timeout(),
            update_interval_secs: default_update_interval(),
            track_on_start: false,
            static_fix: None,
        }
    }
}

// =============================================================================
// Command Settings
// =============================================================================

/// Command channel and executor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSettings {
    /// Interval between server polls (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Alarm auto-stop ceiling (seconds).
    #[serde(default = "default_alarm_ceiling")]
    pub alarm_ceiling_secs: u64,

    /// Actually erase the device on WIPE. Off by default: the command is
    /// acknowledged and flagged, nothing is erased.
    #[serde(default)]
    pub wipe_destructive: bool,
}

fn default_poll_interval() -> u64 {
    60
}

fn default_alarm_ceiling() -> u64 {
    ALARM_CEILING_MS / 1000
}

impl Default for CommandSettings {
    fn default() -> Self {
        CommandSettings {
            poll_interval_secs: default_poll_interval(),
            alarm_ceiling_secs: default_alarm_ceiling(),
            wipe_destructive: false,
        }
    }
}

// =============================================================================
// Storage & Audit Settings
// =============================================================================

/// Where persisted state lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite database path. Defaults to the platform data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

/// Security audit log for dropped inbound messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Audit events emitted per minute before further ones are suppressed.
    #[serde(default = "default_audit_rate")]
    pub max_per_minute: u32,
}

fn default_true() -> bool {
    true
}

fn default_audit_rate() -> u32 {
    10
}

impl Default for AuditSettings {
    fn default() -> Self {
        AuditSettings {
            enabled: true,
            max_per_minute: default_audit_rate(),
        }
    }
}

// =============================================================================
// Main Agent Configuration
// =============================================================================

/// Complete agent configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub device: DeviceSettings,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub location: LocationSettings,

    #[serde(default)]
    pub commands: CommandSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub audit: AuditSettings,
}

impl AgentConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (agent.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading agent config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load agent config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Agent config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        validate_server_url(&self.server.url)?;

        let positive = [
            ("server.request_timeout_secs", self.server.request_timeout_secs),
            ("location.interval_secs", self.location.interval_secs),
            ("location.fresh_timeout_secs", self.location.fresh_timeout_secs),
            ("location.update_interval_secs", self.location.update_interval_secs),
            ("commands.poll_interval_secs", self.commands.poll_interval_secs),
            ("commands.alarm_ceiling_secs", self.commands.alarm_ceiling_secs),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(SyncError::InvalidConfig(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        if self.audit.enabled && self.audit.max_per_minute == 0 {
            return Err(SyncError::InvalidConfig(
                "audit.max_per_minute must be greater than 0 when audit is enabled".into(),
            ));
        }

        if let Some(fix) = self.location.static_fix {
            if !(-90.0..=90.0).contains(&fix.lat) || !(-180.0..=180.0).contains(&fix.lng) {
                return Err(SyncError::InvalidConfig(
                    "location.static_fix is outside valid coordinates".into(),
                ));
            }
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any variable source.
    fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("FINDMY_SERVER_URL") {
            debug!(url = %url, "Overriding server URL from environment");
            self.server.url = url;
        }

        if let Some(name) = lookup("FINDMY_DEVICE_NAME") {
            self.device.name = Some(name);
        }

        if let Some(id) = lookup("FINDMY_PLATFORM_ID") {
            self.device.platform_id = Some(id);
        }

        if let Some(path) = lookup("FINDMY_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.storage.database_path = Some(PathBuf::from(path));
        }

        if let Some(secs) = lookup("FINDMY_POLL_INTERVAL_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.commands.poll_interval_secs = s,
                Err(_) => warn!(value = %secs, "Ignoring invalid FINDMY_POLL_INTERVAL_SECS"),
            }
        }

        if let Some(flag) = lookup("FINDMY_WIPE_DESTRUCTIVE") {
            match parse_flag(&flag) {
                Some(v) => self.commands.wipe_destructive = v,
                None => warn!(value = %flag, "Ignoring invalid FINDMY_WIPE_DESTRUCTIVE"),
            }
        }

        if let Some(flag) = lookup("FINDMY_TRACK_ON_START") {
            match parse_flag(&flag) {
                Some(v) => self.location.track_on_start = v,
                None => warn!(value = %flag, "Ignoring invalid FINDMY_TRACK_ON_START"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "demoody", "findmy-agent")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Resolved database path: configured, else the platform data dir,
    /// else the working directory.
    pub fn database_path(&self) -> PathBuf {
        self.storage.database_path.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("com", "demoody", "findmy-agent")
                .map(|dirs| dirs.data_dir().join(DATABASE_FILE_NAME))
                .unwrap_or_else(|| PathBuf::from(DATABASE_FILE_NAME))
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    pub fn location_interval(&self) -> Duration {
        Duration::from_secs(self.location.interval_secs)
    }

    pub fn fresh_location_timeout(&self) -> Duration {
        Duration::from_secs(self.location.fresh_timeout_secs)
    }

    pub fn fresh_update_interval(&self) -> Duration {
        Duration::from_secs(self.location.update_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.commands.poll_interval_secs)
    }

    pub fn alarm_ceiling(&self) -> Duration {
        Duration::from_secs(self.commands.alarm_ceiling_secs)
    }
}

/// Checks that a server URL parses and uses http or https.
pub fn validate_server_url(raw: &str) -> SyncResult<Url> {
    let url = Url::parse(raw)?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(SyncError::InvalidUrl(format!(
                "Server URL must use http:// or https://, got {}://",
                other
            )))
        }
    }
    if url.host_str().is_none() {
        return Err(SyncError::InvalidUrl(format!(
            "Server URL has no host: {}",
            raw
        )));
    }
    Ok(url)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = AgentConfig::default();
        assert_eq!(config.server.url, DEFAULT_SERVER_URL);
        assert_eq!(config.server.request_timeout_secs, 30);
        assert_eq!(config.location.interval_secs, 300);
        assert_eq!(config.location.fresh_timeout_secs, 30);
        assert_eq!(config.location.update_interval_secs, 10);
        assert_eq!(config.commands.alarm_ceiling_secs, 120);
        assert!(!config.commands.wipe_destructive);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AgentConfig::default();

        config.server.url = "ftp://example.com".into();
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        config.server.url = "not a url".into();
        assert!(config.validate().is_err());

        config.server.url = "http://127.0.0.1:8080".into();
        assert!(config.validate().is_ok());

        config.commands.poll_interval_secs = 0;
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));
        config.commands.poll_interval_secs = 60;

        config.location.static_fix = Some(StaticFix {
            lat: 120.0,
            lng: 0.0,
            accuracy_meters: None,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("FINDMY_SERVER_URL", "http://10.0.0.2:9000"),
            ("FINDMY_POLL_INTERVAL_SECS", "15"),
            ("FINDMY_WIPE_DESTRUCTIVE", "yes"),
            ("FINDMY_DB_PATH", "/tmp/findmy.db"),
            ("FINDMY_TRACK_ON_START", "maybe"),
        ]
        .into_iter()
        .collect();

        let mut config = AgentConfig::default();
        config.apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.server.url, "http://10.0.0.2:9000");
        assert_eq!(config.commands.poll_interval_secs, 15);
        assert!(config.commands.wipe_destructive);
        assert_eq!(config.database_path(), PathBuf::from("/tmp/findmy.db"));
        // Unparseable flags leave the default alone
        assert!(!config.location.track_on_start);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: AgentConfig = toml::from_str(
            r#"
            [device]
            manufacturer = "Samsung"
            model = "SM-T220"

            [commands]
            wipe_destructive = true

            [location.static_fix]
            lat = 52.52
            lng = 13.405
            "#,
        )
        .unwrap();

        assert_eq!(config.device.model, "SM-T220");
        assert!(config.commands.wipe_destructive);
        assert_eq!(config.commands.poll_interval_secs, 60);
        assert_eq!(config.server.url, DEFAULT_SERVER_URL);
        assert_eq!(config.location.static_fix.unwrap().lat, 52.52);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");

        let mut config = AgentConfig::default();
        config.server.url = "http://127.0.0.1:8080".into();
        config.commands.alarm_ceiling_secs = 90;
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[server]"));
        assert!(contents.contains("[commands]"));

        let parsed: AgentConfig = toml::from_str(&contents).unwrap();
        assert_eq!(parsed.commands.alarm_ceiling_secs, 90);
    }
}
