//! Client Configuration
//!
//! TOML configuration for the FileVault client, stored at
//! `<config_dir>/filevault/client.toml` unless `--config` names another file.

use anyhow::{Context, Result};
use filevault_sync::{
    ConnectionConfig, HttpConfig, ListViewConfig, SortDirection, SortKey, TypeFilter,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Client configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Server endpoints
    #[serde(default)]
    pub server: ServerConfig,

    /// Push-event connection
    #[serde(default)]
    pub connection: ConnectionSettings,

    /// Notice lifetime
    #[serde(default)]
    pub notifications: NotificationSettings,

    /// Default list view
    #[serde(default)]
    pub listing: ListingSettings,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// REST API root
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Socket.IO WebSocket endpoint
    #[serde(default = "default_events_url")]
    pub events_url: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Push-event connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Consecutive failed attempts before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts in milliseconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// WebSocket handshake timeout in seconds
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,

    /// Post a notice (and so refresh all views) after reconnecting
    #[serde(default = "default_true")]
    pub refresh_on_reconnect: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Seconds before a notice disappears
    #[serde(default = "default_notice_ttl")]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingSettings {
    /// filename, size or upload_date
    #[serde(default)]
    pub sort: SortKey,

    /// ascending or descending
    #[serde(default)]
    pub order: SortDirection,

    /// all, document, image, spreadsheet, archive or other
    #[serde(default = "default_type_filter")]
    pub type_filter: String,
}

fn default_api_url() -> String {
    "http://localhost:5000/api".to_string()
}

fn default_events_url() -> String {
    ConnectionConfig::default().events_url
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_handshake_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_notice_ttl() -> u64 {
    5
}

fn default_type_filter() -> String {
    "all".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            events_url: default_events_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay(),
            handshake_timeout_secs: default_handshake_timeout(),
            refresh_on_reconnect: default_true(),
        }
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_notice_ttl(),
        }
    }
}

impl Default for ListingSettings {
    fn default() -> Self {
        Self {
            sort: SortKey::default(),
            order: SortDirection::default(),
            type_filter: default_type_filter(),
        }
    }
}

impl Config {
    /// `<config_dir>/filevault/client.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("filevault")
            .join("client.toml")
    }

    /// Load configuration from file, creating default if not found
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);

        if config_path.exists() {
            let contents = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file {}", config_path.display())
            })?;
            let config: Config = toml::from_str(&contents).with_context(|| {
                format!("Failed to parse config file {}", config_path.display())
            })?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(&config_path)?;
            info!("Wrote default configuration to {}", config_path.display());
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    pub fn notice_ttl(&self) -> Duration {
        Duration::from_secs(self.notifications.ttl_secs)
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            events_url: self.server.events_url.clone(),
            max_attempts: self.connection.max_attempts,
            retry_delay: Duration::from_millis(self.connection.retry_delay_ms),
            handshake_timeout: Duration::from_secs(self.connection.handshake_timeout_secs),
            notice_ttl: self.notice_ttl(),
            refresh_on_reconnect: self.connection.refresh_on_reconnect,
        }
    }

    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            base_url: self.server.api_url.clone(),
            request_timeout: Duration::from_secs(self.server.request_timeout_secs),
            ..HttpConfig::default()
        }
    }

    /// Default list view from the `[listing]` section
    pub fn list_view(&self) -> Result<ListViewConfig> {
        let type_filter = self
            .listing
            .type_filter
            .parse::<TypeFilter>()
            .map_err(anyhow::Error::msg)
            .context("Invalid listing.type_filter")?;

        Ok(ListViewConfig {
            search_term: String::new(),
            type_filter,
            sort_key: self.listing.sort,
            sort_direction: self.listing.order,
        })
    }
}
