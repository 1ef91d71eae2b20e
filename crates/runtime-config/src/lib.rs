//! Shared widget/CLI configuration types.
//!
//! Both `livechat-sync` and the `livechat` binary read `livechat.toml` using
//! these types. Every field carries a serde default, so a missing or partial
//! file always yields a usable configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Canonical config file name.
pub const CONFIG_FILE_NAME: &str = "livechat.toml";

/// Top-level widget configuration (persisted as `livechat.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WidgetConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub identity: IdentitySettings,
    #[serde(default)]
    pub polling: PollingSettings,
    #[serde(default)]
    pub notifications: NotificationSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Root of the chat API; endpoints such as `start/` hang off it.
    #[serde(default = "default_chat_url")]
    pub chat_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Retries for sends that never reached the server.
    #[serde(default = "default_max_send_retries")]
    pub max_send_retries: u32,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            chat_url: default_chat_url(),
            request_timeout_secs: default_request_timeout(),
            max_send_retries: default_max_send_retries(),
        }
    }
}

impl ServerSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IdentitySettings {
    #[serde(default)]
    pub site_id: String,
    /// Stable visitor identifier. Polling is idle until one is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visitor_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
        }
    }
}

impl PollingSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default = "default_true")]
    pub badge: bool,
    #[serde(default = "default_true")]
    pub preview: bool,
    #[serde(default = "default_preview_duration_ms")]
    pub preview_duration_ms: u64,
    #[serde(default = "default_true")]
    pub sound: bool,
    #[serde(default = "default_true")]
    pub os_notification: bool,
    /// Last known answer to the OS notification permission prompt.
    #[serde(default)]
    pub permission: NotificationPermission,
    #[serde(default)]
    pub badge_policy: BadgePolicy,
    #[serde(default = "default_notification_title")]
    pub title: String,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            badge: true,
            preview: true,
            preview_duration_ms: default_preview_duration_ms(),
            sound: true,
            os_notification: true,
            permission: NotificationPermission::default(),
            badge_policy: BadgePolicy::default(),
            title: default_notification_title(),
        }
    }
}

impl NotificationSettings {
    pub fn preview_duration(&self) -> Duration {
        Duration::from_millis(self.preview_duration_ms)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPermission {
    /// Never asked.
    #[default]
    Default,
    Granted,
    Denied,
}

impl NotificationPermission {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// How the unread badge grows when a cycle brings several agent messages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BadgePolicy {
    /// One per inbound message.
    #[default]
    PerMessage,
    /// One per poll cycle, however many messages arrived.
    PerBatch,
}

// ── Serde default functions ─────────────────────────────────────────────

fn default_true() -> bool {
    true
}

fn default_chat_url() -> String {
    "http://localhost:8000/api/chat".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_max_send_retries() -> u32 {
    2
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_preview_duration_ms() -> u64 {
    5_000
}

fn default_notification_title() -> String {
    "New message from agent".to_string()
}

// ── Load / save ─────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Load a config file. A missing file yields the defaults.
pub fn load_from(path: &Path) -> Result<WidgetConfig, ConfigError> {
    if !path.exists() {
        return Ok(WidgetConfig::default());
    }
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Write a config file, creating parent directories as needed.
pub fn save_to(path: &Path, config: &WidgetConfig) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;
    let write_err = |source| ConfigError::Write {
        path: path.display().to_string(),
        source,
    };
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(write_err)?;
    }
    std::fs::write(path, content).map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = WidgetConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("interval_ms = 1000"));
        assert!(toml_str.contains("preview_duration_ms = 5000"));
        assert!(toml_str.contains("badge_policy = \"per_message\""));
        assert!(toml_str.contains("permission = \"default\""));
        assert!(!toml_str.contains("visitor_id"));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: WidgetConfig = toml::from_str(
            r#"
            [identity]
            site_id = "site-1"
            visitor_id = "v-1"

            [notifications]
            sound = false
            badge_policy = "per_batch"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.identity.visitor_id.as_deref(), Some("v-1"));
        assert!(!parsed.notifications.sound);
        assert!(parsed.notifications.preview);
        assert_eq!(parsed.notifications.badge_policy, BadgePolicy::PerBatch);
        assert_eq!(parsed.polling.interval(), Duration::from_secs(1));
        assert_eq!(parsed.server.request_timeout_secs, 10);
    }

    #[test]
    fn zero_interval_is_clamped() {
        let polling = PollingSettings { interval_ms: 0 };
        assert_eq!(polling.interval(), Duration::from_millis(1));
    }

    #[test]
    fn save_then_load_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        assert!(load_from(&path).unwrap().identity.visitor_id.is_none());

        let mut config = WidgetConfig::default();
        config.identity.visitor_id = Some("abc".into());
        config.notifications.permission = NotificationPermission::Granted;
        save_to(&path, &config).unwrap();

        let loaded = load_from(&path).unwrap();
        assert_eq!(loaded.identity.visitor_id.as_deref(), Some("abc"));
        assert!(loaded.notifications.permission.is_granted());
    }

    #[test]
    fn parse_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[polling]\ninterval_ms = \"soon\"\n").unwrap();
        let err = load_from(&path).unwrap_err();
        assert!(err.to_string().contains(CONFIG_FILE_NAME));
    }
}
