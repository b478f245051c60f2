//! Configuration loading and typed config structures for the pipeline.
//!
//! The canonical configuration lives in `pterobot.yaml`. This module defines
//! strongly-typed structs that mirror the YAML structure, applies
//! environment overrides for the deployment-specific values, and validates
//! the result. Every field has a default, so an empty file is a valid
//! starting point (validation still requires an audit channel).
//!
//! Secrets (panel API key, bot token) are deliberately absent: they are
//! read from the environment by the runner and never touch this struct.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pterobot_types::{ChannelId, PlatformUserId};
use serde::Deserialize;
use tracing::warn;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is not usable.
    #[error("invalid config: {0}")]
    Invalid(String),

    /// A required environment variable is missing.
    #[error("missing required env var {name}")]
    MissingEnv {
        /// Variable name.
        name: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level pipeline configuration.
///
/// Mirrors the structure of `pterobot.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PipelineConfig {
    /// Chat-platform ids allowed to run privileged actions.
    #[serde(default)]
    pub admins: BTreeSet<PlatformUserId>,

    /// Panel application API settings.
    #[serde(default)]
    pub panel: PanelConfig,

    /// Direct-message and audit-channel settings.
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Local record journal.
    #[serde(default)]
    pub journal: JournalConfig,

    /// Command-layer transport.
    #[serde(default)]
    pub nats: NatsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `ADMIN_IDS` (comma separated) replaces `admins`
    /// - `PTERO_PANEL_URL` overrides `panel.base_url`
    /// - `ADMIN_LOG_CHANNEL_ID` overrides `notifications.audit_channel_id`
    /// - `PTEROBOT_JOURNAL` overrides `journal.path`
    /// - `NATS_URL` overrides `nats.url`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string (no environment overrides).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Override values from the process environment when set.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Override values from an arbitrary variable lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("ADMIN_IDS") {
            self.admins = parse_admin_ids(&val);
        }
        if let Some(val) = lookup("PTERO_PANEL_URL") {
            self.panel.base_url = val;
        }
        if let Some(val) = lookup("ADMIN_LOG_CHANNEL_ID") {
            match val.parse() {
                Ok(id) => self.notifications.audit_channel_id = id,
                Err(e) => warn!(value = val, error = %e, "ignoring invalid ADMIN_LOG_CHANNEL_ID"),
            }
        }
        if let Some(val) = lookup("PTEROBOT_JOURNAL") {
            self.journal.path = Some(PathBuf::from(val));
        }
        if let Some(val) = lookup("NATS_URL") {
            self.nats.url = val;
        }
    }

    /// Reject values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.notifications.audit_channel_id.get() == 0 {
            return Err(ConfigError::Invalid(
                "notifications.audit_channel_id must be set (or ADMIN_LOG_CHANNEL_ID)".to_owned(),
            ));
        }
        if !(self.panel.base_url.starts_with("http://")
            || self.panel.base_url.starts_with("https://"))
        {
            return Err(ConfigError::Invalid(format!(
                "panel.base_url must start with http:// or https:// (got {})",
                self.panel.base_url
            )));
        }
        if self.panel.max_concurrent_calls == 0 {
            return Err(ConfigError::Invalid(
                "panel.max_concurrent_calls must be at least 1".to_owned(),
            ));
        }
        if self.panel.retry.max_rate_limit_attempts == 0
            || self.panel.retry.max_transient_attempts == 0
        {
            return Err(ConfigError::Invalid(
                "panel.retry attempt bounds must be at least 1".to_owned(),
            ));
        }
        if self.admins.is_empty() {
            warn!("admin allow-list is empty; every action will be denied");
        }
        Ok(())
    }
}

/// Parse a comma-separated id list, skipping entries that are not numeric.
pub fn parse_admin_ids(raw: &str) -> BTreeSet<PlatformUserId> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse() {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(entry = s, error = %e, "skipping non-numeric admin id");
                None
            }
        })
        .collect()
}

/// Panel application API settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PanelConfig {
    /// Panel root URL, without the `/api/application` suffix.
    #[serde(default = "default_panel_url")]
    pub base_url: String,

    /// Timeout for a single HTTP attempt in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Maximum simultaneously in-flight panel calls across all requests.
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,

    /// Domain for the synthetic `discord-{id}@{domain}` account emails.
    #[serde(default = "default_user_email_domain")]
    pub user_email_domain: String,

    /// Retry and backoff bounds.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Create payload settings.
    #[serde(default)]
    pub create: CreateConfig,
}

impl PanelConfig {
    /// Timeout for a single HTTP attempt.
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            base_url: default_panel_url(),
            request_timeout_ms: default_request_timeout_ms(),
            max_concurrent_calls: default_max_concurrent_calls(),
            user_email_domain: default_user_email_domain(),
            retry: RetryConfig::default(),
            create: CreateConfig::default(),
        }
    }
}

/// Retry and backoff bounds for panel calls.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetryConfig {
    /// Consecutive "too many requests" answers tolerated before giving up.
    #[serde(default = "default_max_rate_limit_attempts")]
    pub max_rate_limit_attempts: u32,

    /// Attempts made when the panel is unreachable or failing with 5xx.
    #[serde(default = "default_max_transient_attempts")]
    pub max_transient_attempts: u32,

    /// First backoff delay in milliseconds; doubles per retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for any single backoff delay in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_rate_limit_attempts: default_max_rate_limit_attempts(),
            max_transient_attempts: default_max_transient_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Deployment-specific parts of the create payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CreateConfig {
    /// Location ids the panel may auto-deploy into when a request carries
    /// no explicit allocation. Empty disables auto-deploy.
    #[serde(default)]
    pub deploy_locations: Vec<u64>,

    /// Feature limits granted to new servers.
    #[serde(default)]
    pub feature_limits: FeatureLimits,
}

/// Panel feature limits (databases, backups, extra allocations).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, serde::Serialize)]
pub struct FeatureLimits {
    /// Databases the owner may create.
    #[serde(default)]
    pub databases: u32,
    /// Backups the owner may keep.
    #[serde(default)]
    pub backups: u32,
    /// Additional allocations the owner may claim.
    #[serde(default)]
    pub allocations: u32,
}

/// Direct-message and audit-channel settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NotificationConfig {
    /// Channel receiving fallback audit records.
    #[serde(default = "default_audit_channel")]
    pub audit_channel_id: ChannelId,

    /// Timeout for a direct message or fallback post in milliseconds.
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,

    /// Chat-platform REST base URL.
    #[serde(default = "default_chat_api_url")]
    pub api_base_url: String,
}

impl NotificationConfig {
    /// Timeout for a single delivery call.
    pub const fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            audit_channel_id: default_audit_channel(),
            delivery_timeout_ms: default_delivery_timeout_ms(),
            api_base_url: default_chat_api_url(),
        }
    }
}

/// Local record journal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct JournalConfig {
    /// JSON-lines file receiving every sealed record. Disabled when absent.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Command-layer transport.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL.
    #[serde(default = "default_nats_url")]
    pub url: String,

    /// Subject the command layer publishes action requests on.
    #[serde(default = "default_request_subject")]
    pub request_subject: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: default_nats_url(),
            request_subject: default_request_subject(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_panel_url() -> String {
    "https://panel.example.com".to_owned()
}

const fn default_request_timeout_ms() -> u64 {
    10_000
}

const fn default_max_concurrent_calls() -> usize {
    5
}

fn default_user_email_domain() -> String {
    "local".to_owned()
}

const fn default_max_rate_limit_attempts() -> u32 {
    5
}

const fn default_max_transient_attempts() -> u32 {
    3
}

const fn default_base_delay_ms() -> u64 {
    500
}

const fn default_max_delay_ms() -> u64 {
    30_000
}

const fn default_audit_channel() -> ChannelId {
    ChannelId(0)
}

const fn default_delivery_timeout_ms() -> u64 {
    5_000
}

fn default_chat_api_url() -> String {
    "https://discord.com/api/v10".to_owned()
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_owned()
}

fn default_request_subject() -> String {
    "pterobot.actions.request".to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.panel.max_concurrent_calls, 5);
        assert_eq!(config.panel.retry.max_rate_limit_attempts, 5);
        assert_eq!(config.panel.retry.max_transient_attempts, 3);
        assert_eq!(config.notifications.delivery_timeout_ms, 5000);
        assert_eq!(config.nats.request_subject, "pterobot.actions.request");
        assert!(config.journal.path.is_none());
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
admins: [1001, 1002]

panel:
  base_url: "https://panel.test"
  request_timeout_ms: 2000
  max_concurrent_calls: 2
  user_email_domain: "players.test"
  retry:
    max_rate_limit_attempts: 4
    max_transient_attempts: 2
    base_delay_ms: 100
    max_delay_ms: 1000
  create:
    deploy_locations: [1, 2]
    feature_limits:
      databases: 1
      backups: 2

notifications:
  audit_channel_id: 555
  delivery_timeout_ms: 1500

journal:
  path: "/var/lib/pterobot/records.jsonl"

nats:
  url: "nats://testhost:4222"

logging:
  level: "debug"
"#;

        let config = PipelineConfig::parse(yaml);
        assert!(config.is_ok(), "{config:?}");
        let config = config.ok().unwrap_or_default();

        assert!(config.admins.contains(&PlatformUserId(1001)));
        assert_eq!(config.panel.base_url, "https://panel.test");
        assert_eq!(config.panel.max_concurrent_calls, 2);
        assert_eq!(config.panel.retry.max_delay_ms, 1000);
        assert_eq!(config.panel.create.deploy_locations, vec![1, 2]);
        assert_eq!(config.panel.create.feature_limits.backups, 2);
        assert_eq!(config.panel.create.feature_limits.allocations, 0);
        assert_eq!(config.notifications.audit_channel_id, ChannelId(555));
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_empty_yaml() {
        let config = PipelineConfig::parse("");
        assert!(config.is_ok());
    }

    #[test]
    fn env_overrides_replace_yaml_values() {
        let mut config = PipelineConfig::parse("admins: [1]\n")
            .ok()
            .unwrap_or_default();
        config.apply_overrides(|name| match name {
            "ADMIN_IDS" => Some(" 7, 8 ,abc,".to_owned()),
            "PTERO_PANEL_URL" => Some("https://panel.override".to_owned()),
            "ADMIN_LOG_CHANNEL_ID" => Some("99".to_owned()),
            _ => None,
        });

        let expected: BTreeSet<_> = [PlatformUserId(7), PlatformUserId(8)].into();
        assert_eq!(config.admins, expected);
        assert_eq!(config.panel.base_url, "https://panel.override");
        assert_eq!(config.notifications.audit_channel_id, ChannelId(99));
        assert_eq!(config.nats.url, "nats://localhost:4222");
    }

    #[test]
    fn validation_rejects_unusable_values() {
        let mut config = PipelineConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.notifications.audit_channel_id = ChannelId(1);
        assert!(config.validate().is_ok());

        config.panel.max_concurrent_calls = 0;
        assert!(config.validate().is_err());

        config.panel.max_concurrent_calls = 5;
        config.panel.base_url = "panel.example.com".to_owned();
        assert!(config.validate().is_err());
    }
}
