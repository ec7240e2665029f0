//! Configuration and settings management
//!
//! Loads settings from layered config files and environment variables, and
//! defines engine-wide tunables.

use crate::checkin::profile::{builtin_targets, TargetProfile};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::warn;

/// One Telegram account the engine checks in with.
#[derive(Debug, Deserialize, Clone)]
pub struct AccountSettings {
    /// Display name used in logs and result reporting.
    pub name: String,
    /// Bot API token for this account.
    pub token: String,
}

/// Target selection: chat ids for built-in profiles plus fully custom targets.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TargetSettings {
    /// Chat id per built-in target identifier (e.g. `ljyy = 123456789`).
    #[serde(default)]
    pub chat_ids: HashMap<String, i64>,
    /// Fully specified additional targets.
    #[serde(default)]
    pub custom: Vec<TargetProfile>,
}

/// Application settings loaded from config files and environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Accounts to run check-ins for.
    pub accounts: Vec<AccountSettings>,

    /// Target bots to check in with.
    #[serde(default)]
    pub targets: TargetSettings,

    /// Wall-clock deadline for one run, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retry budget per session.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// HTTP endpoint of the captcha OCR service.
    pub ocr_endpoint: Option<String>,

    /// Path of the persisted answer-history log.
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,

    /// Directory captcha images are downloaded into.
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,
}

const fn default_timeout_secs() -> u64 {
    120
}

const fn default_retries() -> u32 {
    10
}

fn default_history_path() -> PathBuf {
    PathBuf::from("checkin-history.json")
}

fn default_media_dir() -> PathBuf {
    std::env::temp_dir().join("telecheckin-media")
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading or deserialization fails.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(File::with_name("config/default").required(false))
            // Add in the current environment file
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked into git
            .add_source(File::with_name("config/local").required(false))
            // Add in settings from the environment (with a prefix of APP)
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Resolve the configured targets into complete profiles.
    ///
    /// Built-in profiles are instantiated for every entry in
    /// `targets.chat_ids`; unknown identifiers are skipped with a warning.
    /// Custom targets are appended as-is.
    #[must_use]
    pub fn resolved_targets(&self) -> Vec<TargetProfile> {
        let builtins = builtin_targets();
        let mut targets = Vec::new();
        for (id, chat_id) in &self.targets.chat_ids {
            match builtins.iter().find(|t| &t.id == id) {
                Some(preset) => {
                    let mut target = preset.clone();
                    target.chat_id = *chat_id;
                    targets.push(target);
                }
                None => warn!(bot = %id, "unknown built-in target, skipped"),
            }
        }
        targets.extend(self.targets.custom.iter().cloned());
        targets.retain(|t| {
            if t.chat_id == 0 {
                warn!(bot = %t.id, "target has no chat id, skipped");
                false
            } else {
                true
            }
        });
        targets
    }
}

/// Maximum retry attempts for one transport API operation.
pub const TRANSPORT_MAX_RETRIES: usize = 3;
/// Initial backoff for transport retries, in milliseconds.
pub const TRANSPORT_INITIAL_BACKOFF_MS: u64 = 500;
/// Maximum backoff for transport retries, in milliseconds.
pub const TRANSPORT_MAX_BACKOFF_MS: u64 = 5_000;

/// Text submitted in place of a captcha the OCR collaborator could not read.
pub const CAPTCHA_PLACEHOLDER: &str = "unknown";

/// Capacity of each per-session inbound event channel.
pub const SESSION_CHANNEL_CAPACITY: usize = 32;
/// Capacity of each per-account inbound event channel.
pub const ACCOUNT_CHANNEL_CAPACITY: usize = 256;

/// Time-to-live of the duplicate-update suppression cache, in seconds.
pub const SEEN_CACHE_TTL_SECS: u64 = 600;
/// Maximum number of entries in the duplicate-update suppression cache.
pub const SEEN_CACHE_MAX_CAPACITY: u64 = 10_000;

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_targets(targets: TargetSettings) -> Settings {
        Settings {
            accounts: Vec::new(),
            targets,
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
            ocr_endpoint: None,
            history_path: default_history_path(),
            media_dir: default_media_dir(),
        }
    }

    #[test]
    fn builtin_target_resolution_fills_chat_id() {
        let mut chat_ids = HashMap::new();
        chat_ids.insert("ljyy".to_string(), 42);
        let settings = settings_with_targets(TargetSettings {
            chat_ids,
            custom: Vec::new(),
        });

        let targets = settings.resolved_targets();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].id, "ljyy");
        assert_eq!(targets[0].chat_id, 42);
    }

    #[test]
    fn unknown_builtin_and_zero_chat_id_are_skipped() {
        let mut chat_ids = HashMap::new();
        chat_ids.insert("no-such-bot".to_string(), 42);
        let mut custom = builtin_targets();
        custom.truncate(1);
        custom[0].chat_id = 0;
        let settings = settings_with_targets(TargetSettings { chat_ids, custom });

        assert!(settings.resolved_targets().is_empty());
    }
}
