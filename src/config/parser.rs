use super::validator::{ConfigError, validate_avatar_size, validate_log_format};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub archive: ArchiveOptions,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DiscordConfig {
    #[serde(alias = "bot_token", default)]
    pub token: String,
}

impl DiscordConfig {
    pub fn secret_token(&self) -> SecretString {
        SecretString::from(self.token.clone())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub filename: Option<String>,
}

/// What happens when a message is already present in the archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Stop archiving the channel at the first already archived message.
    #[default]
    Abort,
    /// Count the message as archived and keep walking.
    Skip,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArchiveOptions {
    /// Folder for the database, attachments, embeds and avatars.
    #[serde(default = "default_save_path")]
    pub save_path: String,
    #[serde(default)]
    pub save_attachments: bool,
    #[serde(default)]
    pub save_embed_images: bool,
    #[serde(default)]
    pub save_avatars: bool,
    /// Power of two; empty keeps the service default.
    #[serde(default)]
    pub avatar_size: String,
    /// Maximum items archived per channel or member list; 0 means unbounded.
    #[serde(default)]
    pub limit: usize,
    /// Items to skip before archiving; takes precedence over `last_id`.
    #[serde(default)]
    pub skip: usize,
    #[serde(default)]
    pub last_id: String,
    #[serde(default)]
    pub on_duplicate: DuplicatePolicy,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            save_path: default_save_path(),
            save_attachments: false,
            save_embed_images: false,
            save_avatars: false,
            avatar_size: String::new(),
            limit: 0,
            skip: 0,
            last_id: String::new(),
            on_duplicate: DuplicatePolicy::default(),
        }
    }
}

impl ArchiveOptions {
    pub fn limit(&self) -> Option<usize> {
        (self.limit > 0).then_some(self.limit)
    }

    /// Options for the member pass that follows a channel or guild archive.
    /// Avatars are always saved; positioning options only apply to message
    /// history.
    pub fn for_members(&self) -> Self {
        Self {
            save_avatars: true,
            limit: 0,
            skip: 0,
            last_id: String::new(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaConfig {
    #[serde(default = "default_media_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            concurrency: default_media_concurrency(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl MediaConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(alias = "console", default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Loads `path` when given, otherwise starts from defaults; environment
    /// overrides are applied in both cases.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => {
                let mut config = Config::default();
                config.apply_env_overrides();
                Ok(config)
            }
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.archive.save_path.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "archive.save_path cannot be empty".to_string(),
            ));
        }

        validate_avatar_size(&self.archive.avatar_size)?;

        if self.media.concurrency == 0 {
            return Err(ConfigError::InvalidConfig(
                "media.concurrency must be at least 1".to_string(),
            ));
        }

        if self.media.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "media.request_timeout_secs must be at least 1".to_string(),
            ));
        }

        validate_log_format(&self.logging.format)?;

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("DISCORD_ARCHIVE_TOKEN") {
            self.discord.token = value;
        }
        if let Ok(value) = std::env::var("DISCORD_ARCHIVE_SAVE_PATH") {
            self.archive.save_path = value;
        }
        if let Ok(value) = std::env::var("DISCORD_ARCHIVE_DATABASE") {
            self.database.filename = Some(value);
        }
    }
}

fn default_save_path() -> String {
    "./".to_string()
}

fn default_media_concurrency() -> usize {
    3
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
