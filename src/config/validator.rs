use thiserror::Error;

const MIN_AVATAR_SIZE: u32 = 16;
const MAX_AVATAR_SIZE: u32 = 4096;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Accepts an empty size (service default) or a power of two the CDN serves.
pub(super) fn validate_avatar_size(size: &str) -> Result<(), ConfigError> {
    if size.is_empty() {
        return Ok(());
    }

    let value: u32 = size.parse().map_err(|_| {
        ConfigError::InvalidConfig(format!("archive.avatar_size must be a number, got {size:?}"))
    })?;
    if !value.is_power_of_two() || !(MIN_AVATAR_SIZE..=MAX_AVATAR_SIZE).contains(&value) {
        return Err(ConfigError::InvalidConfig(format!(
            "archive.avatar_size must be a power of two between {MIN_AVATAR_SIZE} and {MAX_AVATAR_SIZE}, got {value}"
        )));
    }
    Ok(())
}

pub(super) fn validate_log_format(format: &str) -> Result<(), ConfigError> {
    match format {
        "pretty" | "json" => Ok(()),
        other => Err(ConfigError::InvalidConfig(format!(
            "logging.format must be \"pretty\" or \"json\", got {other:?}"
        ))),
    }
}
