//! Loading: optional TOML file, then `VIRELAY_*` environment overrides,
//! then validation.

use std::env;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::models::Settings;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {message}")]
    InvalidOverride { key: &'static str, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Load settings from an optional TOML file, apply environment overrides,
/// and validate.
pub fn load(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let mut settings = match path {
        Some(path) => {
            debug!(path = %path.display(), "loading config file");
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        }
        None => Settings::default(),
    };

    apply_env_overrides(&mut settings)?;
    validate(&settings)?;
    Ok(settings)
}

fn apply_env_overrides(settings: &mut Settings) -> Result<(), ConfigError> {
    if let Ok(host) = env::var("VIRELAY_SERVER_HOST") {
        settings.server.host = host;
    }
    if let Ok(port) = env::var("VIRELAY_SERVER_PORT") {
        settings.server.port = parse(port, "VIRELAY_SERVER_PORT")?;
    }
    if let Ok(base_path) = env::var("VIRELAY_STORAGE_BASE_PATH") {
        settings.storage.base_path = PathBuf::from(base_path);
    }
    if let Ok(block_size) = env::var("VIRELAY_CACHE_BLOCK_SIZE") {
        settings.cache.block_size = parse(block_size, "VIRELAY_CACHE_BLOCK_SIZE")?;
    }
    if let Ok(ffmpeg) = env::var("VIRELAY_FFMPEG_PATH") {
        settings.transcode.ffmpeg_path = ffmpeg;
    }
    if let Ok(seconds) = env::var("VIRELAY_SEGMENT_SECONDS") {
        settings.transcode.segment_seconds = parse(seconds, "VIRELAY_SEGMENT_SECONDS")?;
    }
    Ok(())
}

fn parse<T: std::str::FromStr>(raw: String, key: &'static str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|err: T::Err| ConfigError::InvalidOverride {
        key,
        message: err.to_string(),
    })
}

fn validate(settings: &Settings) -> Result<(), ConfigError> {
    if settings.cache.block_size == 0 {
        return Err(ConfigError::Invalid(
            "cache.block_size must be greater than zero".to_owned(),
        ));
    }
    if settings.transcode.segment_seconds == 0 {
        return Err(ConfigError::Invalid(
            "transcode.segment_seconds must be greater than zero".to_owned(),
        ));
    }
    if settings.storage.base_path.as_os_str().is_empty() {
        return Err(ConfigError::Invalid(
            "storage.base_path must not be empty".to_owned(),
        ));
    }
    Ok(())
}
