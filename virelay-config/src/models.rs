//! Settings models with serde defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub transcode: TranscodeSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            storage: StorageSettings::default(),
            cache: CacheSettings::default(),
            transcode: TranscodeSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSettings {
    /// Root directory of the local-filesystem storage backend.
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self { base_path: default_base_path() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    /// Capacity of one stream-cache block, in bytes.
    #[serde(default = "default_block_size")]
    pub block_size: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { block_size: default_block_size() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TranscodeSettings {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    /// Target HLS segment duration, in seconds.
    #[serde(default = "default_segment_seconds")]
    pub segment_seconds: u32,
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            segment_seconds: default_segment_seconds(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_port() -> u16 {
    8670
}

fn default_base_path() -> PathBuf {
    PathBuf::from("data")
}

fn default_block_size() -> usize {
    64 * 1024
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_owned()
}

fn default_segment_seconds() -> u32 {
    6
}
