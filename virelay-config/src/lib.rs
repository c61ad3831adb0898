//! Shared configuration library for Virelay.
//!
//! Centralizes the settings models and the TOML + environment loader so the
//! server binary and tests share one source of truth for defaults and
//! validation rules.

pub mod loader;
pub mod models;

pub use loader::{load, ConfigError};
pub use models::{
    CacheSettings, ServerSettings, Settings, StorageSettings, TranscodeSettings,
};
