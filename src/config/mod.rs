//! Resolved runtime configuration.
//!
//! `.env` is loaded first, then an optional TOML settings file supplies
//! defaults, and `MUT_*` environment variables override both.

mod api;
mod editor;
pub(crate) mod helpers;
mod logging;

use std::path::Path;

pub use api::ApiConfig;
pub use editor::{EditorConfig, MAX_SEARCH_PAGE_SIZE};
pub use logging::{LogFormat, LoggingConfig};

use crate::error::ConfigError;
use crate::settings::Settings;

#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub editor: EditorConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            api: ApiConfig::resolve(settings)?,
            editor: EditorConfig::resolve(settings)?,
            logging: LoggingConfig::resolve(settings)?,
        })
    }

    /// Load `.env`, read `settings_path` when given, and resolve.
    pub fn load(settings_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            tracing::warn!("Failed to load .env: {}", e);
        }
        let settings = match settings_path {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };
        Self::resolve(&settings)
    }
}
