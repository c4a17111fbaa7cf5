use std::time::Duration;

use crate::config::helpers::{optional_env, parse_u32_env};
use crate::error::ConfigError;
use crate::settings::Settings;

/// Factor backend connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Service root, e.g. `https://host/api/`. Required unless offline.
    pub base_url: Option<String>,
    pub timeout: Duration,
}

impl ApiConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let base_url = optional_env("MUT_API_BASE_URL")?.or_else(|| {
            settings
                .api
                .base_url
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string)
        });

        let default_timeout = u32::try_from(settings.api.timeout_secs).unwrap_or(u32::MAX);
        let timeout_secs = parse_u32_env("MUT_API_TIMEOUT_SECS", default_timeout)?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MUT_API_TIMEOUT_SECS".to_string(),
                message: "timeout must be at least one second".to_string(),
            });
        }

        Ok(Self {
            base_url,
            timeout: Duration::from_secs(u64::from(timeout_secs)),
        })
    }
}
