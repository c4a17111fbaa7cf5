use crate::config::helpers::parse_string_env;
use crate::error::ConfigError;
use crate::settings::Settings;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::InvalidValue {
                key: "MUT_LOG_FORMAT".to_string(),
                message: format!("unsupported format '{other}'"),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Default directive when `RUST_LOG` is unset.
    pub filter: String,
}

impl LoggingConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let format_raw = parse_string_env("MUT_LOG_FORMAT", settings.logging.format.clone())?;
        Ok(Self {
            format: LogFormat::from_str(&format_raw)?,
            filter: settings.logging.filter.clone(),
        })
    }
}
