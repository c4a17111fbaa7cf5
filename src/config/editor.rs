use crate::config::helpers::{parse_bool_env, parse_u32_env};
use crate::editor::conflict::ClassifyPolicy;
use crate::error::ConfigError;
use crate::settings::Settings;

/// Upper bound for a single precheck/recovery search page.
pub const MAX_SEARCH_PAGE_SIZE: u32 = 5000;

/// Submission flow tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditorConfig {
    /// Records scanned per precheck or recovery search. Scopes holding more
    /// records than this can hide a duplicate.
    pub search_page_size: u32,
    pub precheck_enabled: bool,
    pub deforestation_server_error_is_duplicate: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            search_page_size: 500,
            precheck_enabled: true,
            deforestation_server_error_is_duplicate: true,
        }
    }
}

fn validate_page_size(value: u32) -> Result<u32, ConfigError> {
    if (1..=MAX_SEARCH_PAGE_SIZE).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue {
            key: "MUT_SEARCH_PAGE_SIZE".to_string(),
            message: format!("must be between 1 and {MAX_SEARCH_PAGE_SIZE}, got {value}"),
        })
    }
}

impl EditorConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let page_size =
            parse_u32_env("MUT_SEARCH_PAGE_SIZE", settings.editor.search_page_size)?;
        Ok(Self {
            search_page_size: validate_page_size(page_size)?,
            precheck_enabled: parse_bool_env(
                "MUT_PRECHECK_ENABLED",
                settings.editor.precheck_enabled,
            )?,
            deforestation_server_error_is_duplicate: parse_bool_env(
                "MUT_DEFORESTATION_500_IS_DUPLICATE",
                settings.editor.deforestation_server_error_is_duplicate,
            )?,
        })
    }

    pub fn classify_policy(&self) -> ClassifyPolicy {
        ClassifyPolicy {
            deforestation_server_error_is_duplicate: self.deforestation_server_error_is_duplicate,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ConfigError;
    use crate::settings::Settings;

    #[test]
    fn editor_resolve_uses_defaults() {
        let config = super::EditorConfig::resolve(&Settings::default()).expect("editor config");
        assert_eq!(config, super::EditorConfig::default());
        assert!(config.classify_policy().deforestation_server_error_is_duplicate);
    }

    #[test]
    fn editor_resolve_rejects_zero_page_size() {
        let mut settings = Settings::default();
        settings.editor.search_page_size = 0;

        let err = super::EditorConfig::resolve(&settings).expect_err("zero page size");
        let ConfigError::InvalidValue { key, message } = err else {
            panic!("expected InvalidValue");
        };
        assert_eq!(key, "MUT_SEARCH_PAGE_SIZE");
        assert!(message.contains("between 1 and 5000"), "unexpected message: {message}");
    }

    #[test]
    fn page_size_upper_bound_is_inclusive() {
        assert_eq!(super::validate_page_size(5000).expect("valid"), 5000);
        assert!(super::validate_page_size(5001).is_err());
    }
}
