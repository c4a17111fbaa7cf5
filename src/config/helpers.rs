//! Environment lookups with typed parsing.
//!
//! Every helper takes the settings-file value as its default, so the
//! precedence is always: environment, then settings file, then built-in
//! default.

use crate::error::ConfigError;

/// Read an environment variable. Unset and blank are both `None`.
pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value.trim().to_string())),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "value is not valid UTF-8".to_string(),
        }),
    }
}

pub(crate) fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}

pub(crate) fn parse_bool_env(key: &str, default: bool) -> Result<bool, ConfigError> {
    match optional_env(key)? {
        Some(raw) => parse_bool(key, &raw),
        None => Ok(default),
    }
}

pub(crate) fn parse_string_env(key: &str, default: String) -> Result<String, ConfigError> {
    Ok(optional_env(key)?.unwrap_or(default))
}

pub(crate) fn parse_u32(key: &str, raw: &str) -> Result<u32, ConfigError> {
    raw.trim()
        .parse::<u32>()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a non-negative integer: {e}"),
        })
}

pub(crate) fn parse_u32_env(key: &str, default: u32) -> Result<u32, ConfigError> {
    match optional_env(key)? {
        Some(raw) => parse_u32(key, &raw),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        for raw in ["1", "true", "YES", " on "] {
            assert!(parse_bool("K", raw).expect("truthy"), "{raw}");
        }
        for raw in ["0", "False", "no", "off"] {
            assert!(!parse_bool("K", raw).expect("falsy"), "{raw}");
        }
    }

    #[test]
    fn parse_bool_rejects_garbage_with_key() {
        let err = parse_bool("MUT_PRECHECK_ENABLED", "maybe").expect_err("garbage");
        let ConfigError::InvalidValue { key, message } = err else {
            panic!("expected InvalidValue");
        };
        assert_eq!(key, "MUT_PRECHECK_ENABLED");
        assert!(message.contains("maybe"), "unexpected message: {message}");
    }

    #[test]
    fn parse_u32_rejects_negative_numbers() {
        assert_eq!(parse_u32("K", " 500 ").expect("number"), 500);
        assert!(parse_u32("K", "-1").is_err());
    }

    #[test]
    fn unset_variables_fall_back_to_defaults() {
        let key = "MUT_TEST_SURELY_UNSET_VARIABLE";
        assert_eq!(optional_env(key).expect("lookup"), None);
        assert!(parse_bool_env(key, true).expect("default"));
        assert_eq!(parse_u32_env(key, 7).expect("default"), 7);
        assert_eq!(
            parse_string_env(key, "pretty".to_string()).expect("default"),
            "pretty"
        );
    }
}
