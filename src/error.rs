//! Error types for the factor editor.

use serde::{Deserialize, Serialize};

/// Configuration resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration '{key}': {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error("failed to parse settings: {0}")]
    ParseError(String),

    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
}

/// Error body reported by the factor backend on a rejected request.
///
/// This is the only shape the conflict classifier depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendError {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_id: Option<i64>,
}

impl BackendError {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_existing_id(mut self, id: i64) -> Self {
        self.existing_id = Some(id);
        self
    }
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "status {}", self.status)?;
        if let Some(code) = &self.code {
            write!(f, " [{code}]")?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

/// Failures from the external search/lookup/write collaborators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("backend rejected request: {0}")]
    Rejected(BackendError),

    #[error("factor record {id} not found")]
    NotFound { id: i64 },

    #[error("backend unavailable: {0}")]
    Transport(String),

    #[error("failed to decode backend response: {0}")]
    Decode(String),
}

impl ApiError {
    /// The backend error body, when the failure was a rejection.
    pub fn backend(&self) -> Option<&BackendError> {
        match self {
            Self::Rejected(body) => Some(body),
            _ => None,
        }
    }

    /// Message the backend attached to the failure, if any.
    pub fn backend_message(&self) -> Option<&str> {
        self.backend()
            .and_then(|body| body.message.as_deref())
            .map(str::trim)
            .filter(|message| !message.is_empty())
    }
}

/// Failures loading a CLI draft file.
#[derive(Debug, thiserror::Error)]
pub enum DraftError {
    #[error("failed to read draft '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid draft '{path}': {reason}")]
    Invalid { path: String, reason: String },

    #[error("draft is a {draft} form but record {id} is a {record} factor")]
    ChangeTypeMismatch {
        id: i64,
        draft: &'static str,
        record: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_message_ignores_blank_text() {
        let err = ApiError::Rejected(BackendError::new(409).with_message("   "));
        assert_eq!(err.backend_message(), None);

        let err = ApiError::Rejected(BackendError::new(409).with_message(" boom "));
        assert_eq!(err.backend_message(), Some("boom"));
    }

    #[test]
    fn backend_error_decodes_camel_case_body() {
        let body: BackendError = serde_json::from_str(
            r#"{"status":409,"code":"RN008_DUPLICIDADE","existingId":77}"#,
        )
        .expect("decode body");
        assert_eq!(body.existing_id, Some(77));
        assert_eq!(body.code.as_deref(), Some("RN008_DUPLICIDADE"));
        assert_eq!(body.message, None);
    }

    #[test]
    fn display_includes_code_and_message() {
        let body = BackendError::new(500)
            .with_code("ERRO")
            .with_message("falha");
        assert_eq!(body.to_string(), "status 500 [ERRO]: falha");
    }
}
