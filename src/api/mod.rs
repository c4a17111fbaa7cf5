//! Backend collaborator contracts.
//!
//! The editor core never talks HTTP directly. It depends on three narrow
//! async traits, combined into the [`FactorApi`] supertrait:
//!
//! - [`FactorSearch`]: paginated listing by change type and scope
//! - [`FactorLookup`]: fetch a single record by id
//! - [`FactorWriter`]: create and update
//!
//! Two implementations exist:
//!
//! - `http` (default feature): [`http::HttpFactorApi`] over `reqwest`
//! - [`memory::InMemoryFactorApi`]: an in-process backend with the same
//!   uniqueness rules, used by tests and the CLI offline mode

#[cfg(feature = "http")]
pub mod http;

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ApiConfig;
use crate::editor::matcher::find_match;
use crate::error::{ApiError, ConfigError};
use crate::model::{ChangeType, FactorPage, FactorPayload, FactorRecord, ReplicatedKey, Scope};

/// Build the backend described by the configuration.
///
/// `offline` selects the in-memory backend regardless of the configured URL.
pub fn connect_from_config(
    config: &ApiConfig,
    offline: bool,
) -> Result<Arc<dyn FactorApi>, ConfigError> {
    if offline {
        tracing::info!("Using in-memory factor backend (offline mode)");
        return Ok(Arc::new(memory::InMemoryFactorApi::new()));
    }

    #[cfg(feature = "http")]
    {
        let base_url = config.base_url.as_deref().ok_or_else(|| ConfigError::MissingRequired {
            key: "MUT_API_BASE_URL".to_string(),
            hint: "set the factor backend URL or pass --offline".to_string(),
        })?;
        let api = http::HttpFactorApi::new(base_url, config.timeout)?;
        tracing::info!(base_url = %api.base_url(), "Using HTTP factor backend");
        Ok(Arc::new(api))
    }

    #[cfg(not(feature = "http"))]
    {
        let _ = config;
        Err(ConfigError::InvalidValue {
            key: "MUT_API_BASE_URL".to_string(),
            message: "HTTP backend not available. Enable the 'http' feature or use --offline."
                .to_string(),
        })
    }
}

#[async_trait]
pub trait FactorSearch: Send + Sync {
    /// List records of one change type in one scope. `page` is zero-based.
    async fn search(
        &self,
        change_type: ChangeType,
        scope: Scope,
        page: u32,
        page_size: u32,
    ) -> Result<FactorPage, ApiError>;
}

#[async_trait]
pub trait FactorLookup: Send + Sync {
    /// Fetch a record by id; `Ok(None)` when it does not exist.
    async fn get(&self, id: i64) -> Result<Option<FactorRecord>, ApiError>;
}

#[async_trait]
pub trait FactorWriter: Send + Sync {
    async fn create(&self, payload: &FactorPayload) -> Result<FactorRecord, ApiError>;
    async fn update(&self, id: i64, payload: &FactorPayload) -> Result<FactorRecord, ApiError>;
}

/// Everything the submission flow needs from the backend.
pub trait FactorApi: FactorSearch + FactorLookup + FactorWriter + Send + Sync {}

impl<T> FactorApi for T where T: FactorSearch + FactorLookup + FactorWriter + Send + Sync + ?Sized {}

/// Search one page of `scope` and return the first record matching `key`
/// whose id is not in `exclude`.
///
/// Only the first `page_size` records are scanned. A larger scope can hide a
/// match; the truncation is logged.
pub async fn find_by_key<A>(
    api: &A,
    key: &ReplicatedKey,
    scope: Scope,
    exclude: &[i64],
    page_size: u32,
) -> Result<Option<FactorRecord>, ApiError>
where
    A: FactorSearch + ?Sized,
{
    let change_type = key.change_type();
    let page = api.search(change_type, scope, 0, page_size).await?;
    if page.total_count > page.items.len() as u64 {
        tracing::debug!(
            change_type = %change_type,
            scope = %scope,
            total = page.total_count,
            scanned = page.items.len(),
            "Key search truncated to one page"
        );
    }
    Ok(find_match(&page.items, key, exclude).cloned())
}
