//! REST factor backend over `reqwest`.
//!
//! Endpoints, relative to the configured base URL:
//!
//! - `GET  mut/factors?changeType=..&scope=..&page=..&size=..` → `FactorPage`
//! - `GET  mut/factors/{id}` → `FactorRecord` (404 → `None`)
//! - `POST mut/factors` → `FactorRecord`
//! - `PUT  mut/factors/{id}` → `FactorRecord`
//!
//! Non-2xx responses carry `{code, message, existingId}`; they are folded
//! into [`BackendError`] with the HTTP status filled in.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::api::{FactorLookup, FactorSearch, FactorWriter};
use crate::error::{ApiError, BackendError, ConfigError};
use crate::model::{ChangeType, FactorPage, FactorPayload, FactorRecord, Scope};

const FACTORS_PATH: &str = "mut/factors";

pub struct HttpFactorApi {
    client: reqwest::Client,
    base: Url,
}

/// Error body as the service sends it. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
    existing_id: Option<i64>,
}

impl HttpFactorApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let mut raw = base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base = Url::parse(&raw).map_err(|e| ConfigError::InvalidValue {
            key: "MUT_API_BASE_URL".to_string(),
            message: format!("'{}' is not a valid URL: {e}", base_url.trim()),
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue {
                key: "MUT_API_BASE_URL".to_string(),
                message: format!("unsupported scheme '{}'", base.scheme()),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mutfactor/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "MUT_API_TIMEOUT_SECS".to_string(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, suffix: Option<i64>) -> Result<Url, ApiError> {
        let path = match suffix {
            Some(id) => format!("{FACTORS_PATH}/{id}"),
            None => FACTORS_PATH.to_string(),
        };
        self.base
            .join(&path)
            .map_err(|e| ApiError::Transport(format!("failed to build request URL: {e}")))
    }
}

fn transport(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Transport(format!("request timed out: {err}"))
    } else {
        ApiError::Transport(err.to_string())
    }
}

/// Turn a non-2xx response into the core's error shape.
async fn rejection(response: reqwest::Response) -> ApiError {
    let status = response.status().as_u16();
    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!("Failed to read error body: {}", e);
            String::new()
        }
    };

    let body = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => body,
        Err(_) => ErrorBody {
            message: Some(text.trim().to_string()).filter(|m| !m.is_empty()),
            ..ErrorBody::default()
        },
    };
    ApiError::Rejected(BackendError {
        status,
        code: body.code,
        message: body.message,
        existing_id: body.existing_id,
    })
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    if !response.status().is_success() {
        return Err(rejection(response).await);
    }
    response
        .json::<T>()
        .await
        .map_err(|e| ApiError::Decode(e.to_string()))
}

#[async_trait]
impl FactorSearch for HttpFactorApi {
    async fn search(
        &self,
        change_type: ChangeType,
        scope: Scope,
        page: u32,
        page_size: u32,
    ) -> Result<FactorPage, ApiError> {
        let mut url = self.url(None)?;
        url.query_pairs_mut()
            .append_pair("changeType", change_type.as_str())
            .append_pair("scope", scope.as_str())
            .append_pair("page", &page.to_string())
            .append_pair("size", &page_size.to_string());

        tracing::debug!(url = %url, "Searching factors");
        let response = self.client.get(url).send().await.map_err(transport)?;
        decode(response).await
    }
}

#[async_trait]
impl FactorLookup for HttpFactorApi {
    async fn get(&self, id: i64) -> Result<Option<FactorRecord>, ApiError> {
        let url = self.url(Some(id))?;
        tracing::debug!(url = %url, "Fetching factor");
        let response = self.client.get(url).send().await.map_err(transport)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(response).await.map(Some)
    }
}

#[async_trait]
impl FactorWriter for HttpFactorApi {
    async fn create(&self, payload: &FactorPayload) -> Result<FactorRecord, ApiError> {
        let url = self.url(None)?;
        tracing::debug!(url = %url, change_type = %payload.change_type(), "Creating factor");
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    async fn update(&self, id: i64, payload: &FactorPayload) -> Result<FactorRecord, ApiError> {
        let url = self.url(Some(id))?;
        tracing::debug!(url = %url, change_type = %payload.change_type(), "Updating factor");
        let response = self
            .client
            .put(url)
            .json(payload)
            .send()
            .await
            .map_err(transport)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound { id });
        }
        decode(response).await
    }
}
