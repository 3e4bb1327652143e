//! Longshot API client
//!
//! Typed HTTP client for the four device endpoints. Every call is a `POST`
//! with a JSON body carrying the device credentials; timestamps travel as
//! milliseconds exactly as the [`longshot_core::ports`] DTOs hold them.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use longshot_api::LongshotClient;
//! use longshot_core::config::ApiConfig;
//! use longshot_core::domain::Credentials;
//! use longshot_core::ports::IRemoteApi;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = LongshotClient::new(&ApiConfig::default())?;
//! let orders = client.get_orders(&Credentials::new("long1", "long1")).await?;
//! println!("{} orders pending", orders.len());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use longshot_core::config::ApiConfig;
use longshot_core::domain::{Credentials, DevicePrefix};
use longshot_core::ports::{DeclareResponse, IRemoteApi, OrderAck, Orders, WireValues};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::ApiError;

/// Production API root, the default of `api.base_url`
pub const DEFAULT_BASE_URL: &str = "http://longshot.smok4.development/";

const REDEFINE_PATHS: &str = "v1/redefine_paths/";
const GET_ORDERS: &str = "v1/get_orders/";
const CONFIRM_ORDERS: &str = "v1/confirm_orders/";
const SYNC_VALUES: &str = "v1/sync_values/";

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Serialize)]
struct DeclareRequest<'a> {
    #[serde(flatten)]
    credentials: &'a Credentials,
    prefix: DevicePrefix,
    paths: &'a [String],
}

#[derive(Debug, Serialize)]
struct ConfirmRequest<'a> {
    #[serde(flatten)]
    credentials: &'a Credentials,
    #[serde(flatten)]
    ack: &'a OrderAck,
}

#[derive(Debug, Serialize)]
struct SyncRequest<'a> {
    #[serde(flatten)]
    credentials: &'a Credentials,
    values: &'a WireValues,
}

// ============================================================================
// LongshotClient
// ============================================================================

/// HTTP client for the Longshot device API
///
/// Wraps `reqwest::Client` with the base URL and the status-to-error mapping.
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct LongshotClient {
    client: Client,
    base_url: String,
}

impl LongshotClient {
    /// Creates a client from the `api` configuration section
    ///
    /// # Errors
    /// Fails if the underlying HTTP client cannot be initialised.
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    /// Creates a client with a custom base URL and default transport settings
    /// (useful for testing)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Returns the base URL for API requests
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint)
    }

    /// Sends `body` to `endpoint` and maps any non-2xx status to an [`ApiError`]
    async fn post<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<Response, ApiError> {
        let url = self.url(endpoint);
        debug!(%url, "POST");

        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let message = response.text().await.unwrap_or_default();
        warn!(endpoint, status = status.as_u16(), "Request rejected by server");

        Err(match status {
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized(message),
            StatusCode::FORBIDDEN => ApiError::Forbidden(message),
            StatusCode::NOT_FOUND => ApiError::NotFound(message),
            StatusCode::TOO_MANY_REQUESTS => ApiError::TooManyRequests { retry_after },
            s if s.is_server_error() => ApiError::ServerError {
                status: s.as_u16(),
                message,
            },
            s => ApiError::UnexpectedStatus {
                status: s.as_u16(),
                message,
            },
        })
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self.post(endpoint, body).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("{endpoint}: {e}")))
    }

    pub async fn redefine_paths(
        &self,
        credentials: &Credentials,
        prefix: DevicePrefix,
        paths: &[String],
    ) -> Result<DeclareResponse, ApiError> {
        let body = DeclareRequest {
            credentials,
            prefix,
            paths,
        };
        let response: DeclareResponse = self.post_json(REDEFINE_PATHS, &body).await?;
        debug!(
            declared = paths.len(),
            returned = response.values.len(),
            "Paths declared"
        );
        Ok(response)
    }

    pub async fn fetch_orders(&self, credentials: &Credentials) -> Result<Orders, ApiError> {
        let orders: Orders = self.post_json(GET_ORDERS, credentials).await?;
        debug!(
            writes = orders.writes.len(),
            reads = orders.reads.len(),
            "Orders fetched"
        );
        Ok(orders)
    }

    pub async fn acknowledge_orders(
        &self,
        credentials: &Credentials,
        ack: &OrderAck,
    ) -> Result<(), ApiError> {
        let body = ConfirmRequest { credentials, ack };
        self.post(CONFIRM_ORDERS, &body).await?;
        Ok(())
    }

    pub async fn upload_values(
        &self,
        credentials: &Credentials,
        values: &WireValues,
    ) -> Result<(), ApiError> {
        let body = SyncRequest {
            credentials,
            values,
        };
        self.post(SYNC_VALUES, &body).await?;
        debug!(paths = values.len(), "Values uploaded");
        Ok(())
    }
}

// ============================================================================
// IRemoteApi implementation
// ============================================================================

#[async_trait]
impl IRemoteApi for LongshotClient {
    async fn declare_paths(
        &self,
        credentials: &Credentials,
        prefix: DevicePrefix,
        paths: &[String],
    ) -> anyhow::Result<DeclareResponse> {
        Ok(self.redefine_paths(credentials, prefix, paths).await?)
    }

    async fn get_orders(&self, credentials: &Credentials) -> anyhow::Result<Orders> {
        Ok(self.fetch_orders(credentials).await?)
    }

    async fn confirm_orders(&self, credentials: &Credentials, ack: &OrderAck) -> anyhow::Result<()> {
        Ok(self.acknowledge_orders(credentials, ack).await?)
    }

    async fn sync_values(&self, credentials: &Credentials, values: &WireValues) -> anyhow::Result<()> {
        Ok(self.upload_values(credentials, values).await?)
    }
}
