//! HTTP client for the Kilometers collection API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use url::Url;

use crate::config::KmConfig;
use crate::event::Batch;

use super::{BatchDto, DispatchError};

/// Connection timeout for HTTP requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Overall request timeout for HTTP requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Path batches are posted to.
const BATCH_PATH: &str = "api/events/batch";

/// Path probed by the health check.
const HEALTH_PATH: &str = "health";

/// Destination for completed batches.
///
/// Results are only ever logged by the caller; a failed batch is dropped.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Submit one batch.
    async fn send_batch(&self, batch: &Batch) -> Result<(), DispatchError>;

    /// Check that the destination is reachable.
    async fn health_check(&self) -> Result<(), DispatchError>;
}

/// Build an HTTP client with proper timeout configuration.
fn build_http_client() -> Result<Client, DispatchError> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| DispatchError::Client(e.to_string()))
}

/// Join a relative path onto the endpoint, keeping any base path.
fn endpoint_url(base: &Url, path: &str) -> Result<Url, DispatchError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path)
        .map_err(|e| DispatchError::InvalidEndpoint(e.to_string()))
}

/// Dispatcher posting batches to the collection API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    batch_url: Url,
    health_url: Url,
    api_key: Option<String>,
    customer_id: Option<String>,
}

impl ApiClient {
    /// Create a client for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::InvalidEndpoint` if the URL does not parse, or
    /// `DispatchError::Client` if the HTTP client cannot be built.
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        customer_id: Option<String>,
    ) -> Result<Self, DispatchError> {
        let base =
            Url::parse(endpoint).map_err(|e| DispatchError::InvalidEndpoint(e.to_string()))?;

        Ok(Self {
            client: build_http_client()?,
            batch_url: endpoint_url(&base, BATCH_PATH)?,
            health_url: endpoint_url(&base, HEALTH_PATH)?,
            api_key: api_key.filter(|k| !k.is_empty()),
            customer_id,
        })
    }

    /// Create a client from resolved configuration.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::new`].
    pub fn from_config(config: &KmConfig) -> Result<Self, DispatchError> {
        Self::new(
            &config.api_endpoint,
            config.api_key.clone(),
            config.customer_id.clone(),
        )
    }

    /// URL batches are posted to.
    #[must_use]
    pub fn batch_url(&self) -> &Url {
        &self.batch_url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl Dispatcher for ApiClient {
    async fn send_batch(&self, batch: &Batch) -> Result<(), DispatchError> {
        if batch.is_empty() {
            return Ok(());
        }

        let body = BatchDto::from_batch(batch, self.customer_id.as_deref());
        tracing::debug!(
            events = batch.len(),
            url = %self.batch_url,
            "Sending event batch"
        );

        let response = self
            .authorize(self.client.post(self.batch_url.clone()))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(events = batch.len(), status = status.as_u16(), "Batch accepted");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), DispatchError> {
        let response = self
            .authorize(self.client.get(self.health_url.clone()))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DispatchError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}
