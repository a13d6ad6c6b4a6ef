//! Configuration types.

use serde::{Deserialize, Serialize};

use crate::pipeline::DEFAULT_BATCH_SIZE;
use crate::relay::DEFAULT_QUEUE_CAPACITY;

use super::ConfigError;

/// Environment variable overriding `api_endpoint`.
pub const ENV_API_URL: &str = "KILOMETERS_API_URL";
/// Environment variable overriding `api_key`.
pub const ENV_API_KEY: &str = "KILOMETERS_API_KEY";
/// Environment variable overriding `customer_id`.
pub const ENV_CUSTOMER_ID: &str = "KILOMETERS_CUSTOMER_ID";
/// Environment variable enabling debug output.
pub const ENV_DEBUG: &str = "KM_DEBUG";
/// Environment variable overriding `batch_size`.
pub const ENV_BATCH_SIZE: &str = "KM_BATCH_SIZE";
/// Environment variable overriding `queue_capacity`.
pub const ENV_QUEUE_CAPACITY: &str = "KM_QUEUE_CAPACITY";

fn default_api_endpoint() -> String {
    "http://localhost:5194".to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_telemetry() -> bool {
    true
}

/// Resolved configuration for the interceptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KmConfig {
    /// Base URL of the collection API.
    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,
    /// Bearer token for the collection API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Customer identifier stamped on every event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    /// Events per submitted batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Events buffered between relays and pipeline before dropping.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Log every captured payload.
    #[serde(default)]
    pub debug: bool,
    /// Submit batches to the API. When off, batches are only logged.
    #[serde(default = "default_telemetry")]
    pub telemetry: bool,
}

impl Default for KmConfig {
    fn default() -> Self {
        Self {
            api_endpoint: default_api_endpoint(),
            api_key: None,
            customer_id: None,
            batch_size: default_batch_size(),
            queue_capacity: default_queue_capacity(),
            debug: false,
            telemetry: default_telemetry(),
        }
    }
}

/// Whether a `KM_DEBUG` value turns debug mode on.
#[must_use]
pub fn debug_enabled(value: &str) -> bool {
    matches!(value.trim(), "true" | "1")
}

fn parse_positive(value: &str) -> Option<usize> {
    value.trim().parse::<usize>().ok().filter(|n| *n > 0)
}

impl KmConfig {
    /// Apply environment overrides through `lookup`.
    ///
    /// Empty values are ignored, as are numeric values that are not
    /// positive integers.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(endpoint) = get(ENV_API_URL) {
            self.api_endpoint = endpoint;
        }
        if let Some(key) = get(ENV_API_KEY) {
            self.api_key = Some(key);
        }
        if let Some(customer) = get(ENV_CUSTOMER_ID) {
            self.customer_id = Some(customer);
        }
        if let Some(debug) = get(ENV_DEBUG) {
            self.debug = debug_enabled(&debug);
        }
        if let Some(size) = get(ENV_BATCH_SIZE) {
            match parse_positive(&size) {
                Some(n) => self.batch_size = n,
                None => tracing::warn!(value = %size, "Ignoring invalid {ENV_BATCH_SIZE}"),
            }
        }
        if let Some(capacity) = get(ENV_QUEUE_CAPACITY) {
            match parse_positive(&capacity) {
                Some(n) => self.queue_capacity = n,
                None => tracing::warn!(value = %capacity, "Ignoring invalid {ENV_QUEUE_CAPACITY}"),
            }
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_process_env(&mut self) {
        self.apply_env(|name| std::env::var(name).ok());
    }

    /// Check value ranges and the endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "queue_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        let url = url::Url::parse(&self.api_endpoint).map_err(|e| ConfigError::Invalid {
            field: "api_endpoint",
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                field: "api_endpoint",
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }
        Ok(())
    }
}
