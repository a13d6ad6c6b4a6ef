//! Dispatch error types.

/// Errors from submitting telemetry.
#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
    #[error("Invalid endpoint URL: {0}")]
    InvalidEndpoint(String),
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("Request timed out")]
    Timeout,
    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },
}

impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::RequestFailed(err.to_string())
        }
    }
}
