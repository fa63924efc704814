use hyper::StatusCode;
use thiserror::Error;

use crate::lightify::device::DeviceUpdateBuilderError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures of the Lightify synchronization layer.
///
/// Only `Network` failures are worth retrying, and nothing in this crate
/// retries them automatically.
#[derive(Debug, Error)]
pub enum Error {
    #[error("network error: {0}")]
    Network(#[from] hyper::Error),

    #[error("invalid request: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("invalid uri: {0}")]
    Uri(#[from] hyper::http::uri::InvalidUri),

    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_path_to_error::Error<serde_json::Error>),

    /// The credential exchange was rejected. Requires the operator to
    /// re-authorize the application and store a fresh refresh token.
    #[error("credential exchange rejected: {0}")]
    Auth(String),

    #[error("refresh token store: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("unexpected response status {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// Only types `DeviceUpdateBuilder::build`. Every field has a default, so
    /// building an update does not fail.
    #[error("invalid device update: {0}")]
    InvalidUpdate(#[from] DeviceUpdateBuilderError),
}

impl Error {
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::Status { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}
