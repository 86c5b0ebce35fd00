//! Client error types and their mapping onto the sync error taxonomy

use attrsync_common::{RegistryError, StoreError};
use reqwest::StatusCode;

/// Error type for HTTP adapter operations
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Statuses worth retrying: 408, 429 and every 5xx
pub fn is_transient_status(status: u16) -> bool {
    StatusCode::from_u16(status).is_ok_and(|s| {
        s == StatusCode::REQUEST_TIMEOUT
            || s == StatusCode::TOO_MANY_REQUESTS
            || s.is_server_error()
    })
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::RequestFailed { status, .. } if *status == StatusCode::NOT_FOUND.as_u16())
    }

    /// Whether a later attempt may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::RequestFailed { status, .. } => is_transient_status(*status),
            ClientError::Http(e) => !e.is_decode() && !e.is_builder(),
            ClientError::Serialization(_) | ClientError::InvalidUrl(_) => false,
            ClientError::Other(_) => true,
        }
    }

    /// Map onto the registry taxonomy; `name` is the group addressed
    pub fn into_registry_error(self, name: &str) -> RegistryError {
        if self.is_not_found() {
            RegistryError::NotFound(name.to_string())
        } else if self.is_transient() {
            RegistryError::Transient(self.to_string())
        } else {
            RegistryError::Fatal(self.to_string())
        }
    }

    pub fn into_store_error(self) -> StoreError {
        if self.is_transient() {
            StoreError::Unavailable(self.to_string())
        } else {
            StoreError::InvalidData(self.to_string())
        }
    }
}
