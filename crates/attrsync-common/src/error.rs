//! Error types and error codes for attrsync
//!
//! This module defines:
//! - `RegistryError`: closed set of outcomes reported by the external registry
//! - `StoreError`: failures reading the canonical attribute store
//! - `EnqueueError`: failures handing an id to the sync request queue
//! - `QueueError`: misuse of queue receipts and dead-letter handles
//! - `SyncError`: outcome taxonomy of one reconcile call
//! - `ErrorCode`: structured error codes for API responses

use serde::{Deserialize, Serialize};

/// Errors reported by the external registry
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry group '{0}' not found")]
    NotFound(String),

    #[error("transient registry error: {0}")]
    Transient(String),

    #[error("fatal registry error: {0}")]
    Fatal(String),
}

/// Errors reported by the attribute store
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("attribute store unavailable: {0}")]
    Unavailable(String),

    #[error("attribute store returned invalid data: {0}")]
    InvalidData(String),
}

/// Errors surfaced by the enqueue API
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("attribute id must not be empty")]
    InvalidId,

    #[error("sync queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("failed to serialize sync message: {0}")]
    Serialization(String),
}

/// Errors raised by queue bookkeeping operations
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("unknown or expired receipt '{0}'")]
    UnknownReceipt(String),

    #[error("dead-letter message '{0}' not found")]
    UnknownDeadLetter(String),

    #[error("queue is closed")]
    Closed,
}

/// Outcome taxonomy of a single reconcile call
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Neither the store nor the registry knows the id
    #[error("attribute '{0}' not found in store or registry")]
    NotFound(String),

    /// Eligible for redelivery by the queue
    #[error("transient failure: {0}")]
    Transient(String),

    /// Unusable registry response; needs operator attention
    #[error("fatal configuration error: {0}")]
    Fatal(String),

    /// The queue delivered a body that is not a sync message
    #[error("invalid sync message: {0}")]
    InvalidMessage(String),
}

impl SyncError {
    /// Whether the queue should redeliver the message
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transient(_))
    }

    /// Short label used for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::NotFound(_) => "not_found",
            SyncError::Transient(_) => "transient",
            SyncError::Fatal(_) => "fatal",
            SyncError::InvalidMessage(_) => "invalid_message",
        }
    }
}

impl From<RegistryError> for SyncError {
    /// A `NotFound` reaching this conversion comes from a write path: the
    /// group vanished between read and write, so the next delivery will
    /// observe the new state.
    fn from(value: RegistryError) -> Self {
        match value {
            RegistryError::NotFound(name) => {
                SyncError::Transient(format!("registry group '{}' vanished during write", name))
            }
            RegistryError::Transient(msg) => SyncError::Transient(msg),
            RegistryError::Fatal(msg) => SyncError::Fatal(msg),
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(value: StoreError) -> Self {
        SyncError::Transient(value.to_string())
    }
}

/// Error code structure for API responses
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ErrorCode<'a> {
    pub code: i32,
    pub message: &'a str,
}

pub const SUCCESS: ErrorCode<'static> = ErrorCode {
    code: 0,
    message: "success",
};

pub const PARAMETER_MISSING: ErrorCode<'static> = ErrorCode {
    code: 10000,
    message: "parameter missing",
};

pub const RESOURCE_NOT_FOUND: ErrorCode<'static> = ErrorCode {
    code: 20004,
    message: "resource not found",
};

pub const QUEUE_UNAVAILABLE: ErrorCode<'static> = ErrorCode {
    code: 24000,
    message: "sync queue unavailable",
};

pub const DEAD_LETTER_NOT_FOUND: ErrorCode<'static> = ErrorCode {
    code: 24001,
    message: "dead-letter message not found",
};

pub const SWEEP_FAILED: ErrorCode<'static> = ErrorCode {
    code: 24002,
    message: "reconciliation sweep failed",
};

pub const SERVER_ERROR: ErrorCode<'static> = ErrorCode {
    code: 30000,
    message: "server error",
};
