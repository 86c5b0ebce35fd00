//! attrsync Common - Shared types, traits, and error taxonomy
//!
//! This crate provides the foundational types used across all attrsync components:
//! - Attribute and registry group model, id and name derivation
//! - Error types and error codes
//! - Collaborator traits for dependency injection

pub mod error;
pub mod model;
pub mod traits;

// Re-exports for convenience
pub use error::{EnqueueError, ErrorCode, QueueError, RegistryError, StoreError, SyncError};
pub use model::{
    Attribute, AttributePage, RegistryGroup, SyncMessage, attribute_id, build_payload,
    group_name, is_blank_id, missing_tags, normalize_id,
};
pub use traits::*;

/// Default application name written into the `managedBy` tag
pub const DEFAULT_APPLICATION_NAME: &str = "attrsync";

/// Default registry group name prefix
pub const DEFAULT_GROUP_PREFIX: &str = "ATTRSYNC";
