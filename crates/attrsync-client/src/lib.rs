//! attrsync Client - HTTP adapters
//!
//! Implements the `AttributeStore` and `RegistryClient` traits against remote
//! JSON services so the synchronizer can run outside of tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use attrsync_client::{HttpClientConfig, HttpRegistryClient};
//!
//! let registry = HttpRegistryClient::new(&HttpClientConfig::new("http://registry:8080"))?;
//! let group = registry.get("ATTRSYNC.ENV.PROD").await?;
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod registry;
pub mod store;

pub use config::HttpClientConfig;
pub use error::{ClientError, Result};
pub use http::SyncHttpClient;
pub use registry::HttpRegistryClient;
pub use store::HttpAttributeStore;
