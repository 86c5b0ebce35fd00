//! Data models module
//!
//! - `constants` - Configuration keys and defaults
//! - `config` - Configuration management
//! - `response` - HTTP response wrapper
//! - `app_state` - Application state shared across handlers

pub mod app_state;
pub mod config;
pub mod constants;
pub mod response;

pub use app_state::AppState;
pub use config::{Backend, Cli, Configuration};
pub use response::Result;
