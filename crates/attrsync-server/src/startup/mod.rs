//! Application startup utilities module.

mod http;
mod logging;
mod shutdown;
mod sync;

pub use http::sync_server;
pub use logging::{LogRotation, LoggingConfig, LoggingGuard, init_logging};
pub use shutdown::{GracefulShutdown, ShutdownSignal, wait_for_shutdown_signal};
pub use sync::SyncComponents;
