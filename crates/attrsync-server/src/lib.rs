// attrsync server: operator HTTP surface, configuration and process wiring

pub mod api; // HTTP handlers and routes
pub mod metrics; // Metrics and observability
pub mod model; // Configuration, responses and shared state
pub mod startup; // Application startup utilities
