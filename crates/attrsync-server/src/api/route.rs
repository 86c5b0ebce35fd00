//! API routing configuration

use actix_web::{Scope, web};

use super::{health, sync};

/// Sync operator routes
///
/// Routes:
/// - POST /v1/sync/enqueue
/// - GET /v1/sync/dead-letters
/// - POST /v1/sync/dead-letters/{messageId}/replay
/// - DELETE /v1/sync/dead-letters
/// - POST /v1/sync/sweep
/// - GET /v1/sync/stats
pub fn sync_routes() -> Scope {
    web::scope("/v1/sync")
        .service(sync::enqueue)
        .service(sync::list_dead_letters)
        .service(sync::replay_dead_letter)
        .service(sync::purge_dead_letters)
        .service(sync::sweep)
        .service(sync::stats)
}

/// Health routes
///
/// Routes:
/// - GET /health/liveness
/// - GET /health/readiness
pub fn health_routes() -> Scope {
    web::scope("/health")
        .service(health::liveness)
        .service(health::readiness)
}

/// Register every route on an application
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(sync_routes())
        .service(health_routes())
        .service(health::prometheus_metrics);
}
