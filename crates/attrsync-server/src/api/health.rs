//! Health and metrics endpoints
//!
//! - GET /health/liveness
//! - GET /health/readiness
//! - GET /metrics

use actix_web::{HttpResponse, Responder, get, web};

use attrsync_common::error::{QUEUE_UNAVAILABLE, RESOURCE_NOT_FOUND};

use crate::metrics::record_queue_stats;
use crate::model::{AppState, Result};

#[get("/liveness")]
pub async fn liveness() -> impl Responder {
    Result::<String>::http_success("ok")
}

/// Not ready once shutdown has begun
#[get("/readiness")]
pub async fn readiness(data: web::Data<AppState>) -> impl Responder {
    if data.is_ready() {
        Result::<String>::http_success("ok")
    } else {
        Result::<()>::http_error(503, &QUEUE_UNAVAILABLE, "server is shutting down")
    }
}

/// Prometheus text exposition
#[get("/metrics")]
pub async fn prometheus_metrics(data: web::Data<AppState>) -> HttpResponse {
    let Some(handle) = &data.prometheus else {
        return Result::<()>::http_error(404, &RESOURCE_NOT_FOUND, "metrics recorder not installed");
    };
    record_queue_stats(&data.queue.stats().await);
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(handle.render())
}
