//! Sync operator API handlers
//!
//! - POST /v1/sync/enqueue - Request a sync for one attribute id
//! - GET /v1/sync/dead-letters - List dead-lettered messages
//! - POST /v1/sync/dead-letters/{messageId}/replay - Return a message to the queue
//! - DELETE /v1/sync/dead-letters - Discard all dead-lettered messages
//! - POST /v1/sync/sweep - Run a reconciliation sweep now
//! - GET /v1/sync/stats - Queue counters

use actix_web::{HttpResponse, Responder, delete, get, post, web};
use serde::Deserialize;
use tracing::{info, warn};

use attrsync_common::error::{
    DEAD_LETTER_NOT_FOUND, PARAMETER_MISSING, QUEUE_UNAVAILABLE, SERVER_ERROR, SWEEP_FAILED,
};
use attrsync_common::{EnqueueError, QueueError, normalize_id};

use crate::model::{AppState, Result};

#[derive(Debug, Deserialize)]
pub struct EnqueueParam {
    #[serde(default)]
    pub id: String,
}

/// Request a sync for one attribute id
///
/// POST /v1/sync/enqueue
#[post("/enqueue")]
pub async fn enqueue(data: web::Data<AppState>, body: web::Json<EnqueueParam>) -> impl Responder {
    match data.enqueuer.enqueue(&body.id).await {
        Ok(()) => Result::<String>::http_success(normalize_id(&body.id)),
        Err(EnqueueError::InvalidId) => Result::<()>::http_error(
            400,
            &PARAMETER_MISSING,
            "Required parameter 'id' is missing",
        ),
        Err(e @ EnqueueError::QueueUnavailable(_)) => {
            Result::<()>::http_error(503, &QUEUE_UNAVAILABLE, &e.to_string())
        }
        Err(e) => Result::<()>::http_error(500, &SERVER_ERROR, &e.to_string()),
    }
}

/// List dead-lettered messages, oldest first
///
/// GET /v1/sync/dead-letters
#[get("/dead-letters")]
pub async fn list_dead_letters(data: web::Data<AppState>) -> impl Responder {
    Result::<()>::http_success(data.queue.dead_letters().await)
}

/// Return one dead-lettered message to the queue with a fresh retry budget
///
/// POST /v1/sync/dead-letters/{messageId}/replay
#[post("/dead-letters/{message_id}/replay")]
pub async fn replay_dead_letter(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let message_id = path.into_inner();
    match data.queue.replay_dead_letter(&message_id).await {
        Ok(()) => {
            info!("Replayed dead-letter message {}", message_id);
            Result::<bool>::http_success(true)
        }
        Err(e @ QueueError::UnknownDeadLetter(_)) => {
            Result::<()>::http_error(404, &DEAD_LETTER_NOT_FOUND, &e.to_string())
        }
        Err(e @ QueueError::Closed) => {
            Result::<()>::http_error(503, &QUEUE_UNAVAILABLE, &e.to_string())
        }
        Err(e) => Result::<()>::http_error(500, &SERVER_ERROR, &e.to_string()),
    }
}

/// Discard every dead-lettered message
///
/// DELETE /v1/sync/dead-letters
#[delete("/dead-letters")]
pub async fn purge_dead_letters(data: web::Data<AppState>) -> impl Responder {
    let purged = data.queue.purge_dead_letters().await;
    warn!("Purged {} dead-letter messages", purged);
    Result::<usize>::http_success(purged)
}

/// Run a reconciliation sweep immediately and report what it enqueued
///
/// POST /v1/sync/sweep
#[post("/sweep")]
pub async fn sweep(data: web::Data<AppState>) -> HttpResponse {
    match data.periodic.sweep().await {
        Ok(report) => Result::<()>::http_success(report),
        Err(e) => Result::<()>::http_error(503, &SWEEP_FAILED, &e.to_string()),
    }
}

/// Queue counters
///
/// GET /v1/sync/stats
#[get("/stats")]
pub async fn stats(data: web::Data<AppState>) -> impl Responder {
    Result::<()>::http_success(data.queue.stats().await)
}
