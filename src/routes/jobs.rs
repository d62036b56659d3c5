// SPDX-License-Identifier: MIT

//! Queue introspection routes.

use crate::error::{AppError, Result};
use crate::services::processor::ActivityJob;
use crate::services::queue::{Job, QueueStats};
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use std::sync::Arc;

/// Queue introspection routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/queue/stats", get(queue_stats))
        .route("/api/queue/jobs/{id}", get(get_job))
}

/// Current job counts by status.
async fn queue_stats(State(state): State<Arc<AppState>>) -> Json<QueueStats> {
    Json(state.queue.stats())
}

/// Look up a job by id. Completed jobs are evicted after a short TTL, so a
/// 404 can mean "done and forgotten" as well as "never seen".
async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job<ActivityJob>>> {
    state
        .queue
        .get_job(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Job {}", id)))
}
