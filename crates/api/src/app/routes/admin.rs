//! Operator routes for queue inspection and recovery.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use talentbridge_core::JobId;
use talentbridge_infra::NotificationService;

use crate::app::dto::ListJobsQuery;
use crate::app::errors;

pub fn router() -> Router {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/counts", get(counts))
        .route("/jobs/:id/audit", get(audit_trail))
        .route("/jobs/:id/retry", post(retry_failed))
}

fn parse_job_id(raw: &str) -> Result<JobId, axum::response::Response> {
    raw.parse::<JobId>().map_err(|_| errors::invalid_id("job id", raw))
}

/// GET /admin/notifications/jobs?state=&offset=&limit=
pub async fn list_jobs(
    Extension(service): Extension<Arc<NotificationService>>,
    Query(query): Query<ListJobsQuery>,
) -> axum::response::Response {
    match service.list_jobs(query.state, query.offset, query.limit).await {
        Ok(jobs) => Json(jobs).into_response(),
        Err(e) => errors::queue_error_to_response(e),
    }
}

/// GET /admin/notifications/counts
pub async fn counts(Extension(service): Extension<Arc<NotificationService>>) -> axum::response::Response {
    match service.counts().await {
        Ok(counts) => Json(counts).into_response(),
        Err(e) => errors::queue_error_to_response(e),
    }
}

/// GET /admin/notifications/jobs/:id/audit
pub async fn audit_trail(
    Extension(service): Extension<Arc<NotificationService>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id = match parse_job_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match service.audit_trail(job_id).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => errors::audit_error_to_response(e),
    }
}

/// POST /admin/notifications/jobs/:id/retry
pub async fn retry_failed(
    Extension(service): Extension<Arc<NotificationService>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id = match parse_job_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match service.retry_failed(job_id).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => errors::queue_error_to_response(e),
    }
}
