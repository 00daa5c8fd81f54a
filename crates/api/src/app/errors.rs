use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use talentbridge_infra::EnqueueError;
use talentbridge_infra::audit::AuditError;
use talentbridge_infra::jobs::QueueError;
use talentbridge_infra::repositories::RepositoryError;

pub fn enqueue_error_to_response(err: EnqueueError) -> axum::response::Response {
    match err {
        EnqueueError::InvalidPayload(e) => json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()),
        EnqueueError::RateLimited(_) => json_error(StatusCode::TOO_MANY_REQUESTS, "rate_limited", err.to_string()),
        EnqueueError::RateLimiterUnavailable(e) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "rate_limiter_unavailable", e.to_string())
        }
        EnqueueError::Persistence(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "persistence_error", e.to_string())
        }
        EnqueueError::Queue(e) => queue_error_to_response(e),
    }
}

pub fn queue_error_to_response(err: QueueError) -> axum::response::Response {
    match err {
        QueueError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        QueueError::AlreadyExists(_) => json_error(StatusCode::CONFLICT, "conflict", err.to_string()),
        QueueError::InvalidState { .. } => json_error(StatusCode::CONFLICT, "invalid_state", err.to_string()),
        QueueError::Storage(_) | QueueError::Serialization(_) | QueueError::Poisoned => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "queue_error", err.to_string())
        }
    }
}

pub fn repository_error_to_response(err: RepositoryError) -> axum::response::Response {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "repository_error", err.to_string())
}

pub fn audit_error_to_response(err: AuditError) -> axum::response::Response {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "audit_error", err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn invalid_id(kind: &'static str, raw: &str) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {kind}: {raw}"))
}
