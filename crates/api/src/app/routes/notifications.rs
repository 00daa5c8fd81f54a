//! Producer-facing routes: enqueue, status polling, and preference writes.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};

use talentbridge_core::UserId;
use talentbridge_infra::NotificationService;
use talentbridge_notifications::{NotificationType, Preference};

use crate::app::dto::{EnqueueRequest, EnqueueResponse, UpsertPreferenceRequest};
use crate::app::errors;

pub fn router() -> Router {
    Router::new()
        .route("/jobs", post(enqueue))
        .route("/jobs/:id", get(get_status))
        .route("/preferences/:user_id", put(upsert_preference))
}

/// POST /notifications/jobs
///
/// HTTP producers never get the admin rate-limit bypass.
pub async fn enqueue(
    Extension(service): Extension<Arc<NotificationService>>,
    Json(body): Json<EnqueueRequest>,
) -> axum::response::Response {
    let delay = Duration::from_millis(body.delay_ms);
    match service.enqueue_json(body.payload, body.priority, delay, false).await {
        Ok(job_id) => (StatusCode::ACCEPTED, Json(EnqueueResponse { job_id })).into_response(),
        Err(e) => errors::enqueue_error_to_response(e),
    }
}

/// GET /notifications/jobs/:id
pub async fn get_status(
    Extension(service): Extension<Arc<NotificationService>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match service.get_status(&id).await {
        Ok(Some(view)) => Json(view).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", format!("job not found: {id}")),
        Err(e) => errors::queue_error_to_response(e),
    }
}

/// PUT /notifications/preferences/:user_id
pub async fn upsert_preference(
    Extension(service): Extension<Arc<NotificationService>>,
    Path(user_id): Path<String>,
    Json(body): Json<UpsertPreferenceRequest>,
) -> axum::response::Response {
    let Ok(user_id) = user_id.parse::<UserId>() else {
        return errors::invalid_id("user id", &user_id);
    };

    let preference = Preference {
        user_id,
        kind: NotificationType::new(body.kind),
        email: body.email,
        in_app: body.in_app,
        enabled: body.enabled,
    };

    match service.upsert_preference(preference.clone()).await {
        Ok(()) => Json(preference).into_response(),
        Err(e) => errors::repository_error_to_response(e),
    }
}
