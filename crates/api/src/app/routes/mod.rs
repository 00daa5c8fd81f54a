use axum::Router;

pub mod admin;
pub mod notifications;
pub mod system;

/// Router for the producer and operator surfaces.
pub fn router() -> Router {
    Router::new()
        .nest("/notifications", notifications::router())
        .nest("/admin/notifications", admin::router())
}
