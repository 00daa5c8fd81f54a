//! HTTP API application wiring (Axum router + shared service handle).
//!
//! - `routes/`: HTTP routes + handlers, one file per surface
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use talentbridge_infra::NotificationService;

pub mod dto;
pub mod errors;
pub mod routes;

/// Build the full HTTP router around an already-constructed service.
///
/// Workers are not started here; the binary (or a test) decides whether to
/// spawn them.
pub fn build_app(service: Arc<NotificationService>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(ServiceBuilder::new().layer(Extension(service)))
}
