//! HTTP API: producer, status, and operator endpoints for the notification queue.

pub mod app;
