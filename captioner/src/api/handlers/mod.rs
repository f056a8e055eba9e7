//! Axum route handlers.

pub mod images;
