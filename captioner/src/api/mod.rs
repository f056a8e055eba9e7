//! HTTP API.
//!
//! - **[`handlers`]**: Axum route handlers
//!
//! Routes are mounted under `/api` by [`crate::build_router`]:
//!
//! - `POST /api/images/process`: caption a batch of images and download them as a ZIP archive

pub mod handlers;
