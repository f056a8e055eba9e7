//! OpenAPI documentation for the captioning API.
//!
//! Served as JSON at `/api-docs/openapi.json` and rendered with Scalar at `/docs`.

use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Captioner API",
        description = "Describe uploaded images with a vision model and a chat model, and download them renamed after their captions."
    ),
    servers((url = "/api", description = "Captioning API")),
    paths(api::handlers::images::process_images),
    tags((name = "images", description = "Batch image captioning"))
)]
pub struct ApiDoc;
