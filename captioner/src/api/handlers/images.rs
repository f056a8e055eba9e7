use axum::{
    extract::{Multipart, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::IntoResponse,
};
use tracing::{debug, info};

use crate::AppState;
use crate::archive;
use crate::errors::{Error, Result};
use crate::types::UploadedImage;

/// Multipart part name carrying the images.
pub const IMAGES_FIELD: &str = "images";

const ARCHIVE_CONTENT_DISPOSITION: &str = "attachment; filename=\"processed_images.zip\"";

fn multipart_error(error: MultipartError) -> Error {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge {
            message: format!("Upload exceeds the maximum allowed size: {}", error.body_text()),
        }
    } else {
        Error::BadRequest {
            message: format!("Failed to parse multipart data: {}", error.body_text()),
        }
    }
}

/// Collect every `images` part, in upload order. Other parts are ignored.
async fn read_images(multipart: &mut Multipart) -> Result<Vec<UploadedImage>> {
    let mut images = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(IMAGES_FIELD) {
            debug!(field = ?field.name(), "Ignoring multipart field");
            continue;
        }

        let name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("image-{}", images.len() + 1));
        let bytes = field.bytes().await.map_err(multipart_error)?;
        images.push(UploadedImage::new(name, bytes));
    }

    Ok(images)
}

#[utoipa::path(
    post,
    path = "/images/process",
    tag = "images",
    summary = "Caption and rename images",
    description = "Caption every uploaded image and return all of them in a ZIP archive, each entry named after its caption \
                   and re-encoded as PNG. Images that cannot be captioned are named `image.png`; images that cannot be decoded \
                   are left out. Repeated names get a numeric suffix.",
    request_body(
        content_type = "multipart/form-data",
        description = "One or more image files, each in a part named `images`"
    ),
    responses(
        (status = 200, description = "ZIP archive `processed_images.zip`", body = Vec<u8>, content_type = "application/octet-stream"),
        (status = 400, description = "Malformed multipart body or no images"),
        (status = 413, description = "Payload too large"),
        (status = 500, description = "The batch could not be processed")
    )
)]
pub async fn process_images(State(state): State<AppState>, mut multipart: Multipart) -> Result<impl IntoResponse> {
    let images = read_images(&mut multipart).await?;
    if images.is_empty() {
        return Err(Error::BadRequest {
            message: format!("No images provided in the '{IMAGES_FIELD}' field"),
        });
    }
    info!(count = images.len(), "Received {} files", images.len());

    let captions = state.batch.captions(&images).await;

    let archive = tokio::task::spawn_blocking(move || archive::build(&captions, &images))
        .await
        .map_err(|e| Error::Other(anyhow::Error::new(e).context("Archive task did not complete")))??;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream"),
            (header::CONTENT_DISPOSITION, ARCHIVE_CONTENT_DISPOSITION),
        ],
        archive,
    ))
}
