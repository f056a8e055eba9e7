//! Packing captioned images into the ZIP archive returned to the client.
//!
//! Every readable image is decoded and re-encoded as PNG, then stored under the sanitized form of
//! its caption. Unreadable images are skipped. Entries keep the order of the upload and their
//! names are unique within the archive.

use image::ImageFormat;
use std::io::{Cursor, Write};
use tracing::{debug, info, warn};
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

use crate::captions::Caption;
use crate::captions::filename::{UniqueNames, sanitize};
use crate::types::UploadedImage;

/// Failures that leave no usable archive. These fail the whole batch.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Failed to write archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to write archive entry: {0}")]
    Io(#[from] std::io::Error),
}

fn reencode_png(bytes: &[u8]) -> image::ImageResult<Vec<u8>> {
    let decoded = image::load_from_memory(bytes)?;
    let mut out = Cursor::new(Vec::new());
    decoded.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

/// Build the archive for a batch. `captions[i]` belongs to `images[i]`; a missing caption gets the
/// fallback name. An archive with no entries is still a valid result.
pub fn build(captions: &[Option<Caption>], images: &[UploadedImage]) -> Result<Vec<u8>, ArchiveError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    // PNG payloads are already compressed
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let mut names = UniqueNames::new();
    let mut entries = 0usize;

    for (index, image) in images.iter().enumerate() {
        let png = match reencode_png(&image.bytes) {
            Ok(png) => png,
            Err(error) => {
                warn!(index, file_name = %image.name, error = %error, "Skipping unreadable image");
                continue;
            }
        };

        let caption = captions.get(index).and_then(Option::as_ref);
        let entry = names.claim(sanitize(caption.map(Caption::as_str))).file_name();

        zip.start_file(entry.as_str(), options)?;
        zip.write_all(&png)?;
        debug!(index, entry = %entry, size = png.len(), "Added archive entry");
        entries += 1;
    }

    let bytes = zip.finish()?.into_inner();
    info!(entries, skipped = images.len() - entries, size = bytes.len(), "Archive built");
    Ok(bytes)
}
