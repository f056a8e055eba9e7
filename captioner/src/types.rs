use bytes::Bytes;
use std::fmt;

/// One file received in an upload batch.
///
/// The bytes are reference counted, so handing an image to a worker task is a cheap clone and the
/// buffer is released once the last holder is done with it.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedImage {
    /// Original file name from the multipart part, or a positional placeholder
    pub name: String,
    pub bytes: Bytes,
}

impl UploadedImage {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

impl fmt::Debug for UploadedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedImage")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}
