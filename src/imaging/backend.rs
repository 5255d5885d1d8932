//! Transform capability trait and its error type.
//!
//! The pipeline treats the transform as an opaque, synchronous,
//! side-effect-free call: raw image bytes in, transformed bytes out. The
//! production implementation is
//! [`RustTransform`](super::rust_backend::RustTransform); tests substitute
//! a recording mock.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
    #[error("failed to encode palette image: {0}")]
    Palette(#[source] png::EncodingError),
    #[error("unsupported image format: {0}")]
    Unsupported(String),
    #[error("processing failed: {0}")]
    ProcessingFailed(String),
}

/// Bytes in, transformed bytes out.
///
/// `Send + Sync` so one instance can serve every invocation of a
/// long-lived host process.
pub trait ImageTransform: Send + Sync {
    fn transform(&self, bytes: &[u8]) -> Result<Vec<u8>, TransformError>;
}

impl<T: ImageTransform + ?Sized> ImageTransform for &T {
    fn transform(&self, bytes: &[u8]) -> Result<Vec<u8>, TransformError> {
        (**self).transform(bytes)
    }
}

impl<T: ImageTransform + ?Sized> ImageTransform for Box<T> {
    fn transform(&self, bytes: &[u8]) -> Result<Vec<u8>, TransformError> {
        (**self).transform(bytes)
    }
}
