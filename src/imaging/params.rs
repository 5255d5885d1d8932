//! Parameter types for the re-encode transform.
//!
//! These describe *what* the transform should produce, not how. They are
//! filled from the `[transform]` config section and handed to
//! [`RustTransform`](super::rust_backend::RustTransform).
//!
//! ## Types
//!
//! - [`Quality`]: JPEG encoding quality (1–100, default 80). Clamped on construction.
//! - [`PngCompression`]: zlib effort for PNG output.
//! - `png_palette`: indexed-colour PNG output (on by default).
//! - [`TransformParams`]: everything one transform call needs.

use serde::{Deserialize, Serialize};

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// The encoder-facing `u8` form.
    pub fn as_u8(self) -> u8 {
        self.0 as u8
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

/// PNG compression effort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PngCompression {
    Fast,
    #[default]
    Default,
    Best,
}

impl PngCompression {
    pub(crate) fn to_encoder(self) -> image::codecs::png::CompressionType {
        use image::codecs::png::CompressionType;
        match self {
            Self::Fast => CompressionType::Fast,
            Self::Default => CompressionType::Default,
            Self::Best => CompressionType::Best,
        }
    }

    pub(crate) fn to_png(self) -> png::Compression {
        match self {
            Self::Fast => png::Compression::Fast,
            Self::Default => png::Compression::Default,
            Self::Best => png::Compression::Best,
        }
    }
}

/// Everything one re-encode needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformParams {
    pub jpeg_quality: Quality,
    pub png_compression: PngCompression,
    /// Write PNGs as indexed colour, quantizing to 256 colours when needed.
    pub png_palette: bool,
    /// Longest allowed edge; larger images are downsized.
    pub max_dimension: Option<u32>,
}

impl Default for TransformParams {
    fn default() -> Self {
        Self {
            jpeg_quality: Quality::default(),
            png_compression: PngCompression::default(),
            png_palette: true,
            max_dimension: None,
        }
    }
}
