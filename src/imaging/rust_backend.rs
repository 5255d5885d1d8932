//! Pure Rust re-encode transform.
//!
//! Everything is statically linked into the binary; no system image
//! libraries are loaded at runtime.
//!
//! ## Crate mapping
//!
//! | Step | Crate / function |
//! |---|---|
//! | Format detection | `image::guess_format` (magic bytes) |
//! | Decode (JPEG, PNG) | `image::load_from_memory_with_format` |
//! | Downsize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (configurable quality) |
//! | Encode → PNG (palette) | `color_quant::NeuQuant` + `png::Encoder` (indexed) |
//! | Encode → PNG (truecolour) | `image::codecs::png::PngEncoder` (adaptive filtering) |
//!
//! Output keeps the input's format. Decoding to pixels and encoding fresh
//! drops every ancillary chunk and APPn segment, so EXIF, IPTC, XMP and ICC
//! profiles never reach the response.
//!
//! When the image was not downsized and the re-encode is no smaller than
//! the upload, the upload itself is returned with its metadata cut out
//! (see [`strip`](super::strip)). The result is never larger than the
//! metadata-free original.

use super::backend::{ImageTransform, TransformError};
use super::calculations::fit_within;
use super::palette::Indexed;
use super::params::TransformParams;
use super::strip::strip_metadata;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, GenericImageView, ImageFormat};
use tracing::debug;

/// Re-encodes PNG and JPEG uploads with the configured parameters.
#[derive(Debug, Clone, Default)]
pub struct RustTransform {
    params: TransformParams,
}

impl RustTransform {
    pub fn new(params: TransformParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &TransformParams {
        &self.params
    }
}

impl ImageTransform for RustTransform {
    fn transform(&self, bytes: &[u8]) -> Result<Vec<u8>, TransformError> {
        let format = image::guess_format(bytes).map_err(TransformError::Decode)?;
        if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg) {
            return Err(TransformError::Unsupported(
                format.to_mime_type().to_string(),
            ));
        }

        let img =
            image::load_from_memory_with_format(bytes, format).map_err(TransformError::Decode)?;
        let source_dims = img.dimensions();
        let img = self.downsize(img);
        let downsized = img.dimensions() != source_dims;

        let mut out = Vec::with_capacity(bytes.len() / 2);
        match format {
            ImageFormat::Jpeg => encode_jpeg(&img, &mut out, self.params.jpeg_quality.as_u8())?,
            _ if self.params.png_palette => Indexed::from_rgba(&img.to_rgba8())
                .write_png(&mut out, self.params.png_compression)?,
            _ => encode_png(&img, &mut out, self.params)?,
        }

        if !downsized
            && let Some(stripped) = strip_metadata(bytes, format)
            && stripped.len() <= out.len()
        {
            debug!(
                format = format.to_mime_type(),
                input = bytes.len(),
                reencoded = out.len(),
                output = stripped.len(),
                "re-encode not smaller, keeping stripped original"
            );
            return Ok(stripped);
        }

        debug!(
            format = format.to_mime_type(),
            input = bytes.len(),
            output = out.len(),
            "re-encoded image"
        );
        Ok(out)
    }
}

impl RustTransform {
    fn downsize(&self, img: DynamicImage) -> DynamicImage {
        let Some(max_edge) = self.params.max_dimension else {
            return img;
        };
        let (width, height) = img.dimensions();
        let (w, h) = fit_within((width, height), max_edge);
        if (w, h) == (width, height) {
            return img;
        }
        debug!(from = ?(width, height), to = ?(w, h), "downsizing");
        img.resize_exact(w, h, FilterType::Lanczos3)
    }
}

/// JPEG has no alpha; grey stays grey, everything else goes to RGB8.
fn encode_jpeg(img: &DynamicImage, out: &mut Vec<u8>, quality: u8) -> Result<(), TransformError> {
    let flattened = match img.color() {
        ColorType::L8 => None,
        ColorType::L16 | ColorType::La8 | ColorType::La16 => {
            Some(DynamicImage::ImageLuma8(img.to_luma8()))
        }
        ColorType::Rgb8 => None,
        _ => Some(DynamicImage::ImageRgb8(img.to_rgb8())),
    };
    let source = flattened.as_ref().unwrap_or(img);
    source
        .write_with_encoder(JpegEncoder::new_with_quality(out, quality))
        .map_err(TransformError::Encode)
}

fn encode_png(
    img: &DynamicImage,
    out: &mut Vec<u8>,
    params: TransformParams,
) -> Result<(), TransformError> {
    let encoder =
        PngEncoder::new_with_quality(out, params.png_compression.to_encoder(), PngFilter::Adaptive);
    img.write_with_encoder(encoder)
        .map_err(TransformError::Encode)
}
