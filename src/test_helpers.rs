//! Shared test utilities for the upload-shrink test suite.
//!
//! Synthetic images come from the `image` encoders so no binary fixtures
//! are checked in. Request builders wrap them the way API Gateway would.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let body = upload_body("X", "cat.png", &png_bytes(16, 16));
//! let request = base64_request(&body, "X");
//! ```

use crate::envelope::RequestEnvelope;
use crate::multipart::MultipartWriter;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};

// =========================================================================
// Synthetic images
// =========================================================================

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
    })
}

/// A valid PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = gradient(width, height);
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
    out
}

/// A valid baseline JPEG of the given size.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = gradient(width, height);
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 95)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
    out
}

const FOUR_COLOURS: [[u8; 3]; 4] = [[220, 40, 40], [40, 160, 60], [30, 60, 200], [240, 220, 90]];

/// Index into [`FOUR_COLOURS`]: 64px blocks, one colour each.
fn block_index(x: u32, y: u32) -> u8 {
    ((x / 64 + y / 64) % 4) as u8
}

/// A 2-bit indexed PNG with four colours laid out in 64px blocks.
pub fn indexed_png_bytes(width: u32, height: u32) -> Vec<u8> {
    let palette: Vec<u8> = FOUR_COLOURS.iter().flatten().copied().collect();
    let mut data = Vec::new();
    for y in 0..height {
        for x0 in (0..width).step_by(4) {
            let mut byte = 0u8;
            for (i, x) in (x0..(x0 + 4).min(width)).enumerate() {
                byte |= block_index(x, y) << (6 - 2 * i);
            }
            data.push(byte);
        }
    }

    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Two);
        encoder.set_palette(palette);
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(&data).unwrap();
        writer.finish().unwrap();
    }
    out
}

/// An RGB8 PNG using only four colours, scattered so rows do not repeat.
pub fn four_colour_rgb_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let index = ((x * 31 + y * 17) ^ (x * y)) % 4;
        image::Rgb(FOUR_COLOURS[index as usize])
    });
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
    out
}

/// GIF header bytes: sniffable, never accepted.
pub fn gif_bytes() -> Vec<u8> {
    b"GIF89a\x01\x00\x01\x00\x00\x00\x00;".to_vec()
}

/// A PNG with a `tEXt` chunk inserted right after `IHDR`.
pub fn png_with_text_chunk(width: u32, height: u32, keyword: &str, text: &str) -> Vec<u8> {
    let png = png_bytes(width, height);
    // 8-byte signature + IHDR (4 len + 4 type + 13 data + 4 crc)
    let ihdr_end = 8 + 25;

    let mut chunk_body = b"tEXt".to_vec();
    chunk_body.extend_from_slice(keyword.as_bytes());
    chunk_body.push(0);
    chunk_body.extend_from_slice(text.as_bytes());

    let mut out = png[..ihdr_end].to_vec();
    out.extend_from_slice(&((chunk_body.len() - 4) as u32).to_be_bytes());
    out.extend_from_slice(&chunk_body);
    out.extend_from_slice(&crc32(&chunk_body).to_be_bytes());
    out.extend_from_slice(&png[ihdr_end..]);
    out
}

fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &b in bytes {
        crc ^= b as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

// =========================================================================
// Requests
// =========================================================================

/// Multipart body with a single `upload` file part.
pub fn upload_body(boundary: &str, filename: &str, data: &[u8]) -> Vec<u8> {
    MultipartWriter::new(boundary)
        .file("upload", filename, "application/octet-stream", data)
        .finish()
}

/// Envelope carrying `body` base64-wrapped, as API Gateway sends binary.
pub fn base64_request(body: &[u8], boundary: &str) -> RequestEnvelope {
    RequestEnvelope::new(
        STANDARD.encode(body),
        &format!("multipart/form-data; boundary={boundary}"),
        true,
    )
}

#[test]
fn crc32_matches_known_vector() {
    assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
}

#[test]
fn text_chunk_png_still_decodes() {
    let png = png_with_text_chunk(4, 4, "Comment", "hello");
    let img = image::load_from_memory(&png).unwrap();
    assert_eq!((img.width(), img.height()), (4, 4));
}
