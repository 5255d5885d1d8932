//! Palette (indexed-colour) PNG output.
//!
//! Images with at most 256 distinct RGBA colours get an exact palette and
//! lose nothing. Anything richer is quantized to 256 colours with NeuQuant.
//! Indices are packed at the smallest bit depth the palette allows.

use super::backend::TransformError;
use super::params::PngCompression;
use color_quant::NeuQuant;
use image::RgbaImage;
use std::collections::HashMap;

/// NeuQuant sampling factor: 1 is slowest and best, 30 fastest.
const SAMPLE_FACTOR: i32 = 10;
const MAX_COLORS: usize = 256;

/// An image as palette indices, one byte per pixel before packing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indexed {
    pub width: u32,
    pub height: u32,
    pub palette: Vec<[u8; 4]>,
    pub indices: Vec<u8>,
}

impl Indexed {
    /// Exact palette when possible, NeuQuant otherwise.
    pub fn from_rgba(img: &RgbaImage) -> Self {
        exact(img).unwrap_or_else(|| quantize(img))
    }

    fn bit_depth(&self) -> png::BitDepth {
        match self.palette.len() {
            0..=2 => png::BitDepth::One,
            3..=4 => png::BitDepth::Two,
            5..=16 => png::BitDepth::Four,
            _ => png::BitDepth::Eight,
        }
    }

    /// Rows packed MSB-first at `bit_depth`, each row padded to a byte.
    fn packed_rows(&self) -> Vec<u8> {
        let bits = self.bit_depth() as usize;
        if bits == 8 {
            return self.indices.clone();
        }
        let per_byte = 8 / bits;
        let width = self.width as usize;
        let row_bytes = width.div_ceil(per_byte);
        let mut out = Vec::with_capacity(row_bytes * self.height as usize);
        for row in self.indices.chunks(width.max(1)) {
            for group in row.chunks(per_byte) {
                let mut byte = 0u8;
                for (i, &index) in group.iter().enumerate() {
                    byte |= index << (8 - bits * (i + 1));
                }
                out.push(byte);
            }
        }
        out
    }

    /// Encode as an indexed PNG, with `tRNS` only when some entry is not opaque.
    pub fn write_png(
        &self,
        out: &mut Vec<u8>,
        compression: PngCompression,
    ) -> Result<(), TransformError> {
        let plte: Vec<u8> = self.palette.iter().flat_map(|c| [c[0], c[1], c[2]]).collect();
        let trns: Vec<u8> = self.palette.iter().map(|c| c[3]).collect();
        let opaque_tail = trns.iter().rev().take_while(|&&a| a == u8::MAX).count();

        let mut encoder = png::Encoder::new(out, self.width, self.height);
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(self.bit_depth());
        encoder.set_palette(plte);
        if opaque_tail < trns.len() {
            encoder.set_trns(trns[..trns.len() - opaque_tail].to_vec());
        }
        encoder.set_compression(compression.to_png());
        encoder.set_filter(png::FilterType::NoFilter);

        let mut writer = encoder.write_header().map_err(TransformError::Palette)?;
        writer
            .write_image_data(&self.packed_rows())
            .map_err(TransformError::Palette)?;
        writer.finish().map_err(TransformError::Palette)
    }
}

fn exact(img: &RgbaImage) -> Option<Indexed> {
    let mut lookup: HashMap<[u8; 4], u8> = HashMap::new();
    let mut palette = Vec::new();
    let mut indices = Vec::with_capacity(img.as_raw().len() / 4);
    for pixel in img.pixels() {
        let index = match lookup.get(&pixel.0) {
            Some(&index) => index,
            None => {
                if palette.len() == MAX_COLORS {
                    return None;
                }
                let index = palette.len() as u8;
                palette.push(pixel.0);
                lookup.insert(pixel.0, index);
                index
            }
        };
        indices.push(index);
    }
    Some(Indexed {
        width: img.width(),
        height: img.height(),
        palette,
        indices,
    })
}

fn quantize(img: &RgbaImage) -> Indexed {
    let quant = NeuQuant::new(SAMPLE_FACTOR, MAX_COLORS, img.as_raw());
    let palette = quant
        .color_map_rgba()
        .chunks_exact(4)
        .map(|c| [c[0], c[1], c[2], c[3]])
        .collect();
    let indices = img
        .as_raw()
        .chunks_exact(4)
        .map(|px| quant.index_of(px) as u8)
        .collect();
    Indexed {
        width: img.width(),
        height: img.height(),
        palette,
        indices,
    }
}
