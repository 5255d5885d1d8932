//! Lossless metadata removal on the encoded bytes.
//!
//! Used when re-encoding would not make an upload smaller: the original
//! pixels are kept and only the metadata is cut out, so the response never
//! carries EXIF, XMP, IPTC, ICC or text chunks either way.
//!
//! | Format | Kept | Dropped |
//! |---|---|---|
//! | PNG | critical chunks, `tRNS` | every other ancillary chunk |
//! | JPEG | `APP0` (JFIF), `APP14` (Adobe), all non-APP segments | `APP1`..`APP13`, `APP15`, `COM` |
//!
//! Returns `None` for anything that does not walk cleanly.

use image::ImageFormat;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

pub fn strip_metadata(bytes: &[u8], format: ImageFormat) -> Option<Vec<u8>> {
    match format {
        ImageFormat::Png => strip_png(bytes),
        ImageFormat::Jpeg => strip_jpeg(bytes),
        _ => None,
    }
}

fn strip_png(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut rest = bytes.strip_prefix(PNG_SIGNATURE)?;
    let mut out = Vec::with_capacity(bytes.len());
    out.extend_from_slice(PNG_SIGNATURE);

    loop {
        let length = u32::from_be_bytes(rest.get(..4)?.try_into().ok()?) as usize;
        // length + type + data + crc
        let chunk = rest.get(..12usize.checked_add(length)?)?;
        let kind = &chunk[4..8];
        if kind[0].is_ascii_uppercase() || kind == b"tRNS" {
            out.extend_from_slice(chunk);
        }
        rest = &rest[chunk.len()..];
        if kind == b"IEND" {
            return Some(out);
        }
    }
}

fn strip_jpeg(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut rest = bytes.strip_prefix(b"\xFF\xD8")?;
    let mut out = Vec::with_capacity(bytes.len());
    out.extend_from_slice(b"\xFF\xD8");

    loop {
        // Markers may be preceded by any number of 0xFF fill bytes.
        let fill = rest.iter().take_while(|&&b| b == 0xFF).count();
        if fill == 0 {
            return None;
        }
        let marker = *rest.get(fill)?;
        rest = &rest[fill + 1..];

        match marker {
            // Start of scan: entropy-coded data follows, copy everything.
            0xDA => {
                out.extend_from_slice(&[0xFF, marker]);
                out.extend_from_slice(rest);
                return Some(out);
            }
            0xD9 => {
                out.extend_from_slice(&[0xFF, marker]);
                return Some(out);
            }
            0x01 | 0xD0..=0xD7 => out.extend_from_slice(&[0xFF, marker]),
            _ => {
                let length = u16::from_be_bytes(rest.get(..2)?.try_into().ok()?) as usize;
                if length < 2 {
                    return None;
                }
                let segment = rest.get(..length)?;
                let metadata = matches!(marker, 0xE1..=0xED | 0xEF | 0xFE);
                if !metadata {
                    out.extend_from_slice(&[0xFF, marker]);
                    out.extend_from_slice(segment);
                }
                rest = &rest[length..];
            }
        }
    }
}
