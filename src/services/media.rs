//! Turns downloaded bytes into self-contained payload records.
//!
//! Dimensions are read straight from the container headers (PNG, GIF, BMP,
//! WebP, JPEG); nothing is decoded.

use crate::models::cache_entry::{Dimensions, PayloadRecord};
use base64::{Engine as _, engine::general_purpose};

const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "gif", "bmp", "webp", "svg"];

fn extension(key: &str) -> Option<String> {
    let name = key.rsplit('/').next().unwrap_or(key);
    let (_, ext) = name.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

/// True when the key's extension is one the gallery renders as an image.
pub fn is_image_key(key: &str) -> bool {
    extension(key).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// MIME type by file extension, `application/octet-stream` when unknown.
pub fn mime_for_key(key: &str) -> &'static str {
    match extension(key).as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("txt") => "text/plain",
        Some("json") => "application/json",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, general_purpose::STANDARD.encode(bytes))
}

/// Encode downloaded object bytes for offline reuse.
pub fn encode_payload(key: &str, bytes: &[u8]) -> PayloadRecord {
    PayloadRecord {
        data_url: data_url(mime_for_key(key), bytes),
        dimensions: sniff_dimensions(bytes),
    }
}

fn be_u16(b: &[u8], at: usize) -> Option<u32> {
    let s = b.get(at..at + 2)?;
    Some(u32::from(u16::from_be_bytes([s[0], s[1]])))
}

fn le_u16(b: &[u8], at: usize) -> Option<u32> {
    let s = b.get(at..at + 2)?;
    Some(u32::from(u16::from_le_bytes([s[0], s[1]])))
}

fn be_u32(b: &[u8], at: usize) -> Option<u32> {
    let s = b.get(at..at + 4)?;
    Some(u32::from_be_bytes([s[0], s[1], s[2], s[3]]))
}

fn le_i32(b: &[u8], at: usize) -> Option<i32> {
    let s = b.get(at..at + 4)?;
    Some(i32::from_le_bytes([s[0], s[1], s[2], s[3]]))
}

fn le_u24(b: &[u8], at: usize) -> Option<u32> {
    let s = b.get(at..at + 3)?;
    Some(u32::from(s[0]) | u32::from(s[1]) << 8 | u32::from(s[2]) << 16)
}

/// Pixel dimensions of a raster image, or `None` for anything unrecognised.
pub fn sniff_dimensions(bytes: &[u8]) -> Option<Dimensions> {
    let (width, height) = if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        (be_u32(bytes, 16)?, be_u32(bytes, 20)?)
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        (le_u16(bytes, 6)?, le_u16(bytes, 8)?)
    } else if bytes.starts_with(b"BM") {
        bmp_dimensions(bytes)?
    } else if bytes.starts_with(b"RIFF") && bytes.get(8..12) == Some(&b"WEBP"[..]) {
        webp_dimensions(bytes)?
    } else if bytes.starts_with(&[0xFF, 0xD8]) {
        jpeg_dimensions(bytes)?
    } else {
        return None;
    };

    Some(Dimensions { width, height })
}

fn bmp_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let header_size = le_i32(bytes, 14)?;
    if header_size == 12 {
        return Some((le_u16(bytes, 18)?, le_u16(bytes, 20)?));
    }
    // Negative height marks a top-down bitmap.
    let width = le_i32(bytes, 18)?.unsigned_abs();
    let height = le_i32(bytes, 22)?.unsigned_abs();
    Some((width, height))
}

fn webp_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    match bytes.get(12..16)? {
        b"VP8 " => {
            if bytes.get(23..26)? != [0x9D, 0x01, 0x2A] {
                return None;
            }
            Some((le_u16(bytes, 26)? & 0x3FFF, le_u16(bytes, 28)? & 0x3FFF))
        }
        b"VP8L" => {
            if *bytes.get(20)? != 0x2F {
                return None;
            }
            let b = bytes.get(21..25)?;
            let (b0, b1, b2, b3) = (u32::from(b[0]), u32::from(b[1]), u32::from(b[2]), u32::from(b[3]));
            let width = 1 + (b0 | (b1 & 0x3F) << 8);
            let height = 1 + (b1 >> 6 | b2 << 2 | (b3 & 0x0F) << 10);
            Some((width, height))
        }
        b"VP8X" => Some((1 + le_u24(bytes, 24)?, 1 + le_u24(bytes, 27)?)),
        _ => None,
    }
}

fn jpeg_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let mut i = 2;
    loop {
        if *bytes.get(i)? != 0xFF {
            return None;
        }
        let marker = *bytes.get(i + 1)?;
        match marker {
            // Fill byte before a marker.
            0xFF => i += 1,
            0x01 | 0xD0..=0xD8 => i += 2,
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                return Some((be_u16(bytes, i + 7)?, be_u16(bytes, i + 5)?));
            }
            0xD9 | 0xDA => return None,
            _ => i += 2 + be_u16(bytes, i + 2)? as usize,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal PNG header with an IHDR chunk of the given size.
    pub(crate) fn png_header(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
        bytes.extend_from_slice(&13u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
        bytes
    }

    #[test]
    fn recognises_image_extensions() {
        assert!(is_image_key("a/b/Photo.JPG"));
        assert!(is_image_key("icon.svg"));
        assert!(!is_image_key("notes.txt"));
        assert!(!is_image_key("folder.png/readme"));
        assert!(!is_image_key("png"));
    }

    #[test]
    fn data_url_uses_extension_mime() {
        let payload = encode_payload("x/y.png", &png_header(3, 4));
        assert!(payload.data_url.starts_with("data:image/png;base64,iVBORw0KGgo"));
        assert_eq!(
            payload.dimensions,
            Some(Dimensions {
                width: 3,
                height: 4
            })
        );
    }

    #[test]
    fn gif_dimensions() {
        let mut gif = b"GIF89a".to_vec();
        gif.extend_from_slice(&[0x20, 0x01, 0x10, 0x00]);
        assert_eq!(
            sniff_dimensions(&gif),
            Some(Dimensions {
                width: 288,
                height: 16
            })
        );
    }

    #[test]
    fn bmp_top_down_height_is_positive() {
        let mut bmp = b"BM".to_vec();
        bmp.extend_from_slice(&[0u8; 12]);
        bmp.extend_from_slice(&40i32.to_le_bytes());
        bmp.extend_from_slice(&7i32.to_le_bytes());
        bmp.extend_from_slice(&(-5i32).to_le_bytes());
        assert_eq!(
            sniff_dimensions(&bmp),
            Some(Dimensions {
                width: 7,
                height: 5
            })
        );
    }

    #[test]
    fn webp_extended_dimensions() {
        let mut webp = b"RIFF".to_vec();
        webp.extend_from_slice(&[0u8; 4]);
        webp.extend_from_slice(b"WEBPVP8X");
        webp.extend_from_slice(&[0u8; 8]);
        webp.extend_from_slice(&[99, 0, 0, 49, 0, 0]);
        assert_eq!(
            sniff_dimensions(&webp),
            Some(Dimensions {
                width: 100,
                height: 50
            })
        );
    }

    #[test]
    fn jpeg_skips_app_segments_to_frame_header() {
        let mut jpeg = vec![0xFF, 0xD8];
        // APP0 segment of length 4 (two payload bytes).
        jpeg.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x04, 0xAA, 0xBB]);
        // SOF0: length, precision, height, width.
        jpeg.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08, 0x01, 0xE0, 0x02, 0x80]);
        assert_eq!(
            sniff_dimensions(&jpeg),
            Some(Dimensions {
                width: 640,
                height: 480
            })
        );
    }

    #[test]
    fn unknown_or_truncated_data_has_no_dimensions() {
        assert_eq!(sniff_dimensions(b"<svg></svg>"), None);
        assert_eq!(sniff_dimensions(b"\x89PNG\r\n\x1a\n\0\0"), None);
        assert_eq!(sniff_dimensions(&[0xFF, 0xD8, 0xFF]), None);
    }
}
