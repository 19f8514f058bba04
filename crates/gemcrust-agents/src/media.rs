use bytes::Bytes;

use crate::providers::InputPart;

/// Subtype used when the bytes do not look like a known image format.
pub const DEFAULT_IMAGE_SUBTYPE: &str = "jpeg";

/// Detect an image subtype (`png`, `gif`, ...) from the leading bytes.
///
/// Only the content is inspected; file names and platform hints are ignored.
pub fn sniff_image_subtype(data: &[u8]) -> &'static str {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"\xFF\xD8\xFF", "jpeg"),
        (b"\x89PNG\r\n\x1A\n", "png"),
        (b"GIF87a", "gif"),
        (b"GIF89a", "gif"),
        (b"BM", "bmp"),
        (b"\x00\x00\x01\x00", "x-icon"),
        (b"\x00\x00\x02\x00", "x-icon"),
    ];

    if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        return "webp";
    }
    SIGNATURES
        .iter()
        .find(|(magic, _)| data.starts_with(magic))
        .map(|(_, subtype)| *subtype)
        .unwrap_or(DEFAULT_IMAGE_SUBTYPE)
}

/// Wrap downloaded image bytes as a backend input part.
pub fn image_part(data: Bytes) -> InputPart {
    let subtype = sniff_image_subtype(&data).to_string();
    InputPart::Image { subtype, data }
}
