//! Encoding helpers: file bytes → base64 for the `save` action, and
//! rasterised pages → PNG for the OCR engine.
//!
//! PNG is used for OCR input because it is lossless; JPEG artefacts around
//! glyph edges measurably hurt recognition on small print.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode raw file bytes as standard base64.
pub fn encode_file(bytes: &[u8]) -> String {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded {} bytes → {} bytes base64", bytes.len(), b64.len());
    b64
}

/// Strip a `data:<mime>;base64,` prefix (up to and including the first comma).
///
/// Input without a `data:` scheme is returned unchanged.
pub fn strip_data_url_prefix(encoded: &str) -> &str {
    if !encoded.starts_with("data:") {
        return encoded;
    }
    match encoded.split_once(',') {
        Some((_, payload)) => payload,
        None => encoded,
    }
}

/// Encode a rasterised page as PNG bytes.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn decode(s: &str) -> Vec<u8> {
        STANDARD.decode(s).expect("valid base64")
    }

    #[test]
    fn round_trip_empty() {
        assert_eq!(encode_file(&[]), "");
        assert!(decode(&encode_file(&[])).is_empty());
    }

    #[test]
    fn round_trip_small() {
        let bytes = b"%PDF-1.7 tiny".to_vec();
        assert_eq!(decode(&encode_file(&bytes)), bytes);
    }

    #[test]
    fn round_trip_multi_megabyte() {
        let bytes: Vec<u8> = (0..3 * 1024 * 1024 + 7).map(|i| (i * 31 % 251) as u8).collect();
        assert_eq!(decode(&encode_file(&bytes)), bytes);
    }

    #[test]
    fn strips_data_url_prefix() {
        assert_eq!(
            strip_data_url_prefix("data:application/pdf;base64,JVBERi0x"),
            "JVBERi0x"
        );
        // Only up to the first comma.
        assert_eq!(strip_data_url_prefix("data:a;base64,b,c"), "b,c");
    }

    #[test]
    fn leaves_plain_base64_alone() {
        assert_eq!(strip_data_url_prefix("JVBERi0x"), "JVBERi0x");
        assert_eq!(strip_data_url_prefix(""), "");
    }

    #[test]
    fn encode_small_png() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let png = encode_png(&img).expect("encode should succeed");
        assert_eq!(&png[1..4], b"PNG");
    }
}
