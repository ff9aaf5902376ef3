//! QR rendering for BankID challenges.
//!
//! The challenge payload is encoded as-is; the BankID app reads it directly.
//!
//! - Unicode block art for terminal display
//! - PNG bytes for the web bridge and push notifications

use qrcode::render::unicode;
use qrcode::{EcLevel, QrCode};

use crate::error::{Error, Result};

/// Default PNG edge length in pixels.
pub const DEFAULT_PNG_SIZE: u32 = 320;

fn encode(payload: &str) -> Result<QrCode> {
    QrCode::with_error_correction_level(payload, EcLevel::L)
        .map_err(|e| Error::Internal(format!("Failed to generate QR code: {e}")))
}

/// Generate ASCII art QR code for terminal display.
///
/// Uses Unicode block characters for compact display in terminals.
///
/// # Example
///
/// ```
/// use kivra_sync_core::qr::generate_ascii;
///
/// let qr = generate_ascii("bankid.5f0a.0.3c1b").unwrap();
/// assert!(qr.lines().count() > 5);
/// ```
pub fn generate_ascii(payload: &str) -> Result<String> {
    let rendered = encode(payload)?
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build();

    Ok(rendered)
}

/// Generate a PNG image of the QR code, `size` pixels square.
pub fn generate_png(payload: &str, size: u32) -> Result<Vec<u8>> {
    use image::{ImageEncoder, Luma};

    let image = encode(payload)?.render::<Luma<u8>>().quiet_zone(true).build();
    let scaled = image::imageops::resize(&image, size, size, image::imageops::FilterType::Nearest);

    let mut png_bytes = Vec::new();
    image::codecs::png::PngEncoder::new(&mut png_bytes)
        .write_image(&scaled, size, size, image::ExtendedColorType::L8)
        .map_err(|e| Error::Internal(format!("Failed to encode PNG: {e}")))?;

    Ok(png_bytes)
}
