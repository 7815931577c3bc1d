//! Rendering of pairing codes into scannable images.

use std::io::Cursor;

use {
    base64::Engine as _,
    image::{ImageFormat, Luma},
    qrcode::QrCode,
};

use crate::error::Result;

const DATA_URL_PREFIX: &str = "data:image/png;base64,";
/// Smallest edge of the rendered image, in pixels.
const MIN_EDGE_PX: u32 = 264;

/// Encode `code` as a QR symbol and return it as a PNG `data:` URL, ready to
/// drop into an `<img src>`.
pub fn qr_data_url(code: &str) -> Result<String> {
    let symbol = QrCode::new(code.as_bytes())?;
    let image = symbol
        .render::<Luma<u8>>()
        .min_dimensions(MIN_EDGE_PX, MIN_EDGE_PX)
        .build();

    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

    let encoded = base64::engine::general_purpose::STANDARD.encode(&png);
    Ok(format!("{DATA_URL_PREFIX}{encoded}"))
}
