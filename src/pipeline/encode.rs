//! Image encoding: `DynamicImage` → PNG bytes.
//!
//! Every raster artifact of a run (corrected pages, figure crops, the page
//! handed to the orientation detector) is PNG. Lossless compression keeps
//! thin strokes and small subscripts intact, which matters more for exam
//! papers than file size.

use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode an image as PNG into memory.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!(
        "Encoded {}x{} image → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 6, Rgb([255, 0, 0])));
        let png = encode_png(&img).expect("encode should succeed");
        assert_eq!(&png[1..4], b"PNG");
        let decoded = image::load_from_memory(&png).expect("valid png");
        assert_eq!((decoded.width(), decoded.height()), (10, 6));
    }
}
