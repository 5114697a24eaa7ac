//! Page geometry correction: deskew and whitespace-bounded cropping.
//!
//! Each rendered page goes through the same three steps:
//!
//! ```text
//! rendered ──▶ orientation ──▶ rotate (expand) ──▶ row/column means ──▶ crop
//! ```
//!
//! A row or column is *content-bearing* when its mean grayscale intensity is
//! below the whiteness threshold. The crop keeps the rectangle spanned by the
//! first and last content-bearing rows and columns plus a fixed padding,
//! clamped to the page. Pages without any content-bearing row or column are
//! kept whole.
//!
//! Everything here is pure and synchronous; the caller decides which thread
//! it runs on.

use crate::config::PipelineConfig;
use crate::error::PageError;
use crate::pipeline::orient::OrientationDetector;
use image::{imageops, DynamicImage, Rgb, RgbImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A half-open pixel rectangle `[x0, x1) × [y0, y1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl CropRect {
    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    /// True when `other` lies entirely inside `self`.
    pub fn contains(&self, other: &CropRect) -> bool {
        self.x0 <= other.x0 && self.y0 <= other.y0 && self.x1 >= other.x1 && self.y1 >= other.y1
    }
}

/// The knobs of the correction step, detached from the full config so the
/// blocking tasks can own a copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrectionParams {
    pub pad_px: u32,
    pub white_threshold: u8,
}

impl From<&PipelineConfig> for CorrectionParams {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            pad_px: config.pad_px,
            white_threshold: config.white_threshold,
        }
    }
}

/// A page after deskew and crop. Read-only for every later stage.
#[derive(Debug, Clone)]
pub struct CorrectedPage {
    /// 1-based page ordinal.
    pub number: usize,
    /// The normalized raster.
    pub image: DynamicImage,
    /// Counter-clockwise rotation applied, in degrees (0 when upright).
    pub rotation: f32,
    /// Crop applied to the rotated raster, if any content was found.
    pub crop: Option<CropRect>,
    /// Non-fatal problems met while correcting this page.
    pub issues: Vec<PageError>,
}

impl CorrectedPage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// `page_<n>_processed.png`
pub fn page_file_name(number: usize) -> String {
    format!("page_{number}_processed.png")
}

/// Deskew and crop one rendered page.
///
/// Never fails: a detector error leaves the page unrotated and is recorded in
/// [`CorrectedPage::issues`].
pub fn correct_page(
    number: usize,
    rendered: DynamicImage,
    detector: &dyn OrientationDetector,
    params: &CorrectionParams,
) -> CorrectedPage {
    let mut issues = Vec::new();

    let reported = match detector.detect(&rendered) {
        Ok(angle) => angle,
        Err(e) => {
            warn!(
                "Page {}: orientation detection failed, using page unrotated: {}",
                number, e
            );
            issues.push(PageError::OrientationFailed {
                page: number,
                detail: e.to_string(),
            });
            0.0
        }
    };

    let rotation = correction_angle(reported);
    let image = if rotation != 0.0 {
        debug!("Page {}: rotating {}° counter-clockwise", number, rotation);
        rotate_ccw(rendered, rotation)
    } else {
        rendered
    };

    let (width, height) = (image.width(), image.height());
    let crop = content_bounds(&image, params.white_threshold)
        .map(|content| padded_crop(content, params.pad_px, width, height));

    let image = match crop {
        Some(rect) => {
            debug!(
                "Page {}: cropping to x0={} y0={} x1={} y1={}",
                number, rect.x0, rect.y0, rect.x1, rect.y1
            );
            image.crop_imm(rect.x0, rect.y0, rect.width(), rect.height())
        }
        None => {
            debug!("Page {}: no content found, keeping full page", number);
            image
        }
    };

    CorrectedPage {
        number,
        image,
        rotation,
        crop,
        issues,
    }
}

/// Counter-clockwise correction for a reported rotation:
/// `(360 − angle) mod 360`.
pub fn correction_angle(reported: f32) -> f32 {
    let a = (360.0 - reported).rem_euclid(360.0);
    // rem_euclid can land on 360.0 for tiny negative inputs.
    if a >= 360.0 {
        0.0
    } else {
        a
    }
}

/// Rotate counter-clockwise by `degrees`, growing the canvas so nothing is
/// clipped. Quarter turns are exact; other angles are resampled onto white.
pub fn rotate_ccw(img: DynamicImage, degrees: f32) -> DynamicImage {
    let d = degrees.rem_euclid(360.0);
    let quarter = (d / 90.0).round();
    if (d - quarter * 90.0).abs() < 0.01 {
        return match quarter as u32 % 4 {
            0 => img,
            1 => img.rotate270(),
            2 => img.rotate180(),
            _ => img.rotate90(),
        };
    }
    DynamicImage::ImageRgb8(rotate_expanded(&img.to_rgb8(), d))
}

fn rotate_expanded(src: &RgbImage, ccw_degrees: f32) -> RgbImage {
    let (w, h) = src.dimensions();
    let (sin, cos) = ccw_degrees.to_radians().sin_cos();
    let out_w = (w as f32 * cos.abs() + h as f32 * sin.abs()).ceil() as u32;
    let out_h = (w as f32 * sin.abs() + h as f32 * cos.abs()).ceil() as u32;

    // Rotate on a canvas big enough for both the source and the result,
    // both centred, then cut the result out.
    let canvas_w = w.max(out_w);
    let canvas_h = h.max(out_h);
    let white = Rgb([255, 255, 255]);
    let mut canvas = RgbImage::from_pixel(canvas_w, canvas_h, white);
    imageops::overlay(
        &mut canvas,
        src,
        i64::from((canvas_w - w) / 2),
        i64::from((canvas_h - h) / 2),
    );

    // imageproc turns clockwise for positive theta.
    let rotated = rotate_about_center(
        &canvas,
        -ccw_degrees.to_radians(),
        Interpolation::Bilinear,
        white,
    );

    imageops::crop_imm(
        &rotated,
        (canvas_w - out_w) / 2,
        (canvas_h - out_h) / 2,
        out_w,
        out_h,
    )
    .to_image()
}

/// Bounding rectangle of content-bearing rows and columns, unpadded.
///
/// Returns `None` when the page has no content-bearing row or no
/// content-bearing column.
pub fn content_bounds(img: &DynamicImage, white_threshold: u8) -> Option<CropRect> {
    let gray = img.to_luma8();
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return None;
    }

    let mut row_sums = vec![0u64; h as usize];
    let mut col_sums = vec![0u64; w as usize];
    for (x, y, px) in gray.enumerate_pixels() {
        let v = u64::from(px.0[0]);
        row_sums[y as usize] += v;
        col_sums[x as usize] += v;
    }

    let threshold = f64::from(white_threshold);
    let is_content = |sum: &u64, len: u32| (*sum as f64 / f64::from(len)) < threshold;

    let first_row = row_sums.iter().position(|s| is_content(s, w))?;
    let last_row = row_sums.iter().rposition(|s| is_content(s, w))?;
    let first_col = col_sums.iter().position(|s| is_content(s, h))?;
    let last_col = col_sums.iter().rposition(|s| is_content(s, h))?;

    Some(CropRect {
        x0: first_col as u32,
        y0: first_row as u32,
        x1: last_col as u32 + 1,
        y1: last_row as u32 + 1,
    })
}

/// Grow `content` by `pad` on every side, clamped to a `width × height` page.
pub fn padded_crop(content: CropRect, pad: u32, width: u32, height: u32) -> CropRect {
    CropRect {
        x0: content.x0.saturating_sub(pad),
        y0: content.y0.saturating_sub(pad),
        x1: content.x1.saturating_add(pad).min(width),
        y1: content.y1.saturating_add(pad).min(height),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::orient::{NoRotation, OrientationError};

    const PARAMS: CorrectionParams = CorrectionParams {
        pad_px: 20,
        white_threshold: 245,
    };

    fn white(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([255, 255, 255]))
    }

    fn with_block(w: u32, h: u32, rect: CropRect) -> DynamicImage {
        let mut img = white(w, h);
        for y in rect.y0..rect.y1 {
            for x in rect.x0..rect.x1 {
                img.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        DynamicImage::ImageRgb8(img)
    }

    struct Fixed(f32);
    impl OrientationDetector for Fixed {
        fn detect(&self, _page: &DynamicImage) -> Result<f32, OrientationError> {
            Ok(self.0)
        }
    }

    struct Broken;
    impl OrientationDetector for Broken {
        fn detect(&self, _page: &DynamicImage) -> Result<f32, OrientationError> {
            Err(OrientationError::Failed {
                code: Some(1),
                stderr: "Too few characters".into(),
            })
        }
    }

    #[test]
    fn blank_page_is_not_cropped() {
        let page = correct_page(1, DynamicImage::ImageRgb8(white(120, 80)), &NoRotation, &PARAMS);
        assert!(page.crop.is_none());
        assert_eq!((page.width(), page.height()), (120, 80));
        assert!(page.issues.is_empty());
    }

    #[test]
    fn content_block_is_cropped_with_padding() {
        let content = CropRect { x0: 100, y0: 60, x1: 150, y1: 80 };
        let page = correct_page(1, with_block(300, 200, content), &NoRotation, &PARAMS);
        assert_eq!(page.crop, Some(CropRect { x0: 80, y0: 40, x1: 170, y1: 100 }));
        assert_eq!((page.width(), page.height()), (90, 60));
    }

    #[test]
    fn crop_is_clamped_at_page_edges() {
        let content = CropRect { x0: 0, y0: 5, x1: 10, y1: 100 };
        let page = correct_page(1, with_block(50, 100, content), &NoRotation, &PARAMS);
        assert_eq!(page.crop, Some(CropRect { x0: 0, y0: 0, x1: 30, y1: 100 }));
    }

    #[test]
    fn crop_contains_content_and_stays_in_bounds() {
        let (w, h) = (97u32, 61u32);
        for pad in [0u32, 1, 5, 20, 200] {
            for (x0, y0) in [(0u32, 0u32), (3, 7), (40, 30), (90, 55)] {
                let content = CropRect {
                    x0,
                    y0,
                    x1: (x0 + 6).min(w),
                    y1: (y0 + 5).min(h),
                };
                let img = with_block(w, h, content);
                let found = content_bounds(&img, 245).expect("content present");
                assert_eq!(found, content);

                let crop = padded_crop(found, pad, w, h);
                let page = CropRect { x0: 0, y0: 0, x1: w, y1: h };
                assert!(page.contains(&crop), "pad={pad} crop={crop:?}");
                assert!(crop.contains(&content), "pad={pad} crop={crop:?}");
            }
        }
    }

    #[test]
    fn light_gray_rows_count_as_blank() {
        let mut img = RgbImage::from_pixel(20, 20, Rgb([250, 250, 250]));
        img.put_pixel(10, 10, Rgb([0, 0, 0]));
        // One dark pixel in a 20-pixel row: mean = (19*250)/20 = 237.5 < 245.
        let found = content_bounds(&DynamicImage::ImageRgb8(img), 245).unwrap();
        assert_eq!(found, CropRect { x0: 10, y0: 10, x1: 11, y1: 11 });
    }

    #[test]
    fn correction_angle_wraps() {
        assert_eq!(correction_angle(0.0), 0.0);
        assert_eq!(correction_angle(90.0), 270.0);
        assert_eq!(correction_angle(180.0), 180.0);
        assert_eq!(correction_angle(270.0), 90.0);
        assert_eq!(correction_angle(360.0), 0.0);
    }

    #[test]
    fn reported_ninety_turns_page_clockwise() {
        // A marker in the top-left corner ends up top-right after a
        // clockwise quarter turn.
        let mut img = white(3, 2);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        let page = correct_page(
            1,
            DynamicImage::ImageRgb8(img),
            &Fixed(90.0),
            &CorrectionParams { pad_px: 0, white_threshold: 1 },
        );
        assert_eq!(page.rotation, 270.0);
        assert_eq!((page.width(), page.height()), (2, 3));
        assert_eq!(page.image.to_rgb8().get_pixel(1, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn odd_angle_expands_canvas() {
        let img = DynamicImage::ImageRgb8(white(100, 40));
        let rotated = rotate_ccw(img, 30.0);
        assert!(rotated.width() > 100);
        assert!(rotated.height() > 40);
    }

    #[test]
    fn detector_failure_keeps_page_unrotated() {
        let content = CropRect { x0: 30, y0: 30, x1: 40, y1: 40 };
        let page = correct_page(7, with_block(80, 60, content), &Broken, &PARAMS);
        assert_eq!(page.rotation, 0.0);
        assert_eq!(page.issues.len(), 1);
        assert!(matches!(
            &page.issues[0],
            PageError::OrientationFailed { page: 7, .. }
        ));
        // Cropping still happens.
        assert!(page.crop.is_some());
    }
}
