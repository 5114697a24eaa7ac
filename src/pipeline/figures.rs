//! Figure extraction: crop every figure region out of its corrected page.
//!
//! Figure polygons come back in the page's declared unit (inches for PDF
//! input). They are mapped to pixels through fractions of the declared page
//! size, so the mapping stays right whatever DPI the pages were rendered at.

use crate::artifact::save_png;
use crate::error::Pdf2TexError;
use crate::pipeline::geometry::{CorrectedPage, CropRect};
use crate::pipeline::layout::{BoundingRegion, LayoutResult, PageLayoutRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A figure crop that was published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FigureArtifact {
    /// Position of the figure in the layout's figure list.
    pub index: usize,
    /// 1-based page ordinal.
    pub page: usize,
    /// Crop rectangle on the corrected page.
    pub rect: CropRect,
    pub path: PathBuf,
}

/// `figure_<page>_<index>.png`
pub fn figure_file_name(page: usize, index: usize) -> String {
    format!("figure_{page}_{index}.png")
}

/// Map a bounding region onto a `width × height` raster.
///
/// Coordinates are divided by the record's declared size, scaled to pixels,
/// truncated toward zero and clamped to the raster. Returns None when the
/// result has no area.
pub fn figure_pixel_rect(
    region: &BoundingRegion,
    record: &PageLayoutRecord,
    width: u32,
    height: u32,
) -> Option<CropRect> {
    let (min_x, min_y, max_x, max_y) = region.extent()?;
    let (declared_w, declared_h) = record.declared_size();

    // `as` saturates and maps NaN to 0, which the clamp then handles.
    let to_px = |v: f64, declared: f64, px: u32| -> u32 {
        let scaled = (v / declared * f64::from(px)).trunc();
        (scaled as i64).clamp(0, i64::from(px)) as u32
    };

    let rect = CropRect {
        x0: to_px(min_x, declared_w, width),
        y0: to_px(min_y, declared_h, height),
        x1: to_px(max_x, declared_w, width),
        y1: to_px(max_y, declared_h, height),
    };
    (rect.width() > 0 && rect.height() > 0).then_some(rect)
}

/// Crop and publish every figure with a usable first region.
///
/// `layout.pages` must already be reconciled, so record `i` describes page
/// `i + 1`. Figures whose region is missing, points at a page outside the
/// document, or maps to an empty rectangle are skipped.
pub fn extract_figures(
    layout: &LayoutResult,
    pages: &[CorrectedPage],
    figures_dir: &Path,
) -> Result<BTreeMap<usize, FigureArtifact>, Pdf2TexError> {
    let mut out = BTreeMap::new();

    for (index, figure) in layout.figures.iter().enumerate() {
        let Some(region) = figure.bounding_regions.first() else {
            debug!("Figure {}: no bounding region, skipped", index);
            continue;
        };
        let page_no = region.page_number;
        let (Some(page), Some(record)) = (
            page_no.checked_sub(1).and_then(|i| pages.get(i)),
            page_no.checked_sub(1).and_then(|i| layout.pages.get(i)),
        ) else {
            debug!("Figure {}: page {} is not in the document, skipped", index, page_no);
            continue;
        };

        let Some(rect) = figure_pixel_rect(region, record, page.width(), page.height()) else {
            debug!("Figure {}: degenerate region on page {}, skipped", index, page_no);
            continue;
        };

        let crop = page
            .image
            .crop_imm(rect.x0, rect.y0, rect.width(), rect.height());
        let path = figures_dir.join(figure_file_name(page_no, index));
        save_png(&crop, &path)?;
        debug!(
            "Figure {}: page {} {}x{} → {}",
            index,
            page_no,
            rect.width(),
            rect.height(),
            path.display()
        );

        out.insert(
            index,
            FigureArtifact {
                index,
                page: page_no,
                rect,
                path,
            },
        );
    }

    info!(
        "Extracted {}/{} figures into {}",
        out.len(),
        layout.figures.len(),
        figures_dir.display()
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::layout::Figure;
    use image::{DynamicImage, Rgb, RgbImage};

    fn letter_record(n: usize) -> PageLayoutRecord {
        PageLayoutRecord {
            page_number: n,
            width: Some(8.5),
            height: Some(11.0),
            ..Default::default()
        }
    }

    fn page(n: usize, w: u32, h: u32) -> CorrectedPage {
        CorrectedPage {
            number: n,
            image: DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([255, 255, 255]))),
            rotation: 0.0,
            crop: None,
            issues: Vec::new(),
        }
    }

    fn rect_region(page: usize, x0: f64, y0: f64, x1: f64, y1: f64) -> BoundingRegion {
        BoundingRegion::from_polygon(page, vec![x0, y0, x1, y0, x1, y1, x0, y1])
    }

    fn figure(region: BoundingRegion) -> Figure {
        Figure {
            bounding_regions: vec![region],
            ..Default::default()
        }
    }

    #[test]
    fn quarter_page_figure_maps_to_pixels() {
        // 8.5 x 11 in at 100 dpi → 850 x 1100 px.
        let region = rect_region(1, 0.0, 0.0, 4.25, 5.5);
        let rect = figure_pixel_rect(&region, &letter_record(1), 850, 1100).unwrap();
        assert_eq!(rect, CropRect { x0: 0, y0: 0, x1: 425, y1: 550 });
    }

    #[test]
    fn fractional_pixels_truncate() {
        let record = PageLayoutRecord {
            page_number: 1,
            width: Some(3.0),
            height: Some(3.0),
            ..Default::default()
        };
        // 1/3 of 100 = 33.33 → 33; 2/3 of 100 = 66.67 → 66
        let rect = figure_pixel_rect(&rect_region(1, 1.0, 1.0, 2.0, 2.0), &record, 100, 100).unwrap();
        assert_eq!(rect, CropRect { x0: 33, y0: 33, x1: 66, y1: 66 });
    }

    #[test]
    fn out_of_page_coordinates_clamp() {
        let region = rect_region(1, -1.0, -2.0, 20.0, 30.0);
        let rect = figure_pixel_rect(&region, &letter_record(1), 850, 1100).unwrap();
        assert_eq!(rect, CropRect { x0: 0, y0: 0, x1: 850, y1: 1100 });
    }

    #[test]
    fn zero_width_region_is_rejected() {
        // Declared in pixels on a 100x100 page: x0 == x1 == 50.
        let record = PageLayoutRecord {
            page_number: 1,
            width: Some(100.0),
            height: Some(100.0),
            ..Default::default()
        };
        let region = rect_region(1, 50.0, 50.0, 50.0, 80.0);
        assert_eq!(figure_pixel_rect(&region, &record, 100, 100), None);
    }

    #[test]
    fn missing_declared_size_uses_one() {
        let record = PageLayoutRecord {
            page_number: 1,
            ..Default::default()
        };
        let rect = figure_pixel_rect(&rect_region(1, 0.25, 0.5, 0.75, 1.0), &record, 200, 100).unwrap();
        assert_eq!(rect, CropRect { x0: 50, y0: 50, x1: 150, y1: 100 });
    }

    #[test]
    fn extracts_and_names_figures() {
        let dir = tempfile::tempdir().unwrap();
        let pages = vec![page(1, 850, 1100), page(2, 850, 1100)];
        let layout = LayoutResult {
            pages: vec![letter_record(1), letter_record(2)],
            figures: vec![
                figure(rect_region(2, 4.25, 5.5, 8.5, 11.0)),
                // degenerate: zero height
                figure(rect_region(1, 1.0, 3.0, 2.0, 3.0)),
                // page outside the document
                figure(rect_region(5, 1.0, 1.0, 2.0, 2.0)),
                Figure::default(),
                figure(rect_region(1, 0.0, 0.0, 8.5, 11.0)),
            ],
            ..Default::default()
        };

        let map = extract_figures(&layout, &pages, dir.path()).unwrap();
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec![0, 4]);

        let first = &map[&0];
        assert_eq!(first.page, 2);
        assert_eq!(first.path, dir.path().join("figure_2_0.png"));
        let img = image::open(&first.path).unwrap();
        assert_eq!((img.width(), img.height()), (425, 550));

        assert!(dir.path().join("figure_1_4.png").exists());
        assert!(!dir.path().join("figure_1_1.png").exists());
    }

    #[test]
    fn every_published_crop_has_positive_area() {
        let dir = tempfile::tempdir().unwrap();
        let pages = vec![page(1, 85, 110)];
        let mut figures = Vec::new();
        for i in 0..12 {
            let x = f64::from(i) * 0.8;
            figures.push(figure(rect_region(1, x, x, x + 0.05 * f64::from(i), x + 1.0)));
        }
        let layout = LayoutResult {
            pages: vec![letter_record(1)],
            figures,
            ..Default::default()
        };
        let map = extract_figures(&layout, &pages, dir.path()).unwrap();
        for artifact in map.values() {
            assert!(artifact.rect.width() > 0 && artifact.rect.height() > 0);
            let img = image::open(&artifact.path).unwrap();
            assert_eq!((img.width(), img.height()), (artifact.rect.width(), artifact.rect.height()));
        }
    }
}
