//! Result types returned by the pipeline entry points.
//!
//! Everything here is `Serialize` so the CLI can print a run report with
//! `--json` and callers can store it next to the artifacts.

use crate::error::{PageError, TypesetError};
use crate::pipeline::figures::FigureArtifact;
use crate::pipeline::geometry::{CorrectedPage, CropRect};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Everything a run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutput {
    pub artifacts: ArtifactPaths,
    /// One entry per page, in page order.
    pub pages: Vec<PageSummary>,
    /// Published figure crops keyed by position in the layout's figure list.
    pub figures: BTreeMap<usize, FigureArtifact>,
    /// Present when the LaTeX stage ran.
    pub typeset: Option<TypesetReport>,
    pub stats: RunStats,
}

impl RunOutput {
    /// Non-fatal problems of the whole run, page issues first.
    pub fn warnings(&self) -> Vec<String> {
        let pages = self
            .pages
            .iter()
            .flat_map(|p| p.issues.iter().map(ToString::to_string));
        let typeset = self
            .typeset
            .iter()
            .flat_map(|t| t.errors.iter().map(ToString::to_string));
        pages.chain(typeset).collect()
    }
}

/// Published artifact locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactPaths {
    /// `page_<n>_processed.png`, in page order.
    pub page_images: Vec<PathBuf>,
    pub corrected_pdf: PathBuf,
    pub layout_json: PathBuf,
    pub output_txt: PathBuf,
}

/// How one page was corrected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSummary {
    /// 1-based page ordinal.
    pub page: usize,
    pub width: u32,
    pub height: u32,
    /// Counter-clockwise rotation applied, degrees.
    pub rotation: f32,
    pub crop: Option<CropRect>,
    pub issues: Vec<PageError>,
}

impl From<&CorrectedPage> for PageSummary {
    fn from(page: &CorrectedPage) -> Self {
        Self {
            page: page.number,
            width: page.width(),
            height: page.height(),
            rotation: page.rotation,
            crop: page.crop,
            issues: page.issues.clone(),
        }
    }
}

/// Outcome of LaTeX generation and compilation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypesetReport {
    pub tex_file: PathBuf,
    pub pdf: Option<PathBuf>,
    pub docx: Option<PathBuf>,
    /// Compile/convert failures; the `.tex` is still usable.
    pub errors: Vec<TypesetError>,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub llm_retries: u32,
    pub llm_duration_ms: u64,
    pub compile_duration_ms: u64,
}

/// Counters and timings for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub total_pages: usize,
    /// Pages turned by a non-zero angle.
    pub rotated_pages: usize,
    /// Pages where content was found and the margins cropped.
    pub cropped_pages: usize,
    /// Pages whose orientation detection failed.
    pub orientation_failures: usize,
    /// Layout records synthesized because the service omitted the page.
    pub placeholder_pages: usize,
    /// Figures the layout service reported.
    pub figures_found: usize,
    /// Figures cropped and published.
    pub figures_extracted: usize,
    /// Elements written to the ordered text.
    pub text_elements: usize,
    pub render_duration_ms: u64,
    pub correction_duration_ms: u64,
    pub layout_duration_ms: u64,
    pub total_duration_ms: u64,
}

impl RunStats {
    /// Fill the per-page counters from corrected pages.
    pub fn count_pages(&mut self, pages: &[CorrectedPage]) {
        self.total_pages = pages.len();
        self.rotated_pages = pages.iter().filter(|p| p.rotation != 0.0).count();
        self.cropped_pages = pages.iter().filter(|p| p.crop.is_some()).count();
        self.orientation_failures = pages.iter().filter(|p| !p.issues.is_empty()).count();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    fn page(number: usize, rotation: f32, crop: Option<CropRect>, failed: bool) -> CorrectedPage {
        CorrectedPage {
            number,
            image: DynamicImage::ImageRgb8(RgbImage::new(4, 3)),
            rotation,
            crop,
            issues: if failed {
                vec![PageError::OrientationFailed {
                    page: number,
                    detail: "no text".into(),
                }]
            } else {
                Vec::new()
            },
        }
    }

    #[test]
    fn page_counters() {
        let rect = CropRect { x0: 0, y0: 0, x1: 4, y1: 3 };
        let pages = vec![
            page(1, 0.0, Some(rect), false),
            page(2, 90.0, Some(rect), false),
            page(3, 0.0, None, true),
        ];
        let mut stats = RunStats::default();
        stats.count_pages(&pages);
        assert_eq!(stats.total_pages, 3);
        assert_eq!(stats.rotated_pages, 1);
        assert_eq!(stats.cropped_pages, 2);
        assert_eq!(stats.orientation_failures, 1);
    }

    #[test]
    fn summary_from_page() {
        let s = PageSummary::from(&page(2, 180.0, None, false));
        assert_eq!((s.page, s.width, s.height, s.rotation), (2, 4, 3, 180.0));
    }

    #[test]
    fn output_serialises_with_figure_keys() {
        let output = RunOutput {
            artifacts: ArtifactPaths::default(),
            pages: vec![PageSummary::from(&page(1, 0.0, None, true))],
            figures: BTreeMap::from([(
                3,
                FigureArtifact {
                    index: 3,
                    page: 1,
                    rect: CropRect { x0: 0, y0: 0, x1: 2, y1: 2 },
                    path: PathBuf::from("figures/figure_1_3.png"),
                },
            )]),
            typeset: Some(TypesetReport {
                errors: vec![TypesetError::ToolNotFound {
                    tool: "pandoc".into(),
                }],
                ..Default::default()
            }),
            stats: RunStats::default(),
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["figures"]["3"]["page"], 1);
        assert_eq!(output.warnings().len(), 2);
    }
}
