//! Layout analysis result model, the analyzer capability, and page
//! reconciliation.
//!
//! The layout service sees the corrected PDF once and returns pages,
//! paragraphs and figures with polygons in physical units. The service may
//! return fewer page records than the document has (service-side page
//! limits, blank pages), so [`reconcile_pages`] rebuilds a gap-free table
//! with exactly one record per page ordinal before anything indexes into it.
//!
//! Field names follow the service's camelCase JSON. Fields this crate does
//! not interpret are kept in `extra` maps so the persisted snapshot carries
//! everything the service said.

use crate::pipeline::geometry::CorrectedPage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// MIME type sent with the corrected document.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Why the layout service did not produce a result. Every variant is fatal
/// to the run.
#[derive(Debug, Error)]
pub enum LayoutError {
    /// Transport failure or unexpected HTTP status.
    #[error("request to layout service failed: {detail}")]
    Request { detail: String },

    /// HTTP 401/403.
    #[error("layout service rejected credentials (HTTP {status}): {detail}")]
    Auth { status: u16, detail: String },

    /// HTTP 429.
    #[error("layout service quota exceeded: {detail}")]
    Quota { detail: String },

    /// The service accepted the document but the analysis failed.
    #[error("layout analysis did not succeed: {detail}")]
    Analysis { detail: String },

    /// The response could not be decoded.
    #[error("malformed layout response: {detail}")]
    Malformed { detail: String },

    /// The configured client-side deadline passed.
    #[error("layout analysis still running after {secs}s")]
    TimedOut { secs: u64 },
}

/// The layout-analysis capability: one document in, one layout out.
///
/// The call may take arbitrarily long; implementations block (await) until
/// the service has finished.
#[async_trait]
pub trait LayoutAnalyzer: Send + Sync {
    async fn analyze(&self, document: &[u8], content_type: &str)
        -> Result<LayoutResult, LayoutError>;
}

/// Unit the service reports page geometry and polygons in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    /// Used for PDF input.
    #[default]
    Inch,
    /// Used for raster input.
    Pixel,
}

impl LengthUnit {
    /// Convert a pixel length at `dpi` into this unit.
    pub fn from_pixels(self, pixels: u32, dpi: u32) -> f64 {
        match self {
            LengthUnit::Inch => f64::from(pixels) / f64::from(dpi.max(1)),
            LengthUnit::Pixel => f64::from(pixels),
        }
    }
}

/// Full analysis result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutResult {
    #[serde(default)]
    pub pages: Vec<PageLayoutRecord>,
    #[serde(default)]
    pub paragraphs: Vec<Paragraph>,
    #[serde(default)]
    pub figures: Vec<Figure>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Per-page metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageLayoutRecord {
    pub page_number: usize,
    #[serde(default)]
    pub angle: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default)]
    pub unit: LengthUnit,
    #[serde(default)]
    pub words: Vec<Word>,
    #[serde(default)]
    pub lines: Vec<Line>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PageLayoutRecord {
    /// Placeholder for a page the service did not report on.
    pub fn placeholder(page: &CorrectedPage, unit: LengthUnit, dpi: u32) -> Self {
        Self {
            page_number: page.number,
            angle: 0.0,
            width: Some(unit.from_pixels(page.width(), dpi)),
            height: Some(unit.from_pixels(page.height(), dpi)),
            unit,
            words: Vec::new(),
            lines: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Declared `(width, height)`; missing or non-positive values read as 1.
    pub fn declared_size(&self) -> (f64, f64) {
        let positive = |v: Option<f64>| v.filter(|v| *v > 0.0 && v.is_finite()).unwrap_or(1.0);
        (positive(self.width), positive(self.height))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Word {
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub polygon: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub polygon: Vec<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paragraph {
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub bounding_regions: Vec<BoundingRegion>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Figure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub bounding_regions: Vec<BoundingRegion>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A page reference plus a flat `x0, y0, x1, y1, …` coordinate list, in the
/// page's declared unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingRegion {
    pub page_number: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polygon: Option<Vec<f64>>,
    /// Older API versions report an axis-aligned box under this name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<Vec<f64>>,
}

impl BoundingRegion {
    pub fn from_polygon(page_number: usize, polygon: Vec<f64>) -> Self {
        Self {
            page_number,
            polygon: Some(polygon),
            bounding_box: None,
        }
    }

    /// The coordinate list: `boundingBox` when present, else `polygon`.
    pub fn coords(&self) -> &[f64] {
        self.bounding_box
            .as_deref()
            .or(self.polygon.as_deref())
            .unwrap_or(&[])
    }

    fn pairs(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.coords().chunks_exact(2).map(|c| (c[0], c[1]))
    }

    /// `(min_x, min_y, max_x, max_y)`, or None without a full coordinate pair.
    pub fn extent(&self) -> Option<(f64, f64, f64, f64)> {
        self.pairs().fold(None, |acc, (x, y)| match acc {
            None => Some((x, y, x, y)),
            Some((x0, y0, x1, y1)) => Some((x0.min(x), y0.min(y), x1.max(x), y1.max(y))),
        })
    }

    /// Arithmetic mean of the x values and of the y values, `(x, y)`.
    pub fn center(&self) -> Option<(f64, f64)> {
        let (mut sx, mut sy, mut n) = (0.0, 0.0, 0usize);
        for (x, y) in self.pairs() {
            sx += x;
            sy += y;
            n += 1;
        }
        (n > 0).then(|| (sx / n as f64, sy / n as f64))
    }
}

/// Outcome of [`reconcile_pages`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Reconciliation {
    /// Records kept from the service.
    pub kept: usize,
    /// Placeholders synthesized for missing pages.
    pub synthesized: usize,
}

/// Replace `layout.pages` with exactly one record per page ordinal
/// `1..=pages.len()`, in order.
///
/// Returned records are indexed by ordinal (the last one wins on duplicates;
/// ordinals outside the document are dropped). Missing ordinals get a
/// placeholder sized from the corrected page image, in the unit of the first
/// returned record (inches when there is none).
pub fn reconcile_pages(
    layout: &mut LayoutResult,
    pages: &[CorrectedPage],
    dpi: u32,
) -> Reconciliation {
    let unit = layout.pages.first().map(|p| p.unit).unwrap_or_default();

    let mut by_number: BTreeMap<usize, PageLayoutRecord> = BTreeMap::new();
    for record in layout.pages.drain(..) {
        by_number.insert(record.page_number, record);
    }

    let mut outcome = Reconciliation::default();
    let mut full = Vec::with_capacity(pages.len());
    for (i, page) in pages.iter().enumerate() {
        let number = i + 1;
        match by_number.remove(&number) {
            Some(record) => {
                outcome.kept += 1;
                full.push(record);
            }
            None => {
                debug!("Page {}: no layout record returned, synthesizing one", number);
                outcome.synthesized += 1;
                let mut record = PageLayoutRecord::placeholder(page, unit, dpi);
                record.page_number = number;
                full.push(record);
            }
        }
    }

    if !by_number.is_empty() {
        debug!(
            "Discarding {} layout record(s) for pages outside 1..={}",
            by_number.len(),
            pages.len()
        );
    }

    layout.pages = full;
    outcome
}
