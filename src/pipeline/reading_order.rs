//! Reading-order assembly: paragraphs and figures → one linear text.
//!
//! Elements are ordered by page, then by the vertical center of their first
//! bounding region, then by the horizontal center. This is a single-column
//! heuristic: on two-column pages, lines from both columns interleave by
//! height.

use crate::artifact::write_atomic;
use crate::error::Pdf2TexError;
use crate::pipeline::figures::FigureArtifact;
use crate::pipeline::layout::LayoutResult;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum ContentKind {
    Paragraph { text: String },
    /// `marker_path` is empty when no crop was produced for the figure.
    Figure { marker_path: String },
}

/// One positioned element of the document.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentElement {
    /// Position in the layout's paragraph or figure list.
    pub index: usize,
    pub page: usize,
    pub y_center: f64,
    pub x_center: f64,
    pub kind: ContentKind,
}

impl ContentElement {
    /// Text emitted for this element.
    pub fn content(&self) -> String {
        match &self.kind {
            ContentKind::Paragraph { text } => text.clone(),
            ContentKind::Figure { marker_path } => format!("[FIGURE: {marker_path}]"),
        }
    }

    pub fn is_figure(&self) -> bool {
        matches!(self.kind, ContentKind::Figure { .. })
    }

    /// Reading-order comparison: page, then y center, then x center.
    pub fn sort_key(&self, other: &Self) -> Ordering {
        self.page
            .cmp(&other.page)
            .then_with(|| self.y_center.total_cmp(&other.y_center))
            .then_with(|| self.x_center.total_cmp(&other.x_center))
    }
}

/// Build the ordered element list.
///
/// Paragraphs come first, then figures, each in source order; the stable
/// sort keeps that order among exact ties. Elements without a first region
/// carrying at least one coordinate pair are left out.
pub fn assemble(
    layout: &LayoutResult,
    figures: &BTreeMap<usize, FigureArtifact>,
    marker_base: Option<&Path>,
) -> Vec<ContentElement> {
    let mut elements = Vec::with_capacity(layout.paragraphs.len() + layout.figures.len());

    for (index, para) in layout.paragraphs.iter().enumerate() {
        let Some(region) = para.bounding_regions.first() else {
            continue;
        };
        let Some((x, y)) = region.center() else {
            debug!("Paragraph {}: region without coordinates, skipped", index);
            continue;
        };
        elements.push(ContentElement {
            index,
            page: region.page_number,
            y_center: y,
            x_center: x,
            kind: ContentKind::Paragraph {
                text: para.content.clone(),
            },
        });
    }

    for (index, fig) in layout.figures.iter().enumerate() {
        let Some(region) = fig.bounding_regions.first() else {
            continue;
        };
        let Some((x, y)) = region.center() else {
            debug!("Figure {}: region without coordinates, skipped", index);
            continue;
        };
        let marker_path = figures
            .get(&index)
            .map(|a| marker_path(&a.path, marker_base))
            .unwrap_or_default();
        elements.push(ContentElement {
            index,
            page: region.page_number,
            y_center: y,
            x_center: x,
            kind: ContentKind::Figure { marker_path },
        });
    }

    elements.sort_by(ContentElement::sort_key);
    elements
}

/// Path shown in a figure marker: relative to `base` when the artifact lives
/// under it (joined with `/`), otherwise as given.
fn marker_path(path: &Path, base: Option<&Path>) -> String {
    match base.and_then(|b| path.strip_prefix(b).ok()) {
        Some(rel) => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/"),
        None => path.to_string_lossy().into_owned(),
    }
}

/// Each element's content followed by a blank line.
pub fn render_text(elements: &[ContentElement]) -> String {
    let mut out = String::new();
    for element in elements {
        out.push_str(&element.content());
        out.push_str("\n\n");
    }
    out
}

/// Assemble, render and publish the ordered text at `path`.
///
/// Figure markers are written relative to `path`'s directory.
pub fn write_text(
    layout: &LayoutResult,
    figures: &BTreeMap<usize, FigureArtifact>,
    path: &Path,
) -> Result<Vec<ContentElement>, Pdf2TexError> {
    let base = path.parent().filter(|p| !p.as_os_str().is_empty());
    let elements = assemble(layout, figures, base);
    write_atomic(path, render_text(&elements).as_bytes())?;
    info!(
        "Wrote {} elements ({} figures) to {}",
        elements.len(),
        elements.iter().filter(|e| e.is_figure()).count(),
        path.display()
    );
    Ok(elements)
}
