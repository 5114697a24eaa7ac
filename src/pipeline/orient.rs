//! Orientation detection: how far is a scanned page rotated?
//!
//! Detection is delegated to an external engine behind the
//! [`OrientationDetector`] trait. The default engine is Tesseract's
//! orientation-and-script detection (`--psm 0`), driven as a subprocess so
//! no native OCR library has to be linked.
//!
//! A detector failure is never fatal: the geometry stage logs it, records a
//! [`crate::error::PageError::OrientationFailed`] and keeps the page as
//! rendered.

use crate::pipeline::encode::encode_png;
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;
use tracing::debug;

/// Why a detector could not report an angle.
#[derive(Debug, Error)]
pub enum OrientationError {
    /// The detector executable could not be found.
    #[error("orientation detector '{binary}' not found")]
    NotFound { binary: PathBuf },

    /// The detector ran but reported failure (e.g. too few characters).
    #[error("detector exited with code {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    /// The detector's output did not contain a rotation.
    #[error("could not parse detector output: {output}")]
    Unparseable { output: String },

    /// Preparing the page image for the detector failed.
    #[error("could not prepare page image: {0}")]
    Io(String),
}

/// Reports a page's rotation in degrees, `0.0` meaning upright. The geometry
/// stage corrects it by turning the page counter-clockwise by
/// `(360 − angle) mod 360`.
///
/// Implementations are called from the blocking thread pool and may block.
pub trait OrientationDetector: Send + Sync {
    fn detect(&self, page: &DynamicImage) -> Result<f32, OrientationError>;
}

/// Detector used when deskew is disabled: every page is upright.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRotation;

impl OrientationDetector for NoRotation {
    fn detect(&self, _page: &DynamicImage) -> Result<f32, OrientationError> {
        Ok(0.0)
    }
}

/// Tesseract OSD via the `tesseract` command-line tool.
#[derive(Debug, Clone)]
pub struct TesseractOsd {
    binary: PathBuf,
    dpi: Option<u32>,
}

impl TesseractOsd {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            dpi: None,
        }
    }

    /// Tell Tesseract the raster resolution so it does not have to guess.
    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = Some(dpi);
        self
    }
}

impl OrientationDetector for TesseractOsd {
    fn detect(&self, page: &DynamicImage) -> Result<f32, OrientationError> {
        let png = encode_png(page).map_err(|e| OrientationError::Io(e.to_string()))?;
        let mut tmp = tempfile::Builder::new()
            .prefix("osd_")
            .suffix(".png")
            .tempfile()
            .map_err(|e| OrientationError::Io(e.to_string()))?;
        tmp.write_all(&png)
            .map_err(|e| OrientationError::Io(e.to_string()))?;

        let mut cmd = Command::new(&self.binary);
        cmd.arg(tmp.path()).arg("stdout").args(["--psm", "0"]);
        if let Some(dpi) = self.dpi {
            cmd.args(["--dpi", &dpi.to_string()]);
        }

        let output = cmd.output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                OrientationError::NotFound {
                    binary: self.binary.clone(),
                }
            } else {
                OrientationError::Io(e.to_string())
            }
        })?;

        if !output.status.success() {
            return Err(OrientationError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let angle = parse_osd_rotation(&stdout)?;
        debug!("Tesseract OSD reported rotate={}", angle);
        Ok(angle)
    }
}

static RE_ROTATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*Rotate:\s*(-?\d+(?:\.\d+)?)\s*$").unwrap());

/// Extract the `Rotate:` value from Tesseract's OSD report.
fn parse_osd_rotation(report: &str) -> Result<f32, OrientationError> {
    RE_ROTATE
        .captures(report)
        .and_then(|caps| caps[1].parse::<f32>().ok())
        .ok_or_else(|| OrientationError::Unparseable {
            output: report.trim().chars().take(200).collect(),
        })
}
