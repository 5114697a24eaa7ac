//! Error types for the edgequake-pdf2tex library.
//!
//! Three tiers of failure, matching how far the damage spreads:
//!
//! * [`Pdf2TexError`]: **Fatal**: the run cannot produce its artifacts
//!   (unreadable input, zero-page document, layout service down, disk full).
//!   Returned as `Err(Pdf2TexError)` from every top-level entry point.
//!
//! * [`PageError`]: **Non-fatal, one page**: the orientation detector
//!   failed on a page, which is then used unrotated. Stored on
//!   [`crate::pipeline::geometry::CorrectedPage::issues`].
//!
//! * [`TypesetError`]: **Non-fatal, final stage**: `pdflatex` or `pandoc`
//!   is missing or failed. The `.tex` source is already on disk, so the run
//!   still succeeds and the error is reported in
//!   [`crate::output::RunOutput::typeset_errors`].
//!
//! Layout-service failures have their own type, [`crate::pipeline::layout::LayoutError`],
//! wrapped by [`Pdf2TexError::LayoutService`] so callers can tell a dead
//! service apart from a bad page.

use crate::pipeline::layout::LayoutError;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2tex library.
#[derive(Debug, Error)]
pub enum Pdf2TexError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The document opened fine but has no pages, so there is nothing to
    /// correct and no corrected document can be produced.
    #[error("PDF '{path}' has no pages; nothing to correct")]
    EmptyDocument { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// pdfium could not assemble the corrected document.
    #[error("Failed to assemble corrected PDF: {detail}")]
    PdfAssemblyFailed { detail: String },

    // ── Layout service ────────────────────────────────────────────────────
    /// The layout-analysis service call failed. No partial layout is usable,
    /// so this aborts figure and text extraction.
    #[error("Layout analysis failed: {0}")]
    LayoutService(#[from] LayoutError),

    /// No layout analyzer was supplied and no endpoint/key is configured.
    #[error("Layout service is not configured.\n{hint}")]
    LayoutServiceNotConfigured { hint: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API kept failing after all retries.
    #[error("LLM API error after {retries} retries: {message}")]
    LlmApiError { retries: u32, message: String },

    /// The ordered text artifact is empty, so there is nothing to typeset.
    #[error("Text artifact '{path}' is empty; nothing to send for LaTeX generation")]
    EmptyText { path: PathBuf },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not persist one of the run's artifacts. The published path is
    /// left untouched; the temporary file is removed.
    #[error("Failed to write artifact '{path}': {source}")]
    ArtifactWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not PNG-encode an image before persisting it.
    #[error("Failed to encode image for '{path}': {detail}")]
    ImageEncodeFailed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
You can:\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium (or its directory).\n\
  • Place libpdfium next to the executable.\n\
  • Install pdfium system-wide so the dynamic loader can find it.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// The page is still corrected and included; the error only explains why a
/// step was skipped.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The orientation detector failed; the page was used unrotated.
    #[error("Page {page}: orientation detection failed: {detail}")]
    OrientationFailed { page: usize, detail: String },
}

/// A non-fatal failure of the final compilation/conversion step.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum TypesetError {
    /// The external tool is not installed or not on `PATH`.
    #[error("`{tool}` not found. Install it and make sure it is on your PATH.")]
    ToolNotFound { tool: String },

    /// The tool ran but exited with a failure status.
    #[error("`{tool}` failed (exit code {code:?}): {stderr}")]
    ToolFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The tool could not be spawned for another reason.
    #[error("Failed to run `{tool}`: {detail}")]
    SpawnFailed { tool: String, detail: String },
}
