//! # edgequake-pdf2tex
//!
//! Turn scanned exam papers into clean LaTeX.
//!
//! Scans arrive rotated, with wide margins, and without a text layer. This
//! crate straightens and crops every page, rebuilds a corrected PDF, sends it
//! to a layout-analysis service once, crops out the figures the service
//! found, and writes the paragraphs and figure markers as one reading-ordered
//! text. That text is then handed to an LLM that typesets it as LaTeX.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Render    rasterise pages via pdfium (spawn_blocking)
//!  ├─ 2. Correct   orientation detection, rotate, trim margins (parallel)
//!  ├─ 3. Assemble  corrected multi-page PDF
//!  ├─ 4. Layout    one analysis call, page reconciliation, JSON snapshot
//!  ├─ 5. Figures   crop figure regions into PNGs
//!  ├─ 6. Text      paragraphs + [FIGURE: …] markers in reading order
//!  └─ 7. LaTeX     LLM generation, cleanup, pdflatex / pandoc
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2tex::{convert, OutputFormat, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .work_dir("physics_out")
//!         .layout_endpoint("https://my-di.cognitiveservices.azure.com")
//!         .layout_api_key(std::env::var("DOC_INTELLIGENCE_KEY")?)
//!         .output_format(OutputFormat::Both)
//!         .build()?;
//!     let output = convert("physics.pdf", &config).await?;
//!     eprintln!(
//!         "{} pages, {} figures",
//!         output.stats.total_pages, output.stats.figures_extracted
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2tex` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! ## External tools
//!
//! Orientation detection runs the `tesseract` CLI (`--psm 0`). Compilation
//! uses `pdflatex` and `pandoc`. All three are optional: without Tesseract
//! pages are used unrotated (or pass `deskew(false)`), and without the
//! typesetters the run still produces the `.tex`.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod artifact;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{OutputFormat, OutputPaths, PipelineConfig, PipelineConfigBuilder};
pub use convert::{
    analyze_corrected, convert, convert_from_bytes, convert_sync, correct_pages, process,
    process_bytes, typeset_existing, Analysis,
};
pub use error::{PageError, Pdf2TexError, TypesetError};
pub use output::{ArtifactPaths, PageSummary, RunOutput, RunStats, TypesetReport};
pub use pipeline::azure::DocumentIntelligenceClient;
pub use pipeline::figures::FigureArtifact;
pub use pipeline::geometry::{CorrectedPage, CropRect};
pub use pipeline::layout::{LayoutAnalyzer, LayoutError, LayoutResult};
pub use pipeline::orient::{NoRotation, OrientationDetector, OrientationError, TesseractOsd};
pub use pipeline::reading_order::{ContentElement, ContentKind};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
