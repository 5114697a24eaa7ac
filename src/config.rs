//! Configuration types for the scan-correction and typesetting pipeline.
//!
//! Every knob lives in [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. Components receive the config explicitly; the
//! library never reads resolution, thresholds or service credentials from
//! the environment on its own, which keeps every stage deterministic under
//! test.

use crate::error::Pdf2TexError;
use crate::pipeline::layout::LayoutAnalyzer;
use crate::pipeline::orient::OrientationDetector;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where each artifact of a run is published.
///
/// All paths are written atomically (temp file + rename), so a path that
/// exists always holds a complete artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPaths {
    /// Directory for `page_<n>_processed.png`.
    pub images_dir: PathBuf,
    /// Directory for `figure_<page>_<index>.png`.
    pub figures_dir: PathBuf,
    /// The reassembled, corrected multi-page PDF.
    pub corrected_pdf: PathBuf,
    /// JSON snapshot of the reconciled layout.
    pub layout_json: PathBuf,
    /// Ordered, blank-line-delimited text with figure markers.
    pub output_txt: PathBuf,
    /// Generated LaTeX source. Compiled `.pdf`/`.docx` land next to it.
    pub tex_file: PathBuf,
}

impl OutputPaths {
    /// The conventional layout under a single work directory:
    ///
    /// ```text
    /// <dir>/images/  <dir>/figures/  <dir>/corrected.pdf
    /// <dir>/analysis.json  <dir>/output.txt  <dir>/paper.tex
    /// ```
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            images_dir: dir.join("images"),
            figures_dir: dir.join("figures"),
            corrected_pdf: dir.join("corrected.pdf"),
            layout_json: dir.join("analysis.json"),
            output_txt: dir.join("output.txt"),
            tex_file: dir.join("paper.tex"),
        }
    }

    /// Directory the typesetting tools run in (the `.tex` file's parent).
    pub fn work_dir(&self) -> &Path {
        match self.tex_file.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }
}

impl Default for OutputPaths {
    fn default() -> Self {
        Self::in_dir("pdf2tex_out")
    }
}

/// Configuration for one pipeline run.
///
/// Built via [`PipelineConfig::builder()`] or [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdf2tex::{OutputPaths, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .dpi(200)
///     .pad_px(10)
///     .paths(OutputPaths::in_dir("/tmp/exam"))
///     .build()
///     .unwrap();
/// assert_eq!(config.white_threshold, 245);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Rasterisation resolution in dots per inch. Range: 72–600. Default: 300.
    ///
    /// Also used to convert page pixels back into inches when a placeholder
    /// layout record is synthesized and when the corrected PDF is assembled.
    pub dpi: u32,

    /// Padding added around the detected content box, in pixels. Default: 20.
    pub pad_px: u32,

    /// Mean grayscale intensity (0–255) at or above which a row or column
    /// counts as blank. Default: 245.
    pub white_threshold: u8,

    /// Pages corrected in parallel on the blocking pool. Default: 4.
    pub concurrency: usize,

    /// Artifact locations.
    pub paths: OutputPaths,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Explicit pdfium library file or directory. If None, looks next to the
    /// executable, then in the system library path.
    pub pdfium_library_path: Option<PathBuf>,

    /// Run orientation detection and rotate pages upright. Default: true.
    pub deskew: bool,

    /// Tesseract executable used by the default orientation detector.
    pub tesseract_binary: PathBuf,

    /// Pre-constructed orientation detector. Takes precedence over
    /// `tesseract_binary`.
    pub orientation_detector: Option<Arc<dyn OrientationDetector>>,

    /// Document Intelligence endpoint, e.g. `https://<name>.cognitiveservices.azure.com`.
    pub layout_endpoint: Option<String>,

    /// Document Intelligence subscription key.
    pub layout_api_key: Option<String>,

    /// Layout model identifier. Default: `prebuilt-layout`.
    pub layout_model_id: String,

    /// REST API version. Default: `2024-11-30`.
    pub layout_api_version: String,

    /// Delay between polls when the service sends no `Retry-After`. Default: 1000.
    pub layout_poll_interval_ms: u64,

    /// Give up waiting for the analysis after this many seconds. Default: None.
    ///
    /// The service enforces its own processing bound; leave this unset unless
    /// the caller needs a hard deadline.
    pub layout_max_wait_secs: Option<u64>,

    /// Pre-constructed layout analyzer. Takes precedence over the endpoint/key.
    pub layout_analyzer: Option<Arc<dyn LayoutAnalyzer>>,

    /// LLM model identifier for LaTeX generation. If None, uses `gpt-4o-mini`.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "azure", "anthropic").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for LaTeX generation. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate for the whole document. Default: 7000.
    pub max_tokens: usize,

    /// Retry attempts on a failed LLM call. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Custom system prompt. If None, uses the built-in exam-paper prompt.
    pub system_prompt: Option<String>,

    /// Which compiled outputs to produce from the `.tex`. Default: Pdf.
    pub output_format: OutputFormat,

    /// LaTeX compiler executable. Default: `pdflatex`.
    pub pdflatex_binary: PathBuf,

    /// Pandoc executable used for Word output. Default: `pandoc`.
    pub pandoc_binary: PathBuf,

    /// Progress events. Default: None.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            pad_px: 20,
            white_threshold: 245,
            concurrency: 4,
            paths: OutputPaths::default(),
            password: None,
            pdfium_library_path: None,
            deskew: true,
            tesseract_binary: PathBuf::from("tesseract"),
            orientation_detector: None,
            layout_endpoint: None,
            layout_api_key: None,
            layout_model_id: "prebuilt-layout".to_string(),
            layout_api_version: "2024-11-30".to_string(),
            layout_poll_interval_ms: 1000,
            layout_max_wait_secs: None,
            layout_analyzer: None,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 7000,
            max_retries: 3,
            retry_backoff_ms: 500,
            system_prompt: None,
            output_format: OutputFormat::default(),
            pdflatex_binary: PathBuf::from("pdflatex"),
            pandoc_binary: PathBuf::from("pandoc"),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("dpi", &self.dpi)
            .field("pad_px", &self.pad_px)
            .field("white_threshold", &self.white_threshold)
            .field("concurrency", &self.concurrency)
            .field("paths", &self.paths)
            .field("pdfium_library_path", &self.pdfium_library_path)
            .field("deskew", &self.deskew)
            .field("tesseract_binary", &self.tesseract_binary)
            .field(
                "orientation_detector",
                &self.orientation_detector.as_ref().map(|_| "<dyn OrientationDetector>"),
            )
            .field("layout_endpoint", &self.layout_endpoint)
            .field("layout_api_key", &self.layout_api_key.as_ref().map(|_| "<redacted>"))
            .field("layout_model_id", &self.layout_model_id)
            .field("layout_api_version", &self.layout_api_version)
            .field(
                "layout_analyzer",
                &self.layout_analyzer.as_ref().map(|_| "<dyn LayoutAnalyzer>"),
            )
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("output_format", &self.output_format)
            .field("pdflatex_binary", &self.pdflatex_binary)
            .field("pandoc_binary", &self.pandoc_binary)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn pad_px(mut self, px: u32) -> Self {
        self.config.pad_px = px;
        self
    }

    pub fn white_threshold(mut self, threshold: u8) -> Self {
        self.config.white_threshold = threshold;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn paths(mut self, paths: OutputPaths) -> Self {
        self.config.paths = paths;
        self
    }

    pub fn work_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.paths = OutputPaths::in_dir(dir);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn deskew(mut self, v: bool) -> Self {
        self.config.deskew = v;
        self
    }

    pub fn tesseract_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_binary = path.into();
        self
    }

    pub fn orientation_detector(mut self, detector: Arc<dyn OrientationDetector>) -> Self {
        self.config.orientation_detector = Some(detector);
        self
    }

    pub fn layout_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.layout_endpoint = Some(endpoint.into());
        self
    }

    pub fn layout_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.layout_api_key = Some(key.into());
        self
    }

    pub fn layout_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.config.layout_model_id = model_id.into();
        self
    }

    pub fn layout_api_version(mut self, version: impl Into<String>) -> Self {
        self.config.layout_api_version = version.into();
        self
    }

    pub fn layout_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.layout_poll_interval_ms = ms.max(100);
        self
    }

    pub fn layout_max_wait_secs(mut self, secs: u64) -> Self {
        self.config.layout_max_wait_secs = Some(secs);
        self
    }

    pub fn layout_analyzer(mut self, analyzer: Arc<dyn LayoutAnalyzer>) -> Self {
        self.config.layout_analyzer = Some(analyzer);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    pub fn pdflatex_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdflatex_binary = path.into();
        self
    }

    pub fn pandoc_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pandoc_binary = path.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, Pdf2TexError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(Pdf2TexError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(Pdf2TexError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.white_threshold == 0 {
            return Err(Pdf2TexError::InvalidConfig(
                "White threshold must be > 0, otherwise no row can ever hold content".into(),
            ));
        }
        if c.layout_model_id.trim().is_empty() {
            return Err(Pdf2TexError::InvalidConfig(
                "Layout model id must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which compiled documents to produce from the generated `.tex`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Only write the `.tex` source.
    TexOnly,
    /// Compile to PDF with `pdflatex`. (default)
    #[default]
    Pdf,
    /// Convert to Word with `pandoc`.
    Docx,
    /// Both PDF and Word.
    Both,
}

impl OutputFormat {
    pub fn wants_pdf(self) -> bool {
        matches!(self, OutputFormat::Pdf | OutputFormat::Both)
    }

    pub fn wants_docx(self) -> bool {
        matches!(self, OutputFormat::Docx | OutputFormat::Both)
    }
}
