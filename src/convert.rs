//! Pipeline entry points.
//!
//! A run is a fixed sequence of stages, each consuming the previous stage's
//! output:
//!
//! 1. render every page (pdfium, `spawn_blocking`)
//! 2. deskew and crop pages with bounded parallelism, publish page PNGs
//! 3. reassemble the corrected PDF and publish it
//! 4. layout analysis of the corrected PDF, page reconciliation, JSON snapshot
//! 5. figure crops
//! 6. reading-order text
//! 7. *(convert only)* LaTeX generation, `.tex`, optional PDF/DOCX
//!
//! [`process`] runs 1–6, [`convert`] runs all of them. [`correct_pages`] and
//! [`analyze_corrected`] expose the pdfium-free middle of the pipeline for
//! callers that already hold page rasters.

use crate::artifact::{save_json, save_png, write_atomic};
use crate::config::PipelineConfig;
use crate::error::Pdf2TexError;
use crate::output::{ArtifactPaths, PageSummary, RunOutput, RunStats, TypesetReport};
use crate::pipeline::azure::DocumentIntelligenceClient;
use crate::pipeline::figures::{extract_figures, FigureArtifact};
use crate::pipeline::geometry::{correct_page, page_file_name, CorrectedPage, CorrectionParams};
use crate::pipeline::layout::{
    reconcile_pages, LayoutAnalyzer, LayoutResult, Reconciliation, PDF_CONTENT_TYPE,
};
use crate::pipeline::orient::{NoRotation, OrientationDetector, TesseractOsd};
use crate::pipeline::reading_order::{write_text, ContentElement};
use crate::pipeline::{input, llm, render, typeset};
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Correct a scanned PDF and produce its layout snapshot, figure crops and
/// ordered text. Does not call the LLM.
///
/// # Errors
/// Fatal conditions only: unreadable or empty input, a layout service
/// failure, or an artifact that could not be written. Per-page orientation
/// failures are reported in [`RunOutput::pages`].
pub async fn process(
    input_path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<RunOutput, Pdf2TexError> {
    let analyzer = resolve_layout_analyzer(config)?;
    let resolved = input::resolve_local(input_path.as_ref())?;
    let output = run_correction_and_layout(resolved.path(), analyzer.as_ref(), config).await?;
    notify_complete(&output, config);
    Ok(output)
}

/// [`process`], then generate LaTeX from the ordered text and compile it as
/// `config.output_format` asks.
///
/// A missing `pdflatex`/`pandoc` or a failed compile does not fail the run;
/// see [`TypesetReport::errors`].
pub async fn convert(
    input_path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<RunOutput, Pdf2TexError> {
    let analyzer = resolve_layout_analyzer(config)?;
    let provider = resolve_provider(config)?;
    let resolved = input::resolve_local(input_path.as_ref())?;

    let mut output = run_correction_and_layout(resolved.path(), analyzer.as_ref(), config).await?;
    let started = Instant::now();
    output.typeset = Some(typeset_text(&provider, config).await?);
    output.stats.total_duration_ms += started.elapsed().as_millis() as u64;
    notify_complete(&output, config);
    Ok(output)
}

fn notify_complete(output: &RunOutput, config: &PipelineConfig) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(output.stats.total_pages, output.stats.figures_extracted);
    }
}

/// Synchronous wrapper around [`convert`]. Creates a temporary tokio runtime.
pub fn convert_sync(
    input_path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<RunOutput, Pdf2TexError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2TexError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_path, config))
}

/// [`process`] for a PDF held in memory.
pub async fn process_bytes(
    bytes: &[u8],
    config: &PipelineConfig,
) -> Result<RunOutput, Pdf2TexError> {
    let analyzer = resolve_layout_analyzer(config)?;
    let spilled = input::spill_bytes(bytes)?;
    // `spilled` is deleted when it drops at the end of this call.
    let output = run_correction_and_layout(spilled.path(), analyzer.as_ref(), config).await?;
    notify_complete(&output, config);
    Ok(output)
}

/// [`convert`] for a PDF held in memory.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf2tex::{convert_from_bytes, PipelineConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("exam.pdf")?;
/// let config = PipelineConfig::builder().work_dir("exam_out").build()?;
/// let output = convert_from_bytes(&bytes, &config).await?;
/// println!("{}", output.typeset.unwrap().tex_file.display());
/// # Ok(())
/// # }
/// ```
pub async fn convert_from_bytes(
    bytes: &[u8],
    config: &PipelineConfig,
) -> Result<RunOutput, Pdf2TexError> {
    let spilled = input::spill_bytes(bytes)?;
    convert(spilled.path(), config).await
}

/// Run only the LaTeX stage on an existing ordered-text artifact at
/// `config.paths.output_txt`.
pub async fn typeset_existing(config: &PipelineConfig) -> Result<TypesetReport, Pdf2TexError> {
    let provider = resolve_provider(config)?;
    typeset_text(&provider, config).await
}

// ── Stages ───────────────────────────────────────────────────────────────

/// Deskew, crop and publish every page, keeping page order.
///
/// Pages are processed on the blocking pool, at most `config.concurrency`
/// at a time. Detector failures never fail the call.
pub async fn correct_pages(
    images: Vec<DynamicImage>,
    config: &PipelineConfig,
) -> Result<Vec<CorrectedPage>, Pdf2TexError> {
    let detector = resolve_orientation_detector(config);
    let params = CorrectionParams::from(config);
    let total = images.len();
    let images_dir = config.paths.images_dir.clone();
    let progress = config.progress_callback.clone();

    if let Some(ref cb) = progress {
        cb.on_run_start(total);
    }

    let results: Vec<Result<CorrectedPage, Pdf2TexError>> =
        stream::iter(images.into_iter().enumerate().map(|(idx, image)| {
            let detector = Arc::clone(&detector);
            let path = images_dir.join(page_file_name(idx + 1));
            let progress = progress.clone();
            async move {
                let number = idx + 1;
                let page = tokio::task::spawn_blocking(move || {
                    let page = correct_page(number, image, detector.as_ref(), &params);
                    save_png(&page.image, &path).map(|_| page)
                })
                .await
                .map_err(|e| Pdf2TexError::Internal(format!("Correction task panicked: {}", e)))??;

                if let Some(ref cb) = progress {
                    for issue in &page.issues {
                        cb.on_page_warning(number, &issue.to_string());
                    }
                    cb.on_page_corrected(number, total, page.rotation);
                }
                Ok::<_, Pdf2TexError>(page)
            }
        }))
        .buffered(config.concurrency)
        .collect()
        .await;

    results.into_iter().collect()
}

/// Result of the layout-onward stages.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Reconciled layout, one page record per page.
    pub layout: Arc<LayoutResult>,
    pub reconciliation: Reconciliation,
    pub figures: BTreeMap<usize, FigureArtifact>,
    pub elements: Vec<ContentElement>,
    pub layout_duration_ms: u64,
}

/// Send the corrected document to `analyzer`, reconcile and persist the
/// layout, crop figures and write the ordered text.
pub async fn analyze_corrected(
    pages: Arc<Vec<CorrectedPage>>,
    document: &[u8],
    analyzer: &dyn LayoutAnalyzer,
    config: &PipelineConfig,
) -> Result<Analysis, Pdf2TexError> {
    let progress = config.progress_callback.as_ref();

    if let Some(cb) = progress {
        cb.on_layout_start(document.len());
    }
    let started = Instant::now();
    let mut layout = analyzer.analyze(document, PDF_CONTENT_TYPE).await?;
    let layout_duration_ms = started.elapsed().as_millis() as u64;
    info!(
        "Layout analysis: {} page records, {} paragraphs, {} figures in {}ms",
        layout.pages.len(),
        layout.paragraphs.len(),
        layout.figures.len(),
        layout_duration_ms
    );

    let reconciliation = reconcile_pages(&mut layout, &pages, config.dpi);
    save_json(&layout, &config.paths.layout_json)?;
    if let Some(cb) = progress {
        cb.on_layout_complete(layout.pages.len(), reconciliation.synthesized);
    }

    let layout = Arc::new(layout);
    let figures = {
        let layout = Arc::clone(&layout);
        let pages = Arc::clone(&pages);
        let dir = config.paths.figures_dir.clone();
        tokio::task::spawn_blocking(move || extract_figures(&layout, &pages, &dir))
            .await
            .map_err(|e| Pdf2TexError::Internal(format!("Figure task panicked: {}", e)))??
    };
    if let Some(cb) = progress {
        cb.on_figures_extracted(figures.len(), layout.figures.len());
    }

    let elements = write_text(&layout, &figures, &config.paths.output_txt)?;
    if let Some(cb) = progress {
        cb.on_text_written(elements.len());
    }

    Ok(Analysis {
        layout,
        reconciliation,
        figures,
        elements,
        layout_duration_ms,
    })
}

async fn run_correction_and_layout(
    pdf_path: &Path,
    analyzer: &dyn LayoutAnalyzer,
    config: &PipelineConfig,
) -> Result<RunOutput, Pdf2TexError> {
    let total_start = Instant::now();
    info!("Starting run: {}", pdf_path.display());

    let render_start = Instant::now();
    let rendered = render::render_pages(pdf_path, config).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!("Rendered {} pages in {}ms", rendered.len(), render_duration_ms);

    let correction_start = Instant::now();
    let pages = Arc::new(correct_pages(rendered, config).await?);
    let correction_duration_ms = correction_start.elapsed().as_millis() as u64;
    info!("Corrected {} pages in {}ms", pages.len(), correction_duration_ms);

    let document = render::assemble_pdf(Arc::clone(&pages), config).await?;
    write_atomic(&config.paths.corrected_pdf, &document)?;

    let analysis = analyze_corrected(Arc::clone(&pages), &document, analyzer, config).await?;

    let mut stats = RunStats {
        placeholder_pages: analysis.reconciliation.synthesized,
        figures_found: analysis.layout.figures.len(),
        figures_extracted: analysis.figures.len(),
        text_elements: analysis.elements.len(),
        render_duration_ms,
        correction_duration_ms,
        layout_duration_ms: analysis.layout_duration_ms,
        ..Default::default()
    };
    stats.count_pages(&pages);
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Run complete: {} pages ({} rotated, {} placeholders), {} figures, {}ms",
        stats.total_pages,
        stats.rotated_pages,
        stats.placeholder_pages,
        stats.figures_extracted,
        stats.total_duration_ms
    );

    Ok(RunOutput {
        artifacts: ArtifactPaths {
            page_images: pages
                .iter()
                .map(|p| config.paths.images_dir.join(page_file_name(p.number)))
                .collect(),
            corrected_pdf: config.paths.corrected_pdf.clone(),
            layout_json: config.paths.layout_json.clone(),
            output_txt: config.paths.output_txt.clone(),
        },
        pages: pages.iter().map(PageSummary::from).collect(),
        figures: analysis.figures,
        typeset: None,
        stats,
    })
}

async fn typeset_text(
    provider: &Arc<dyn LLMProvider>,
    config: &PipelineConfig,
) -> Result<TypesetReport, Pdf2TexError> {
    let progress = config.progress_callback.as_ref();
    let text = llm::read_text(&config.paths.output_txt).await?;

    if let Some(cb) = progress {
        cb.on_typeset_step("latex");
    }
    let generation = llm::generate_latex(provider, &text, config).await?;
    let tex_file = config.paths.tex_file.clone();
    typeset::write_tex(&generation.body, &tex_file)?;

    let started = Instant::now();
    let outcome = typeset::typeset(&tex_file, config, progress).await;
    let compile_duration_ms = started.elapsed().as_millis() as u64;
    debug!(
        "Typesetting finished: pdf={:?} docx={:?} errors={}",
        outcome.pdf,
        outcome.docx,
        outcome.errors.len()
    );

    Ok(TypesetReport {
        tex_file,
        pdf: outcome.pdf,
        docx: outcome.docx,
        errors: outcome.errors,
        input_tokens: generation.input_tokens,
        output_tokens: generation.output_tokens,
        llm_retries: generation.retries,
        llm_duration_ms: generation.duration_ms,
        compile_duration_ms,
    })
}

// ── Capability resolution ────────────────────────────────────────────────

/// Pre-built analyzer, else a Document Intelligence client from the
/// configured endpoint and key.
pub fn resolve_layout_analyzer(
    config: &PipelineConfig,
) -> Result<Arc<dyn LayoutAnalyzer>, Pdf2TexError> {
    if let Some(ref analyzer) = config.layout_analyzer {
        return Ok(Arc::clone(analyzer));
    }
    Ok(Arc::new(DocumentIntelligenceClient::from_config(config)?))
}

/// [`NoRotation`] when deskew is off, else the configured detector, else
/// Tesseract OSD.
pub fn resolve_orientation_detector(config: &PipelineConfig) -> Arc<dyn OrientationDetector> {
    if !config.deskew {
        return Arc::new(NoRotation);
    }
    if let Some(ref detector) = config.orientation_detector {
        return Arc::clone(detector);
    }
    Arc::new(TesseractOsd::new(config.tesseract_binary.clone()).with_dpi(config.dpi))
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, Pdf2TexError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2TexError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`, `config.model`);
///    the factory reads that provider's API key from the environment.
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
/// 4. **OpenAI** when `OPENAI_API_KEY` is set.
/// 5. **Full auto-detection** via [`ProviderFactory::from_env`].
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, Pdf2TexError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = config.provider_name {
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_provider(&prov, &env_model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2TexError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, AZURE_OPENAI_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
