//! CLI binary for edgequake-pdf2tex.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig` and prints a run summary.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2tex::{
    convert, process, typeset_existing, OutputFormat, PipelineConfig, PipelineProgressCallback,
    ProgressCallback, RunOutput, TypesetReport,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a page bar during correction, then a spinner for the
/// layout, figure and typesetting stages. Pages may finish out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    warnings: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_run_start` reports the page count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(Self::spinner_style());
        bar.set_prefix("Preparing");
        bar.set_message("Rendering pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            warnings: AtomicUsize::new(0),
        })
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS)
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Correcting");
        self.bar.reset_eta();
    }

    /// Back to a spinner for stages without a page count.
    fn stage(&self, prefix: &'static str, message: String) {
        self.bar.set_style(Self::spinner_style());
        self.bar.set_prefix(prefix);
        self.bar.set_message(message);
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Correcting {total_pages} pages…"))
        ));
    }

    fn on_page_corrected(&self, page: usize, total_pages: usize, rotation: f32) {
        let turned = if rotation == 0.0 {
            dim("upright")
        } else {
            format!("rotated {rotation:.0}°")
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page,
            total_pages,
            turned
        ));
        self.bar.inc(1);
    }

    fn on_page_warning(&self, page: usize, message: &str) {
        self.warnings.fetch_add(1, Ordering::SeqCst);
        let msg = if message.chars().count() > 80 {
            let cut: String = message.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            message.to_string()
        };
        self.bar
            .println(format!("  {} Page {:>3}  {}", yellow("⚠"), page, yellow(&msg)));
    }

    fn on_layout_start(&self, document_bytes: usize) {
        self.stage(
            "Layout",
            format!("Analysing corrected PDF ({} KiB)…", document_bytes / 1024),
        );
    }

    fn on_layout_complete(&self, pages: usize, placeholders: usize) {
        let note = if placeholders == 0 {
            String::new()
        } else {
            yellow(&format!("  ({placeholders} pages missing from the response)"))
        };
        self.bar.println(format!(
            "  {} Layout  {} page records{}",
            green("✓"),
            pages,
            note
        ));
        self.stage("Figures", "Cropping figures…".to_string());
    }

    fn on_figures_extracted(&self, extracted: usize, total: usize) {
        self.bar.println(format!(
            "  {} Figures {}/{} extracted",
            if extracted == total {
                green("✓")
            } else {
                yellow("⚠")
            },
            extracted,
            total
        ));
    }

    fn on_text_written(&self, elements: usize) {
        self.bar.println(format!(
            "  {} Text    {} elements in reading order",
            green("✓"),
            elements
        ));
    }

    fn on_typeset_step(&self, step: &str) {
        let message = match step {
            "latex" => "Generating LaTeX…".to_string(),
            other => format!("Running {other}…"),
        };
        self.stage("Typesetting", message);
    }

    fn on_run_complete(&self, total_pages: usize, figures: usize) {
        self.bar.finish_and_clear();
        let warnings = self.warnings.load(Ordering::SeqCst);
        if warnings == 0 {
            eprintln!(
                "{} {} pages, {} figures",
                green("✔"),
                bold(&total_pages.to_string()),
                figures
            );
        } else {
            eprintln!(
                "{} {} pages, {} figures  ({} page warnings)",
                cyan("⚠"),
                bold(&total_pages.to_string()),
                figures,
                yellow(&warnings.to_string())
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Full run: correct, analyse, typeset to PDF
  pdf2tex exam.pdf

  # Stop after the ordered text (no LLM call)
  pdf2tex --skip-latex exam.pdf

  # Re-typeset an existing work directory as Word and PDF
  pdf2tex --typeset-only --format both exam.pdf

  # Scans that are already upright
  pdf2tex --no-deskew --dpi 200 exam.pdf -w exam_out

  # JSON run report
  pdf2tex --json exam.pdf > report.json

WORK DIRECTORY (default <stem>_pdf2tex/):
  images/page_<n>_processed.png   corrected pages
  corrected.pdf                   reassembled corrected document
  analysis.json                   reconciled layout snapshot
  figures/figure_<page>_<i>.png   figure crops
  output.txt                      ordered text with [FIGURE: …] markers
  paper.tex / .pdf / .docx        typeset output

ENVIRONMENT VARIABLES:
  DOC_INTELLIGENCE_ENDPOINT  Layout service endpoint
  DOC_INTELLIGENCE_KEY       Layout service key
  OPENAI_API_KEY             OpenAI API key
  EDGEQUAKE_LLM_PROVIDER     Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL            Override model ID
  PDFIUM_LIB_PATH            Path to libpdfium (file or directory)

EXTERNAL TOOLS:
  tesseract   orientation detection (disable with --no-deskew)
  pdflatex    --format pdf|both
  pandoc      --format docx|both
"#;

/// Deskew, crop and lay out scanned exam papers, then typeset them as LaTeX.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2tex",
    version,
    about = "Deskew, crop and lay out scanned exam papers, then typeset them as LaTeX",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Scanned PDF file.
    input: PathBuf,

    /// Directory for all artifacts. Default: `<input stem>_pdf2tex`.
    #[arg(short, long, env = "PDF2TEX_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Rasterisation DPI (72–600).
    #[arg(long, env = "PDF2TEX_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Padding around the detected content box, in pixels.
    #[arg(long, env = "PDF2TEX_PAD", default_value_t = 20)]
    pad: u32,

    /// Mean intensity (1–255) at or above which a row/column is blank.
    #[arg(long, env = "PDF2TEX_WHITE_THRESHOLD", default_value_t = 245,
          value_parser = clap::value_parser!(u8).range(1..))]
    white_threshold: u8,

    /// Pages corrected in parallel.
    #[arg(short, long, env = "PDF2TEX_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Skip orientation detection.
    #[arg(long, env = "PDF2TEX_NO_DESKEW")]
    no_deskew: bool,

    /// Tesseract executable.
    #[arg(long, env = "PDF2TEX_TESSERACT", default_value = "tesseract")]
    tesseract: PathBuf,

    /// Layout service endpoint.
    #[arg(long, env = "DOC_INTELLIGENCE_ENDPOINT")]
    layout_endpoint: Option<String>,

    /// Layout service key.
    #[arg(long, env = "DOC_INTELLIGENCE_KEY", hide_env_values = true)]
    layout_key: Option<String>,

    /// Layout model identifier.
    #[arg(long, env = "PDF2TEX_LAYOUT_MODEL", default_value = "prebuilt-layout")]
    layout_model: String,

    /// Give up on the layout analysis after this many seconds.
    #[arg(long, env = "PDF2TEX_LAYOUT_TIMEOUT")]
    layout_timeout: Option<u64>,

    /// Path to libpdfium (file or directory).
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// LLM model ID for LaTeX generation (default gpt-4o-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Compiled outputs to produce from the `.tex`.
    #[arg(short, long, env = "PDF2TEX_FORMAT", value_enum, default_value = "pdf")]
    format: FormatArg,

    /// Stop after the ordered text; no LLM call.
    #[arg(long, conflicts_with = "typeset_only")]
    skip_latex: bool,

    /// Only run LaTeX generation on the work directory's existing output.txt.
    #[arg(long)]
    typeset_only: bool,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2TEX_PASSWORD")]
    password: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "PDF2TEX_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens for the whole document.
    #[arg(long, env = "PDF2TEX_MAX_TOKENS", default_value_t = 7000)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF2TEX_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries on LLM failure.
    #[arg(long, env = "PDF2TEX_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Print the run report as JSON on stdout.
    #[arg(long, env = "PDF2TEX_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2TEX_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2TEX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2TEX_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Tex,
    Pdf,
    Docx,
    Both,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Tex => OutputFormat::TexOnly,
            FormatArg::Pdf => OutputFormat::Pdf,
            FormatArg::Docx => OutputFormat::Docx,
            FormatArg::Both => OutputFormat::Both,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; --verbose always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress && !cli.typeset_only {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    // ── Typeset-only mode ────────────────────────────────────────────────
    if cli.typeset_only {
        let report = typeset_existing(&config)
            .await
            .context("Typesetting failed")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialise report")?
            );
        } else if !cli.quiet {
            print_typeset(&report);
        }
        return Ok(());
    }

    // ── Full run ─────────────────────────────────────────────────────────
    let output = if cli.skip_latex {
        process(&cli.input, &config).await
    } else {
        convert(&cli.input, &config).await
    }
    .context("Run failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        );
    } else if !cli.quiet {
        print_summary(&output, show_progress);
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let work_dir = cli
        .work_dir
        .clone()
        .unwrap_or_else(|| default_work_dir(&cli.input));

    let mut builder = PipelineConfig::builder()
        .work_dir(&work_dir)
        .dpi(cli.dpi)
        .pad_px(cli.pad)
        .white_threshold(cli.white_threshold)
        .concurrency(cli.concurrency)
        .deskew(!cli.no_deskew)
        .tesseract_binary(cli.tesseract.clone())
        .layout_model_id(cli.layout_model.clone())
        .output_format(cli.format.into())
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    if let Some(secs) = cli.layout_timeout {
        builder = builder.layout_max_wait_secs(secs);
    }

    let mut config = builder.build().context("Invalid configuration")?;

    config.layout_endpoint = cli.layout_endpoint.clone();
    config.layout_api_key = cli.layout_key.clone();
    config.pdfium_library_path = cli.pdfium_lib.clone();
    config.model = cli.model.clone();
    config.provider_name = cli.provider.clone();
    config.password = cli.password.clone();
    config.system_prompt = system_prompt;

    Ok(config)
}

/// `exam.pdf` → `exam_pdf2tex`, next to the input.
fn default_work_dir(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    input.with_file_name(format!("{stem}_pdf2tex"))
}

fn print_summary(output: &RunOutput, show_progress: bool) {
    let stats = &output.stats;
    if !show_progress {
        eprintln!(
            "Processed {} pages ({} rotated) and {} figures in {}ms",
            stats.total_pages, stats.rotated_pages, stats.figures_extracted, stats.total_duration_ms
        );
        for warning in output.warnings() {
            eprintln!("  warning: {warning}");
        }
    }
    eprintln!(
        "   {}  {}",
        dim("text"),
        bold(&output.artifacts.output_txt.display().to_string())
    );
    if let Some(ref report) = output.typeset {
        print_typeset(report);
    }
}

fn print_typeset(report: &TypesetReport) {
    eprintln!(
        "   {}   {}",
        dim("tex"),
        bold(&report.tex_file.display().to_string())
    );
    for path in report.pdf.iter().chain(report.docx.iter()) {
        eprintln!("   {}   {}", green("→"), path.display());
    }
    for err in &report.errors {
        eprintln!("   {} {}", red("✗"), err);
    }
    eprintln!(
        "   {} tokens in  /  {} tokens out",
        dim(&report.input_tokens.to_string()),
        dim(&report.output_tokens.to_string()),
    );
}
