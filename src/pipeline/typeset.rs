//! Typesetting: wrap the LaTeX body, then compile with `pdflatex` and/or
//! convert with `pandoc`.
//!
//! Both tools run in the `.tex` file's directory so relative
//! `\includegraphics{figures/...}` paths resolve. Tool failures are
//! collected as [`TypesetError`]s rather than returned: the `.tex` is already
//! published at that point and is the primary deliverable.

use crate::artifact::write_atomic;
use crate::config::{OutputFormat, PipelineConfig};
use crate::error::{Pdf2TexError, TypesetError};
use crate::progress::ProgressCallback;
use crate::prompts::wrap_document;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// What the compile step produced.
#[derive(Debug, Clone, Default)]
pub struct TypesetOutcome {
    pub pdf: Option<PathBuf>,
    pub docx: Option<PathBuf>,
    pub errors: Vec<TypesetError>,
}

/// Wrap `body` in the standard preamble and publish it at `tex_path`.
pub fn write_tex(body: &str, tex_path: &Path) -> Result<(), Pdf2TexError> {
    write_atomic(tex_path, wrap_document(body).as_bytes())?;
    info!("LaTeX written to {}", tex_path.display());
    Ok(())
}

/// Produce the outputs `config.output_format` asks for from `tex_path`.
pub async fn typeset(
    tex_path: &Path,
    config: &PipelineConfig,
    progress: Option<&ProgressCallback>,
) -> TypesetOutcome {
    let mut outcome = TypesetOutcome::default();
    let format = config.output_format;
    if format == OutputFormat::TexOnly {
        return outcome;
    }

    if format.wants_pdf() {
        if let Some(cb) = progress {
            cb.on_typeset_step("pdflatex");
        }
        match compile_pdf(&config.pdflatex_binary, tex_path).await {
            Ok(pdf) => outcome.pdf = Some(pdf),
            Err(e) => {
                warn!("PDF compilation failed: {}", e);
                outcome.errors.push(e);
            }
        }
    }

    if format.wants_docx() {
        if let Some(cb) = progress {
            cb.on_typeset_step("pandoc");
        }
        match convert_docx(&config.pandoc_binary, tex_path).await {
            Ok(docx) => outcome.docx = Some(docx),
            Err(e) => {
                warn!("Word conversion failed: {}", e);
                outcome.errors.push(e);
            }
        }
    }

    outcome
}

/// `pdflatex -interaction=batchmode <tex>` in the tex file's directory.
pub async fn compile_pdf(binary: &Path, tex_path: &Path) -> Result<PathBuf, TypesetError> {
    let (dir, file) = split_tex_path(tex_path);
    let args: Vec<OsString> = vec!["-interaction=batchmode".into(), file.into()];
    run_tool(binary, &args, &dir).await?;
    expect_output(binary, tex_path.with_extension("pdf"))
}

/// `pandoc <tex> --from=latex --to=docx --standalone --resource-path=… -o <docx>`.
pub async fn convert_docx(binary: &Path, tex_path: &Path) -> Result<PathBuf, TypesetError> {
    let (dir, file) = split_tex_path(tex_path);
    let docx = tex_path.with_extension("docx");
    let docx_name = docx
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("paper.docx"));

    let mut args: Vec<OsString> = vec![file.into()];
    args.extend(
        [
            "--from=latex".to_string(),
            "--to=docx".to_string(),
            "--standalone".to_string(),
            format!("--resource-path={}", resource_path()),
            "-o".to_string(),
        ]
        .map(OsString::from),
    );
    args.push(docx_name);

    run_tool(binary, &args, &dir).await?;
    expect_output(binary, docx)
}

/// Search path pandoc uses for images: the work dir and its `images` and
/// `figures` subdirectories.
fn resource_path() -> String {
    let sep = if cfg!(windows) { ";" } else { ":" };
    [".", "images", "figures"].join(sep)
}

fn split_tex_path(tex_path: &Path) -> (PathBuf, OsString) {
    let dir = match tex_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file = tex_path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| tex_path.as_os_str().to_os_string());
    (dir, file)
}

fn tool_name(binary: &Path) -> String {
    binary
        .file_name()
        .unwrap_or(binary.as_os_str())
        .to_string_lossy()
        .into_owned()
}

async fn run_tool(binary: &Path, args: &[OsString], dir: &Path) -> Result<(), TypesetError> {
    let tool = tool_name(binary);
    debug!("Running {} {:?} in {}", tool, args, dir.display());

    let output = Command::new(binary)
        .args(args)
        .current_dir(dir)
        .stdin(std::process::Stdio::null())
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TypesetError::ToolNotFound { tool: tool.clone() }
            } else {
                TypesetError::SpawnFailed {
                    tool: tool.clone(),
                    detail: e.to_string(),
                }
            }
        })?;

    if output.status.success() {
        return Ok(());
    }

    // pdflatex reports on stdout; pandoc on stderr.
    let stderr = String::from_utf8_lossy(&output.stderr);
    let report = if stderr.trim().is_empty() {
        String::from_utf8_lossy(&output.stdout).into_owned()
    } else {
        stderr.into_owned()
    };
    Err(TypesetError::ToolFailed {
        tool,
        code: output.status.code(),
        stderr: tail(&report, 20),
    })
}

fn expect_output(binary: &Path, path: PathBuf) -> Result<PathBuf, TypesetError> {
    if path.exists() {
        info!("Produced {}", path.display());
        Ok(path)
    } else {
        Err(TypesetError::ToolFailed {
            tool: tool_name(binary),
            code: Some(0),
            stderr: format!("exited successfully but produced no '{}'", path.display()),
        })
    }
}

/// Last `n` lines of `s`.
fn tail(s: &str, n: usize) -> String {
    let lines: Vec<&str> = s.trim_end().lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}
