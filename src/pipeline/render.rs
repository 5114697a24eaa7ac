//! pdfium work: rasterise the input and reassemble the corrected document.
//!
//! pdfium keeps thread-local state and is not async-safe, so every call here
//! runs inside `tokio::task::spawn_blocking` and binds its own `Pdfium`
//! instance on that thread.

use crate::config::PipelineConfig;
use crate::error::Pdf2TexError;
use crate::pipeline::geometry::CorrectedPage;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Bind to a pdfium library.
///
/// Lookup order: `library_path` (a file, or a directory holding the platform
/// library), then the executable's directory and the working directory,
/// then the system library path.
pub fn bind_pdfium(library_path: Option<&Path>) -> Result<Pdfium, Pdf2TexError> {
    if let Some(path) = library_path {
        let file = if path.is_dir() {
            Pdfium::pdfium_platform_library_name_at_path(path)
        } else {
            path.to_path_buf()
        };
        return Pdfium::bind_to_library(&file)
            .map(Pdfium::new)
            .map_err(|e| Pdf2TexError::PdfiumBindingFailed(format!("{}: {}", file.display(), e)));
    }

    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        candidates.push(Pdfium::pdfium_platform_library_name_at_path(&dir));
    }
    candidates.push(Pdfium::pdfium_platform_library_name_at_path("./"));

    for file in candidates.iter().filter(|f| f.exists()) {
        if let Ok(bindings) = Pdfium::bind_to_library(file) {
            debug!("Bound pdfium from {}", file.display());
            return Ok(Pdfium::new(bindings));
        }
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| Pdf2TexError::PdfiumBindingFailed(e.to_string()))
}

/// Rasterise every page of `pdf_path` at `config.dpi`, in page order.
///
/// A document with no pages is an error: there would be nothing to correct
/// and no corrected document to assemble.
pub async fn render_pages(
    pdf_path: &Path,
    config: &PipelineConfig,
) -> Result<Vec<DynamicImage>, Pdf2TexError> {
    let path = pdf_path.to_path_buf();
    let dpi = config.dpi;
    let password = config.password.clone();
    let library = config.pdfium_library_path.clone();

    tokio::task::spawn_blocking(move || {
        render_pages_blocking(&path, dpi, password.as_deref(), library.as_deref())
    })
    .await
    .map_err(|e| Pdf2TexError::Internal(format!("Render task panicked: {}", e)))?
}

fn render_pages_blocking(
    pdf_path: &Path,
    dpi: u32,
    password: Option<&str>,
    library: Option<&Path>,
) -> Result<Vec<DynamicImage>, Pdf2TexError> {
    let pdfium = bind_pdfium(library)?;

    let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                Pdf2TexError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                Pdf2TexError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            Pdf2TexError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })?;

    let pages = document.pages();
    let total = pages.len() as usize;
    if total == 0 {
        return Err(Pdf2TexError::EmptyDocument {
            path: pdf_path.to_path_buf(),
        });
    }
    info!("PDF loaded: {} pages, rendering at {} dpi", total, dpi);

    let render_config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / 72.0);

    let mut images = Vec::with_capacity(total);
    for (idx, page) in pages.iter().enumerate() {
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            Pdf2TexError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            }
        })?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        images.push(image);
    }

    Ok(images)
}

/// Page size in PDF points for a raster of `pixels` at `dpi`.
pub fn pixels_to_points(pixels: u32, dpi: u32) -> f32 {
    pixels as f32 * 72.0 / dpi.max(1) as f32
}

/// Build a PDF with one page per corrected image, each page sized so the
/// image fills it at `config.dpi`. Returns the serialised document.
pub async fn assemble_pdf(
    pages: Arc<Vec<CorrectedPage>>,
    config: &PipelineConfig,
) -> Result<Vec<u8>, Pdf2TexError> {
    let dpi = config.dpi;
    let library = config.pdfium_library_path.clone();

    tokio::task::spawn_blocking(move || assemble_pdf_blocking(&pages, dpi, library.as_deref()))
        .await
        .map_err(|e| Pdf2TexError::Internal(format!("PDF assembly task panicked: {}", e)))?
}

fn assemble_pdf_blocking(
    pages: &[CorrectedPage],
    dpi: u32,
    library: Option<&Path>,
) -> Result<Vec<u8>, Pdf2TexError> {
    let fail = |e: PdfiumError| Pdf2TexError::PdfAssemblyFailed {
        detail: format!("{:?}", e),
    };

    let pdfium = bind_pdfium(library)?;
    let mut document = pdfium.create_new_pdf().map_err(fail)?;

    for page in pages {
        let width = PdfPoints::new(pixels_to_points(page.width(), dpi));
        let height = PdfPoints::new(pixels_to_points(page.height(), dpi));

        let mut pdf_page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::from_points(width, height))
            .map_err(fail)?;
        pdf_page
            .objects_mut()
            .create_image_object(
                PdfPoints::ZERO,
                PdfPoints::ZERO,
                &page.image,
                Some(width),
                Some(height),
            )
            .map_err(fail)?;
        debug!(
            "Assembled page {} ({:.1} x {:.1} pt)",
            page.number,
            width.value,
            height.value
        );
    }

    let bytes = document.save_to_bytes().map_err(fail)?;
    info!("Corrected PDF assembled: {} pages, {} bytes", pages.len(), bytes.len());
    Ok(bytes)
}
