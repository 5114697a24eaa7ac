//! Input resolution: validate a local PDF, or spill in-memory bytes to disk.
//!
//! pdfium opens documents by path, so byte input is written to a temp file
//! that lives exactly as long as the [`ResolvedInput`]. Both paths check the
//! `%PDF` magic up front so callers get a clear error instead of a pdfium
//! parse failure.

use crate::error::Pdf2TexError;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A PDF ready for pdfium.
pub enum ResolvedInput {
    /// Caller's own file.
    Local(PathBuf),
    /// Bytes written to a temp file, removed on drop.
    Spilled(NamedTempFile),
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Spilled(tmp) => tmp.path(),
        }
    }
}

/// Check that `path` exists, is readable and starts with `%PDF`.
pub fn resolve_local(path: &Path) -> Result<ResolvedInput, Pdf2TexError> {
    if !path.exists() {
        return Err(Pdf2TexError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != PDF_MAGIC {
                return Err(Pdf2TexError::NotAPdf {
                    path: path.to_path_buf(),
                    magic,
                });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2TexError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(Pdf2TexError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path.to_path_buf()))
}

/// Write `bytes` to a temp file so pdfium can open it.
pub fn spill_bytes(bytes: &[u8]) -> Result<ResolvedInput, Pdf2TexError> {
    if bytes.len() >= 4 && &bytes[..4] != PDF_MAGIC {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(Pdf2TexError::NotAPdf {
            path: PathBuf::from("<bytes>"),
            magic,
        });
    }

    let mut tmp = tempfile::Builder::new()
        .prefix("pdf2tex_")
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| Pdf2TexError::Internal(format!("Failed to create temp file: {e}")))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.flush())
        .map_err(|e| Pdf2TexError::Internal(format!("Failed to write temp file: {e}")))?;

    debug!("Spilled {} bytes to {}", bytes.len(), tmp.path().display());
    Ok(ResolvedInput::Spilled(tmp))
}
