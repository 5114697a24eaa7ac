//! Atomic artifact publishing.
//!
//! Every file the pipeline produces is first written to a temporary file in
//! the destination directory and then renamed over the final path. A rename
//! within one directory is atomic on every platform we target, so an
//! interrupted run never leaves a truncated PNG, PDF or JSON snapshot at a
//! published path.

use crate::error::Pdf2TexError;
use crate::pipeline::encode::encode_png;
use image::DynamicImage;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Write `bytes` to `path` via temp file + rename, creating parent dirs.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Pdf2TexError> {
    let fail = |source: std::io::Error| Pdf2TexError::ArtifactWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(fail)?;

    // Dropping `tmp` on any error path deletes the temp file.
    let mut tmp = NamedTempFile::new_in(dir).map_err(fail)?;
    tmp.write_all(bytes).map_err(fail)?;
    tmp.as_file().sync_all().map_err(fail)?;
    tmp.persist(path).map_err(|e| fail(e.error))?;

    debug!("Published {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

/// PNG-encode `img` and publish it atomically at `path`.
pub fn save_png(img: &DynamicImage, path: &Path) -> Result<(), Pdf2TexError> {
    let png = encode_png(img).map_err(|e| Pdf2TexError::ImageEncodeFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    write_atomic(path, &png)
}

/// Serialise `value` as JSON with 4-space indentation and publish it.
pub fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<(), Pdf2TexError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut ser)
        .map_err(|e| Pdf2TexError::Internal(format!("JSON serialisation failed: {e}")))?;
    write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn write_atomic_creates_parents_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/out.txt");

        write_atomic(&path, b"first").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"first");

        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");

        // Only the published file remains; no stray temp files.
        let entries: Vec<_> = fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn write_atomic_into_missing_parent_that_is_a_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();

        let err = write_atomic(&blocker.join("out.txt"), b"data").unwrap_err();
        assert!(matches!(err, Pdf2TexError::ArtifactWriteFailed { .. }));
    }

    #[test]
    fn save_png_round_trips_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page_1_processed.png");
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(7, 3, Rgb([1, 2, 3])));

        save_png(&img, &path).unwrap();
        let back = image::open(&path).unwrap();
        assert_eq!((back.width(), back.height()), (7, 3));
    }

    #[test]
    fn save_json_uses_four_space_indent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.json");
        save_json(&serde_json::json!({ "pages": [1] }), &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n    \"pages\""), "got: {text}");
    }
}
