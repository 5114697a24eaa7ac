//! Progress-callback trait for pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to follow a
//! run stage by stage. Callbacks are `Send + Sync`: page events arrive from
//! the blocking pool while several pages are corrected at once, so shared
//! state needs a `Mutex` or atomics.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2tex::{PipelineConfig, PipelineProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct PageCounter(AtomicUsize);
//!
//! impl PipelineProgressCallback for PageCounter {
//!     fn on_page_corrected(&self, page: usize, total: usize, rotation: f32) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("page {page}/{total} corrected (rotated {rotation}°)");
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(PageCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as each stage progresses. Every method defaults to
/// a no-op.
pub trait PipelineProgressCallback: Send + Sync {
    /// Pages have been rendered and correction is about to start.
    fn on_run_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// A page was deskewed, cropped and persisted.
    fn on_page_corrected(&self, page: usize, total_pages: usize, rotation: f32) {
        let _ = (page, total_pages, rotation);
    }

    /// A page hit a recoverable problem (e.g. orientation detection failed).
    fn on_page_warning(&self, page: usize, message: &str) {
        let _ = (page, message);
    }

    /// The corrected document is being sent for layout analysis.
    fn on_layout_start(&self, document_bytes: usize) {
        let _ = document_bytes;
    }

    /// Layout analysis returned and was reconciled.
    fn on_layout_complete(&self, pages: usize, placeholders: usize) {
        let _ = (pages, placeholders);
    }

    /// Figure crops were published.
    fn on_figures_extracted(&self, extracted: usize, total: usize) {
        let _ = (extracted, total);
    }

    /// The ordered text was written.
    fn on_text_written(&self, elements: usize) {
        let _ = elements;
    }

    /// A typesetting step started: `"latex"`, `"pdflatex"` or `"pandoc"`.
    fn on_typeset_step(&self, step: &str) {
        let _ = step;
    }

    /// The run finished.
    fn on_run_complete(&self, total_pages: usize, figures: usize) {
        let _ = (total_pages, figures);
    }
}

/// The default when no callback is configured.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// The type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        corrected: AtomicUsize,
        warnings: Mutex<Vec<String>>,
        steps: Mutex<Vec<String>>,
    }

    impl PipelineProgressCallback for Recorder {
        fn on_page_corrected(&self, _page: usize, _total: usize, _rotation: f32) {
            self.corrected.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_warning(&self, page: usize, message: &str) {
            self.warnings
                .lock()
                .unwrap()
                .push(format!("{page}: {message}"));
        }

        fn on_typeset_step(&self, step: &str) {
            self.steps.lock().unwrap().push(step.to_string());
        }
    }

    #[test]
    fn noop_callback_accepts_every_event() {
        let cb = NoopProgressCallback;
        cb.on_run_start(3);
        cb.on_page_corrected(1, 3, 90.0);
        cb.on_page_warning(2, "detector failed");
        cb.on_layout_start(1024);
        cb.on_layout_complete(3, 1);
        cb.on_figures_extracted(2, 3);
        cb.on_text_written(12);
        cb.on_typeset_step("pdflatex");
        cb.on_run_complete(3, 2);
    }

    #[test]
    fn recorder_sees_overridden_events_only() {
        let rec = Arc::new(Recorder::default());
        let cb: ProgressCallback = rec.clone();

        cb.on_run_start(2);
        cb.on_page_corrected(1, 2, 0.0);
        cb.on_page_corrected(2, 2, 180.0);
        cb.on_page_warning(2, "too few characters");
        cb.on_typeset_step("latex");
        cb.on_typeset_step("pandoc");

        assert_eq!(rec.corrected.load(Ordering::SeqCst), 2);
        assert_eq!(*rec.warnings.lock().unwrap(), vec!["2: too few characters"]);
        assert_eq!(*rec.steps.lock().unwrap(), vec!["latex", "pandoc"]);
    }
}
