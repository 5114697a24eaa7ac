//! Pipeline stages for scan correction and typesetting.
//!
//! Each submodule implements one transformation step and is testable on its
//! own; [`crate::convert`] wires them together.
//!
//! ## Data Flow
//!
//! ```text
//! input ─▶ render ─▶ geometry ─▶ render ─▶ layout ─▶ figures ─▶ reading_order ─▶ llm ─▶ typeset
//! (path)   (pdfium)  (orient,    (corrected (azure,   (crops)    (output.txt)     (LaTeX)  (pdflatex,
//!                     crop)       PDF)      reconcile)                                      pandoc)
//! ```
//!
//! 1. [`input`]: validate a local PDF or spill bytes to a temp file
//! 2. [`render`]: rasterise pages and reassemble the corrected PDF
//! 3. [`orient`] + [`geometry`]: detect rotation, turn upright, trim margins
//! 4. [`layout`] + [`azure`]: one layout call; one record per page afterwards
//! 5. [`figures`]: crop figure regions from corrected pages
//! 6. [`reading_order`]: merge paragraphs and figures into ordered text
//! 7. [`llm`] + [`postprocess`]: LaTeX body generation and cleanup
//! 8. [`typeset`]: wrap in a document, compile/convert
//!
//! [`encode`] holds the PNG encoder shared by stages 3 and 5.

pub mod azure;
pub mod encode;
pub mod figures;
pub mod geometry;
pub mod input;
pub mod layout;
pub mod llm;
pub mod orient;
pub mod postprocess;
pub mod reading_order;
pub mod render;
pub mod typeset;
