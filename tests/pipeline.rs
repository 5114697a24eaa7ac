//! Offline pipeline tests: page correction and everything after the layout
//! call, driven by a scripted layout analyzer. Needs neither pdfium nor a
//! network connection.
//!
//! Run with:
//!   cargo test --test pipeline

use async_trait::async_trait;
use edgequake_pdf2tex::pipeline::layout::{
    BoundingRegion, Figure, LayoutError, LayoutResult, PageLayoutRecord, Paragraph, Word,
};
use edgequake_pdf2tex::{
    analyze_corrected, correct_pages, CorrectedPage, LayoutAnalyzer, OrientationDetector,
    OrientationError, PipelineConfig, PipelineProgressCallback, Pdf2TexError,
};
use image::DynamicImage;
use std::path::Path;
use std::sync::{Arc, Mutex};

// ── Test doubles ─────────────────────────────────────────────────────────────

/// Returns a canned layout (or an auth failure) and records what it was sent.
struct ScriptedAnalyzer {
    layout: Option<LayoutResult>,
    received: Mutex<Vec<(usize, String)>>,
}

impl ScriptedAnalyzer {
    fn returning(layout: LayoutResult) -> Self {
        Self {
            layout: Some(layout),
            received: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            layout: None,
            received: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LayoutAnalyzer for ScriptedAnalyzer {
    async fn analyze(
        &self,
        document: &[u8],
        content_type: &str,
    ) -> Result<LayoutResult, LayoutError> {
        self.received
            .lock()
            .unwrap()
            .push((document.len(), content_type.to_string()));
        self.layout.clone().ok_or_else(|| LayoutError::Auth {
            status: 401,
            detail: "Access denied due to invalid subscription key".into(),
        })
    }
}

struct FixedAngle(f32);

impl OrientationDetector for FixedAngle {
    fn detect(&self, _page: &DynamicImage) -> Result<f32, OrientationError> {
        Ok(self.0)
    }
}

struct Unreadable;

impl OrientationDetector for Unreadable {
    fn detect(&self, _page: &DynamicImage) -> Result<f32, OrientationError> {
        Err(OrientationError::Failed {
            code: Some(1),
            stderr: "Too few characters. Skipping this page".into(),
        })
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl PipelineProgressCallback for Recorder {
    fn on_page_warning(&self, page: usize, _message: &str) {
        self.events.lock().unwrap().push(format!("warn:{page}"));
    }

    fn on_layout_complete(&self, pages: usize, placeholders: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("layout:{pages}:{placeholders}"));
    }

    fn on_figures_extracted(&self, extracted: usize, total: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("figures:{extracted}/{total}"));
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn config_in(dir: &Path) -> PipelineConfig {
    PipelineConfig::builder()
        .work_dir(dir)
        .deskew(false)
        .build()
        .unwrap()
}

/// All-black rasters: every row holds content, so the crop is the full page.
async fn corrected(sizes: &[(u32, u32)], config: &PipelineConfig) -> Arc<Vec<CorrectedPage>> {
    let images = sizes
        .iter()
        .map(|&(w, h)| DynamicImage::new_rgb8(w, h))
        .collect();
    Arc::new(correct_pages(images, config).await.unwrap())
}

fn letter(n: usize) -> PageLayoutRecord {
    PageLayoutRecord {
        page_number: n,
        width: Some(8.5),
        height: Some(11.0),
        ..Default::default()
    }
}

fn rect(page: usize, x0: f64, y0: f64, x1: f64, y1: f64) -> BoundingRegion {
    BoundingRegion::from_polygon(page, vec![x0, y0, x1, y0, x1, y1, x0, y1])
}

fn para(text: &str, region: BoundingRegion) -> Paragraph {
    Paragraph {
        content: text.to_string(),
        bounding_regions: vec![region],
        ..Default::default()
    }
}

fn figure(region: BoundingRegion) -> Figure {
    Figure {
        bounding_regions: vec![region],
        ..Default::default()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn text_follows_reading_order_with_figure_markers() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let pages = corrected(&[(850, 1100), (850, 1100)], &config).await;

    let layout = LayoutResult {
        pages: vec![letter(1), letter(2)],
        paragraphs: vec![
            para("2. Explain your answer.", rect(2, 1.0, 1.0, 7.0, 1.5)),
            para("1(b) Find the tension.", rect(1, 1.0, 6.0, 7.0, 6.5)),
            para("1(a) A block rests on a slope.", rect(1, 1.0, 1.0, 7.0, 1.5)),
        ],
        figures: vec![figure(rect(1, 4.25, 2.75, 8.5, 5.5))],
        ..Default::default()
    };
    let analyzer = ScriptedAnalyzer::returning(layout);

    let analysis = analyze_corrected(Arc::clone(&pages), b"%PDF-corrected", &analyzer, &config)
        .await
        .unwrap();

    let received = analyzer.received.lock().unwrap().clone();
    assert_eq!(received, vec![(14, "application/pdf".to_string())]);

    let text = std::fs::read_to_string(&config.paths.output_txt).unwrap();
    assert_eq!(
        text,
        "1(a) A block rests on a slope.\n\n\
         [FIGURE: figures/figure_1_0.png]\n\n\
         1(b) Find the tension.\n\n\
         2. Explain your answer.\n\n"
    );

    let artifact = &analysis.figures[&0];
    assert_eq!((artifact.rect.x0, artifact.rect.y0), (425, 275));
    assert_eq!((artifact.rect.x1, artifact.rect.y1), (850, 550));
    let crop = image::open(&artifact.path).unwrap();
    assert_eq!((crop.width(), crop.height()), (425, 275));
    assert_eq!(analysis.elements.len(), 4);
}

#[tokio::test]
async fn missing_page_records_are_synthesized_in_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let config = PipelineConfig::builder()
        .work_dir(dir.path())
        .deskew(false)
        .dpi(300)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let pages = corrected(&[(600, 900), (600, 900), (600, 900)], &config).await;

    let mut second = letter(2);
    second.words = vec![Word {
        content: "Question".into(),
        ..Default::default()
    }];
    let layout = LayoutResult {
        // Out-of-range ordinal and a stale duplicate of page 2.
        pages: vec![letter(7), letter(2), second],
        paragraphs: vec![para("Only paragraph", rect(2, 1.0, 1.0, 2.0, 2.0))],
        ..Default::default()
    };
    let analyzer = ScriptedAnalyzer::returning(layout);

    let analysis = analyze_corrected(pages, b"%PDF", &analyzer, &config)
        .await
        .unwrap();
    assert_eq!(analysis.reconciliation.kept, 1);
    assert_eq!(analysis.reconciliation.synthesized, 2);

    let snapshot: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&config.paths.layout_json).unwrap())
            .unwrap();
    let records = snapshot["pages"].as_array().unwrap();
    let numbers: Vec<u64> = records
        .iter()
        .map(|r| r["pageNumber"].as_u64().unwrap())
        .collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(records[1]["words"][0]["content"], "Question");
    assert_eq!(records[0]["width"], 2.0);
    assert_eq!(records[0]["height"], 3.0);
    assert_eq!(records[2]["unit"], "inch");
    assert!(records[2]["words"].as_array().unwrap().is_empty());

    let events = recorder.events.lock().unwrap().clone();
    assert!(events.contains(&"layout:3:2".to_string()));
    assert!(events.contains(&"figures:0/0".to_string()));
}

#[tokio::test]
async fn degenerate_figure_keeps_an_empty_marker() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let pages = corrected(&[(850, 1100)], &config).await;

    let layout = LayoutResult {
        pages: vec![letter(1)],
        paragraphs: vec![para("Figure 1 shows the circuit.", rect(1, 1.0, 1.0, 7.0, 1.5))],
        // Zero width once mapped to pixels.
        figures: vec![figure(rect(1, 2.0, 3.0, 2.0, 5.0))],
        ..Default::default()
    };
    let analyzer = ScriptedAnalyzer::returning(layout);

    let analysis = analyze_corrected(pages, b"%PDF", &analyzer, &config)
        .await
        .unwrap();
    assert!(analysis.figures.is_empty());
    assert!(!config.paths.figures_dir.join("figure_1_0.png").exists());

    let text = std::fs::read_to_string(&config.paths.output_txt).unwrap();
    assert_eq!(text, "Figure 1 shows the circuit.\n\n[FIGURE: ]\n\n");
}

#[tokio::test]
async fn layout_failure_is_fatal_and_publishes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let pages = corrected(&[(100, 100)], &config).await;

    let err = analyze_corrected(pages, b"%PDF", &ScriptedAnalyzer::failing(), &config)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Pdf2TexError::LayoutService(LayoutError::Auth { status: 401, .. })
    ));
    assert!(!config.paths.layout_json.exists());
    assert!(!config.paths.output_txt.exists());
}

#[tokio::test]
async fn reported_rotation_is_corrected_counter_clockwise() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::builder()
        .work_dir(dir.path())
        .orientation_detector(Arc::new(FixedAngle(90.0)))
        .build()
        .unwrap();

    let pages = correct_pages(vec![DynamicImage::new_rgb8(40, 20)], &config)
        .await
        .unwrap();
    assert_eq!(pages[0].rotation, 270.0);
    assert_eq!((pages[0].width(), pages[0].height()), (20, 40));
    assert!(pages[0].issues.is_empty());
}

#[tokio::test]
async fn detector_failure_keeps_page_and_warns() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let config = PipelineConfig::builder()
        .work_dir(dir.path())
        .orientation_detector(Arc::new(Unreadable))
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    let pages = correct_pages(
        vec![DynamicImage::new_rgb8(30, 10), DynamicImage::new_rgb8(30, 10)],
        &config,
    )
    .await
    .unwrap();
    assert_eq!(pages.len(), 2);
    assert!(pages.iter().all(|p| p.rotation == 0.0 && p.issues.len() == 1));
    assert_eq!((pages[1].width(), pages[1].height()), (30, 10));

    let mut events = recorder.events.lock().unwrap().clone();
    events.sort();
    assert_eq!(events, vec!["warn:1", "warn:2"]);
}
