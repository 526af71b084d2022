//! Pipeline integration tests.
//!
//! Drive `export_document` end to end over an in-memory document and a
//! scripted summarisation backend, so no pdfium library and no API key are
//! needed. Timing-sensitive tests run on tokio's paused clock.

use async_trait::async_trait;
use pdf_annotations::{
    export_document, AnnotationConfig, AnnotationKind, AnnotationSubtype, ExportProgressCallback,
    MemoryDocument, MemoryPage, RawAnnotation, Rect, SummaryBackend, SummaryError,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, Instant};

// ── Test helpers ─────────────────────────────────────────────────────────────

const BLUE: [f32; 3] = [0.572, 0.882, 0.984]; // #92e1fb
const YELLOW: [f32; 3] = [1.0, 1.0, 0.0]; // #ffff00

/// Records every prompt; replays scripted results, then summarises by echo.
#[derive(Default)]
struct MockBackend {
    calls: Mutex<Vec<(String, Instant)>>,
    script: Mutex<VecDeque<Result<String, SummaryError>>>,
}

impl MockBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn scripted(script: Vec<Result<String, SummaryError>>) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(script.into()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn prompts(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }

    fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }
}

#[async_trait]
impl SummaryBackend for MockBackend {
    async fn complete(&self, prompt: &str) -> Result<String, SummaryError> {
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), Instant::now()));
        tokio::time::sleep(Duration::from_millis(5)).await;
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            let text = prompt.rsplit("\n\n").next().unwrap_or_default();
            Ok(format!("- summary of: {text}"))
        })
    }
}

fn line(n: usize) -> Rect {
    let y = 700.0 - 20.0 * n as f32;
    Rect::new(50.0, y, 550.0, y + 12.0)
}

/// A page with one highlight per `(text, colour)`, each on its own line.
fn highlight_page(highlights: &[(&str, [f32; 3])]) -> MemoryPage {
    highlights
        .iter()
        .enumerate()
        .fold(MemoryPage::new(), |page, (i, (text, color))| {
            page.with_text(line(i), *text).with_annotation(
                RawAnnotation::new(AnnotationSubtype::Highlight)
                    .with_color(color.to_vec())
                    .with_quad(line(i)),
            )
        })
}

fn config_with(backend: Arc<MockBackend>) -> AnnotationConfig {
    AnnotationConfig::builder()
        .backend(backend)
        .retry_delay_secs(1.0)
        .max_retries(3)
        .build()
        .unwrap()
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn summarised_highlight_on_first_page() {
    let doc = MemoryDocument::new()
        .with_title("Cell Biology")
        .with_page(highlight_page(&[("bio- logical process", BLUE)]))
        .with_page(MemoryPage::new())
        .with_page(MemoryPage::new());
    let backend = MockBackend::new();
    let output = export_document(&doc, &config_with(Arc::clone(&backend)))
        .await
        .unwrap();

    assert_eq!(backend.call_count(), 1);
    assert!(backend.prompts()[0].ends_with("\n\nbiological process"));
    assert_eq!(
        output.markdown,
        "---\nTITLE: Cell Biology\n---\n\n\
         # Annotations\n\n\
         - **Highlight on Page 1 (Summarized)**\n- summary of: biological process\n\n"
    );
    assert_eq!(output.annotations.len(), 1);
    assert_eq!(output.annotations[0].content(), "biological process");
    assert_eq!(output.highlight_colors, vec!["#92e1fb".to_string()]);
    assert_eq!(output.stats.total_pages, 3);
    assert_eq!(output.stats.scanned_pages, 3);
    assert_eq!(output.stats.summaries_requested, 1);
    assert_eq!(output.stats.summaries_failed, 0);
}

#[tokio::test]
async fn same_text_twice_is_summarised_once() {
    let doc = MemoryDocument::new()
        .with_page(highlight_page(&[("a repeated claim", BLUE)]))
        .with_page(highlight_page(&[("a repeated claim", BLUE)]));
    let backend = MockBackend::new();
    let output = export_document(&doc, &config_with(Arc::clone(&backend)))
        .await
        .unwrap();

    assert_eq!(backend.call_count(), 1);
    assert_eq!(output.stats.cache_hits, 1);
    assert_eq!(output.markdown.matches("(Summarized)").count(), 2);
    assert!(output
        .markdown
        .contains("- **Highlight on Page 2 (Summarized)**\n- summary of: a repeated claim"));
}

#[tokio::test(start_paused = true)]
async fn rate_limited_twice_then_success() {
    let doc = MemoryDocument::new().with_page(highlight_page(&[("throttled text", BLUE)]));
    let backend = MockBackend::scripted(vec![
        Err(SummaryError::RateLimited("429 Too Many Requests".into())),
        Err(SummaryError::RateLimited("429 Too Many Requests".into())),
        Ok("- made it".into()),
    ]);
    let start = Instant::now();
    let output = export_document(&doc, &config_with(Arc::clone(&backend)))
        .await
        .unwrap();

    assert_eq!(backend.call_count(), 3);
    assert!(start.elapsed() >= Duration::from_secs(3));
    let times = backend.call_times();
    assert!(times[1] - times[0] >= Duration::from_secs(1));
    assert!(times[2] - times[1] >= Duration::from_secs(2));
    assert!(output.markdown.contains("(Summarized)**\n- made it"));
    assert_eq!(output.stats.summaries_failed, 0);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_render_sentinel() {
    let doc = MemoryDocument::new().with_page(highlight_page(&[("unlucky text", BLUE)]));
    let backend = MockBackend::scripted(vec![
        Err(SummaryError::Service("503 upstream unavailable".into())),
        Err(SummaryError::Service("503 upstream unavailable".into())),
        Err(SummaryError::Service("503 upstream unavailable".into())),
    ]);
    let start = Instant::now();
    let output = export_document(&doc, &config_with(Arc::clone(&backend)))
        .await
        .unwrap();

    assert_eq!(backend.call_count(), 3);
    let times = backend.call_times();
    let first_gap = times[1] - times[0];
    let second_gap = times[2] - times[1];
    assert!(first_gap >= Duration::from_secs(1) && first_gap < Duration::from_secs(2));
    assert!(second_gap >= Duration::from_secs(2) && second_gap < Duration::from_secs(3));
    // No backoff after the last attempt.
    assert!(start.elapsed() < Duration::from_secs(4));
    assert!(output.markdown.contains(
        "- **Highlight on Page 1 (Summarized)**\nSummary not available: 503 upstream unavailable"
    ));
    assert_eq!(output.stats.summaries_failed, 1);
}

#[tokio::test(start_paused = true)]
async fn unexpected_errors_wait_a_flat_delay() {
    let doc = MemoryDocument::new().with_page(highlight_page(&[("empty replies", BLUE)]));
    let backend = MockBackend::scripted(vec![
        Err(SummaryError::Unexpected("empty response".into())),
        Err(SummaryError::Unexpected("empty response".into())),
        Ok("- third time lucky".into()),
    ]);
    let output = export_document(&doc, &config_with(Arc::clone(&backend)))
        .await
        .unwrap();

    let times = backend.call_times();
    assert_eq!(times.len(), 3);
    for gap in [times[1] - times[0], times[2] - times[1]] {
        assert!(gap >= Duration::from_secs(1) && gap < Duration::from_secs(2));
    }
    assert!(output.markdown.contains("(Summarized)**\n- third time lucky"));
}

#[tokio::test(start_paused = true)]
async fn rate_window_is_never_exceeded() {
    let texts: Vec<String> = (0..5).map(|i| format!("distinct highlight {i}")).collect();
    let highlights: Vec<(&str, [f32; 3])> = texts.iter().map(|t| (t.as_str(), BLUE)).collect();
    let doc = MemoryDocument::new().with_page(highlight_page(&highlights));
    let backend = MockBackend::new();
    let config = AnnotationConfig::builder()
        .backend(Arc::clone(&backend) as Arc<dyn SummaryBackend>)
        .rate_limit_per_minute(2)
        .build()
        .unwrap();

    let output = export_document(&doc, &config).await.unwrap();
    assert_eq!(output.stats.summaries_requested, 5);

    let mut times = backend.call_times();
    times.sort();
    assert_eq!(times.len(), 5);
    for (i, t) in times.iter().enumerate() {
        let in_window = times[..=i]
            .iter()
            .filter(|s| *t - **s < Duration::from_secs(60))
            .count();
        assert!(in_window <= 2, "{in_window} calls inside one minute");
    }
}

#[tokio::test]
async fn non_summary_colour_renders_as_quote_without_backend() {
    let doc = MemoryDocument::new().with_page(highlight_page(&[("a yellow thought", YELLOW)]));
    // No backend configured: none should be needed.
    let config = AnnotationConfig::default();
    let output = export_document(&doc, &config).await.unwrap();

    assert_eq!(
        output.markdown,
        "# Annotations\n\n> a yellow thought (p. 1)\n\n"
    );
    assert_eq!(output.stats.summaries_requested, 0);
    assert_eq!(output.highlight_colors, vec!["#ffff00".to_string()]);
}

#[tokio::test]
async fn summaries_can_be_switched_off() {
    let doc = MemoryDocument::new().with_page(highlight_page(&[("blue but skipped", BLUE)]));
    let backend = MockBackend::new();
    let config = AnnotationConfig::builder()
        .backend(Arc::clone(&backend) as Arc<dyn SummaryBackend>)
        .summarize(false)
        .build()
        .unwrap();
    let output = export_document(&doc, &config).await.unwrap();

    assert_eq!(backend.call_count(), 0);
    assert!(output.markdown.contains("> blue but skipped (p. 1)"));
}

#[tokio::test]
async fn mixed_document_keeps_page_order_and_counts() {
    let doc = MemoryDocument::new()
        .with_page(
            highlight_page(&[("first highlight", YELLOW)]).with_annotation(
                RawAnnotation::new(AnnotationSubtype::Text).with_comment("a sticky note"),
            ),
        )
        .with_broken_page("damaged page object")
        .with_page(
            MemoryPage::new()
                .with_text(line(0), "commented span")
                .with_annotation(
                    RawAnnotation::new(AnnotationSubtype::Highlight)
                        .with_color(YELLOW.to_vec())
                        .with_comment("my remark")
                        .with_quad(line(0)),
                )
                .with_annotation(
                    RawAnnotation::new(AnnotationSubtype::FreeText).with_comment("typed box"),
                )
                .with_annotation(RawAnnotation::new(AnnotationSubtype::Other("Link".into()))),
        );
    let config = AnnotationConfig::builder()
        .start_page(10)
        .max_workers(3)
        .build()
        .unwrap();
    let output = export_document(&doc, &config).await.unwrap();

    let kinds: Vec<(i64, AnnotationKind)> = output
        .annotations
        .iter()
        .map(|r| (r.page(), r.kind()))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (10, AnnotationKind::Highlight),
            (10, AnnotationKind::Note),
            (12, AnnotationKind::HighlightWithComment),
            (12, AnnotationKind::FreeTextComment),
        ]
    );
    assert_eq!(output.stats.skipped_pages, 1);
    assert_eq!(output.stats.scanned_pages, 2);
    assert_eq!(
        output.markdown,
        "# Annotations\n\n\
         > first highlight (p. 10)\n\n\
         - **Note on Page 10**\n- a sticky note\n\n\
         - **Highlight Comment on Page 12**\n- Comment: my remark\n> commented span (p. 12)\n\n\
         - **Comment on Page 12**\n- typed box\n\n"
    );
}

#[tokio::test]
async fn progress_callback_sees_every_stage() {
    #[derive(Default)]
    struct Events {
        pages: AtomicUsize,
        annotations: AtomicUsize,
        summaries_started: AtomicUsize,
        summaries_done: AtomicUsize,
        exported: AtomicUsize,
    }

    impl ExportProgressCallback for Events {
        fn on_extraction_start(&self, total_pages: usize) {
            self.pages.store(total_pages, Ordering::SeqCst);
        }
        fn on_extraction_complete(&self, annotations: usize, _pages_scanned: usize) {
            self.annotations.store(annotations, Ordering::SeqCst);
        }
        fn on_summaries_start(&self, total: usize) {
            self.summaries_started.store(total, Ordering::SeqCst);
        }
        fn on_summary_complete(&self, _index: usize, _total: usize, ok: bool) {
            if ok {
                self.summaries_done.fetch_add(1, Ordering::SeqCst);
            }
        }
        fn on_export_complete(&self, annotations: usize, _summaries: usize) {
            self.exported.store(annotations, Ordering::SeqCst);
        }
    }

    let doc = MemoryDocument::new()
        .with_page(highlight_page(&[("one", BLUE), ("two", BLUE), ("three", YELLOW)]))
        .with_page(MemoryPage::new());
    let events = Arc::new(Events::default());
    let config = AnnotationConfig::builder()
        .backend(MockBackend::new() as Arc<dyn SummaryBackend>)
        .progress_callback(Arc::clone(&events) as Arc<dyn ExportProgressCallback>)
        .build()
        .unwrap();
    export_document(&doc, &config).await.unwrap();

    assert_eq!(events.pages.load(Ordering::SeqCst), 2);
    assert_eq!(events.annotations.load(Ordering::SeqCst), 3);
    assert_eq!(events.summaries_started.load(Ordering::SeqCst), 2);
    assert_eq!(events.summaries_done.load(Ordering::SeqCst), 2);
    assert_eq!(events.exported.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn yaml_config_drives_colours_and_offset() {
    let config = AnnotationConfig::from_yaml_str(
        r##"
colors:
  summary_colors: ["#FFFF00"]
processing:
  start_page: 0
  max_workers: 1
"##,
    )
    .unwrap();
    let backend = MockBackend::new();
    let config = AnnotationConfig {
        backend: Some(Arc::clone(&backend) as Arc<dyn SummaryBackend>),
        ..config
    };
    let doc = MemoryDocument::new().with_page(highlight_page(&[
        ("yellow now counts", YELLOW),
        ("blue does not", BLUE),
    ]));
    let output = export_document(&doc, &config).await.unwrap();

    assert_eq!(backend.call_count(), 1);
    assert!(output
        .markdown
        .contains("- **Highlight on Page 0 (Summarized)**\n- summary of: yellow now counts"));
    assert!(output.markdown.contains("> blue does not (p. 0)"));
}
