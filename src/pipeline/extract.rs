//! Whole-document extraction: fan the page scanner out over a worker pool.
//!
//! ## Why an explicit strategy?
//!
//! Page scanning is CPU-bound (text lookup under every quad plus
//! normalisation), so pages are spread over a dedicated rayon pool of
//! `processing.max_workers` threads. Building a pool can fail (thread
//! limits in sandboxes, `max_workers == 1`), in which case the extractor
//! runs the exact same scan sequentially. [`ScanStrategy::select`] makes
//! that choice once, up front, and both paths are tested.
//!
//! Either way results are collected in page order: `par_iter().collect()`
//! preserves submission order regardless of which worker finishes first.

use crate::error::AnnotError;
use crate::output::{DocumentMetadata, ExtractionResult, PageScan};
use crate::pipeline::document::{AnnotatedDocument, PdfiumDocument};
use crate::pipeline::normalize::TextNormalizer;
use crate::pipeline::scan::PageAnnotationScanner;
use crate::progress::ProgressCallback;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// How pages are scanned.
pub enum ScanStrategy {
    /// A bounded rayon pool owned by this extraction.
    Parallel(rayon::ThreadPool),
    /// Scan pages one after another on the calling thread.
    Sequential,
}

impl ScanStrategy {
    /// Pick a strategy for `width` workers.
    ///
    /// Falls back to [`ScanStrategy::Sequential`] when `width <= 1` or the
    /// pool cannot be built.
    pub fn select(width: usize) -> Self {
        if width <= 1 {
            return ScanStrategy::Sequential;
        }
        match rayon::ThreadPoolBuilder::new()
            .num_threads(width)
            .thread_name(|i| format!("annot-scan-{i}"))
            .build()
        {
            Ok(pool) => ScanStrategy::Parallel(pool),
            Err(e) => {
                warn!("Worker pool unavailable ({}), scanning pages sequentially", e);
                ScanStrategy::Sequential
            }
        }
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self, ScanStrategy::Parallel(_))
    }
}

impl std::fmt::Debug for ScanStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanStrategy::Parallel(pool) => write!(f, "Parallel({})", pool.current_num_threads()),
            ScanStrategy::Sequential => write!(f, "Sequential"),
        }
    }
}

/// Scans every page of a document and merges the results.
#[derive(Clone)]
pub struct DocumentAnnotationExtractor {
    normalizer: TextNormalizer,
    max_workers: usize,
    progress_callback: Option<ProgressCallback>,
}

impl DocumentAnnotationExtractor {
    pub fn new(normalizer: TextNormalizer, max_workers: usize) -> Self {
        Self {
            normalizer,
            max_workers,
            progress_callback: None,
        }
    }

    pub fn with_progress(mut self, callback: Option<ProgressCallback>) -> Self {
        self.progress_callback = callback;
        self
    }

    /// Extract with the strategy picked by [`ScanStrategy::select`].
    pub fn extract<D: AnnotatedDocument>(&self, document: &D, page_offset: i64) -> ExtractionResult {
        let strategy = ScanStrategy::select(self.max_workers);
        self.extract_with(&strategy, document, page_offset)
    }

    /// Extract with an explicit strategy.
    pub fn extract_with<D: AnnotatedDocument>(
        &self,
        strategy: &ScanStrategy,
        document: &D,
        page_offset: i64,
    ) -> ExtractionResult {
        let total = document.page_count();

        // Load every page handle before any scanning starts.
        let pages: Vec<(usize, D::Page)> = (0..total)
            .filter_map(|idx| match document.load_page(idx) {
                Ok(page) => Some((idx, page)),
                Err(e) => {
                    warn!("Skipping page {}: {}", idx + 1, e.detail);
                    None
                }
            })
            .collect();

        if let Some(ref cb) = self.progress_callback {
            cb.on_extraction_start(total);
        }
        debug!("Scanning {} pages with {:?}", pages.len(), strategy);

        let scanner = PageAnnotationScanner::new(&self.normalizer);
        let scans: Vec<PageScan> = match strategy {
            ScanStrategy::Parallel(pool) => pool.install(|| {
                pages
                    .par_iter()
                    .map(|(idx, page)| scanner.scan(page, *idx, page_offset))
                    .collect()
            }),
            ScanStrategy::Sequential => pages
                .iter()
                .map(|(idx, page)| scanner.scan(page, *idx, page_offset))
                .collect(),
        };

        let mut result = ExtractionResult {
            pages_total: total,
            pages_skipped: total - pages.len(),
            ..Default::default()
        };
        for scan in scans {
            result.merge(scan);
        }

        info!(
            "Extracted {} annotations from {}/{} pages ({} distinct highlight colours)",
            result.records.len(),
            result.pages_scanned,
            total,
            result.highlight_colors.len()
        );
        if let Some(ref cb) = self.progress_callback {
            cb.on_extraction_complete(result.records.len(), result.pages_scanned);
        }
        result
    }

    /// Open `path` through pdfium and extract. Runs the blocking work in
    /// `spawn_blocking`.
    pub async fn extract_file(
        &self,
        path: &Path,
        page_offset: i64,
    ) -> Result<ExtractionResult, AnnotError> {
        let (_, result) = self.extract_file_with_metadata(path, page_offset).await?;
        Ok(result)
    }

    /// Like [`extract_file`](Self::extract_file), also returning the
    /// document title and page count.
    pub async fn extract_file_with_metadata(
        &self,
        path: &Path,
        page_offset: i64,
    ) -> Result<(DocumentMetadata, ExtractionResult), AnnotError> {
        let path: PathBuf = path.to_path_buf();
        let extractor = self.clone();

        tokio::task::spawn_blocking(move || extractor.extract_file_blocking(&path, page_offset))
            .await
            .map_err(|e| AnnotError::Internal(format!("Extraction task panicked: {}", e)))?
    }

    /// Blocking variant of [`extract_file_with_metadata`](Self::extract_file_with_metadata).
    pub fn extract_file_blocking(
        &self,
        path: &Path,
        page_offset: i64,
    ) -> Result<(DocumentMetadata, ExtractionResult), AnnotError> {
        let document = PdfiumDocument::open(path)?;
        let result = self.extract(&document, page_offset);
        Ok((document.metadata(), result))
    }
}

impl std::fmt::Debug for DocumentAnnotationExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentAnnotationExtractor")
            .field("max_workers", &self.max_workers)
            .field("progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NormalizerConfig;
    use crate::output::AnnotationKind;
    use crate::pipeline::document::{
        AnnotationSubtype, MemoryDocument, MemoryPage, RawAnnotation, Rect,
    };

    fn extractor(workers: usize) -> DocumentAnnotationExtractor {
        let normalizer = TextNormalizer::new(&NormalizerConfig::default()).unwrap();
        DocumentAnnotationExtractor::new(normalizer, workers)
    }

    fn note(text: &str) -> RawAnnotation {
        RawAnnotation::new(AnnotationSubtype::Text).with_comment(text)
    }

    fn document(pages: usize, per_page: usize) -> MemoryDocument {
        (0..pages).fold(MemoryDocument::new(), |doc, p| {
            let page = (0..per_page).fold(MemoryPage::new(), |page, i| {
                page.with_annotation(note(&format!("p{p} n{i}")))
            });
            doc.with_page(page)
        })
    }

    #[test]
    fn select_sequential_for_single_worker() {
        assert!(!ScanStrategy::select(1).is_parallel());
        assert!(!ScanStrategy::select(0).is_parallel());
        assert!(ScanStrategy::select(3).is_parallel());
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let doc = document(12, 3);
        let ex = extractor(4);
        let parallel = ex.extract_with(&ScanStrategy::select(4), &doc, 1);
        let sequential = ex.extract_with(&ScanStrategy::Sequential, &doc, 1);
        assert_eq!(parallel, sequential);
        assert_eq!(parallel.records.len(), 36);
    }

    #[test]
    fn records_stay_in_page_then_annotation_order() {
        let doc = document(20, 2);
        let result = extractor(8).extract(&doc, 1);
        let contents: Vec<&str> = result.records.iter().map(|r| r.content()).collect();
        let expected: Vec<String> = (0..20)
            .flat_map(|p| (0..2).map(move |i| format!("p{p} n{i}")))
            .collect();
        assert_eq!(contents, expected);
        assert!(result.records.windows(2).all(|w| w[0].page() <= w[1].page()));
    }

    #[test]
    fn broken_pages_are_skipped_and_counted() {
        let doc = MemoryDocument::new()
            .with_page(MemoryPage::new().with_annotation(note("first")))
            .with_broken_page("corrupt content stream")
            .with_page(MemoryPage::new().with_annotation(note("third")));
        let result = extractor(2).extract(&doc, 1);

        assert_eq!(result.pages_total, 3);
        assert_eq!(result.pages_scanned, 2);
        assert_eq!(result.pages_skipped, 1);
        let pages: Vec<i64> = result.records.iter().map(|r| r.page()).collect();
        assert_eq!(pages, vec![1, 3]);
    }

    #[test]
    fn colours_collected_across_pages() {
        let rect = Rect::new(0.0, 0.0, 100.0, 10.0);
        let highlight = |c: Vec<f32>| {
            RawAnnotation::new(AnnotationSubtype::Highlight)
                .with_color(c)
                .with_quad(rect)
        };
        let doc = MemoryDocument::new()
            .with_page(
                MemoryPage::new()
                    .with_text(rect, "a")
                    .with_annotation(highlight(vec![1.0, 1.0, 0.0])),
            )
            .with_page(
                MemoryPage::new()
                    .with_text(rect, "b")
                    .with_annotation(highlight(vec![0.0, 1.0, 0.0]))
                    .with_annotation(highlight(vec![1.0, 1.0, 0.0])),
            );
        let result = extractor(2).extract(&doc, 1);
        let colors: Vec<&str> = result.highlight_colors.iter().map(String::as_str).collect();
        assert_eq!(colors, vec!["#00ff00", "#ffff00"]);
        assert!(result
            .records
            .iter()
            .all(|r| r.kind() == AnnotationKind::Highlight));
    }

    #[test]
    fn empty_document() {
        let result = extractor(4).extract(&MemoryDocument::new(), 1);
        assert!(result.records.is_empty());
        assert_eq!(result.pages_total, 0);
    }
}
