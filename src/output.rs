//! Output types: annotation records, per-document aggregates and run stats.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const HIGHLIGHT_PREFIX: &str = "Highlighted Text: ";
const COMMENT_PREFIX: &str = "Comment: ";

/// The closed set of annotation kinds this crate exports.
///
/// Resolved once at scan time from the PDF annotation subtype; everything
/// downstream matches on this enum instead of on raw subtype codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnnotationKind {
    /// Highlighted text without an author comment.
    Highlight,
    /// Highlighted text carrying an author comment in its popup.
    HighlightWithComment,
    /// Sticky note.
    Note,
    /// Free-text box or typewriter comment.
    FreeTextComment,
}

impl AnnotationKind {
    /// Human-readable label used in logs and headings.
    pub fn label(self) -> &'static str {
        match self {
            AnnotationKind::Highlight => "Highlight",
            AnnotationKind::HighlightWithComment => "Highlight Comment",
            AnnotationKind::Note => "Note",
            AnnotationKind::FreeTextComment => "Comment",
        }
    }
}

/// One annotation as scanned from a page. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    page: i64,
    kind: AnnotationKind,
    content: String,
    color: String,
}

impl AnnotationRecord {
    pub fn new(
        page: i64,
        kind: AnnotationKind,
        content: impl Into<String>,
        color: impl Into<String>,
    ) -> Self {
        Self {
            page,
            kind,
            content: content.into(),
            color: color.into(),
        }
    }

    /// Build a [`AnnotationKind::HighlightWithComment`] record whose content
    /// is the two-line composite of highlighted text and comment.
    pub fn highlight_with_comment(
        page: i64,
        highlighted: &str,
        comment: &str,
        color: impl Into<String>,
    ) -> Self {
        let content = format!("{HIGHLIGHT_PREFIX}{highlighted}\n{COMMENT_PREFIX}{comment}");
        Self::new(page, AnnotationKind::HighlightWithComment, content, color)
    }

    /// Logical page number (0-based index plus the configured start page).
    pub fn page(&self) -> i64 {
        self.page
    }

    pub fn kind(&self) -> AnnotationKind {
        self.kind
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Lowercase `#rrggbb`.
    pub fn color(&self) -> &str {
        &self.color
    }

    /// Split a highlight-with-comment composite into `(highlighted, comment)`.
    ///
    /// Returns `None` for other kinds or a content string not produced by
    /// [`AnnotationRecord::highlight_with_comment`].
    pub fn comment_parts(&self) -> Option<(&str, &str)> {
        if self.kind != AnnotationKind::HighlightWithComment {
            return None;
        }
        let rest = self.content.strip_prefix(HIGHLIGHT_PREFIX)?;
        let sep = format!("\n{COMMENT_PREFIX}");
        let (highlighted, comment) = rest.split_once(sep.as_str())?;
        Some((highlighted, comment))
    }
}

/// Records and colours produced by scanning one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageScan {
    pub records: Vec<AnnotationRecord>,
    /// Stroke colours of every highlight on the page.
    pub colors: BTreeSet<String>,
    /// Annotations that could not be read and were skipped.
    pub skipped: usize,
}

/// Per-document aggregate of all page scans, in page order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub records: Vec<AnnotationRecord>,
    /// Distinct highlight colours observed, sorted.
    pub highlight_colors: BTreeSet<String>,
    /// Pages in the document.
    pub pages_total: usize,
    /// Pages that loaded and were scanned.
    pub pages_scanned: usize,
    /// Pages excluded because they failed to load.
    pub pages_skipped: usize,
    /// Annotations skipped because they could not be read.
    pub annotations_skipped: usize,
}

impl ExtractionResult {
    /// Append one page's results. Callers merge in ascending page order.
    pub fn merge(&mut self, scan: PageScan) {
        self.records.extend(scan.records);
        self.highlight_colors.extend(scan.colors);
        self.annotations_skipped += scan.skipped;
        self.pages_scanned += 1;
    }
}

/// Document-level metadata read without scanning annotations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub page_count: usize,
}

/// Counters and timings for one export run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportStats {
    pub total_pages: usize,
    pub scanned_pages: usize,
    pub skipped_pages: usize,
    pub annotations: usize,
    pub skipped_annotations: usize,
    pub summaries_requested: usize,
    /// Summaries replaced by a sentinel string.
    pub summaries_failed: usize,
    /// Summaries served from the content-hash cache.
    pub cache_hits: usize,
    pub total_duration_ms: u64,
    pub extraction_duration_ms: u64,
    pub summary_duration_ms: u64,
}

/// Everything produced by [`crate::export::export`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportOutput {
    /// The rendered Markdown document (front matter included).
    pub markdown: String,
    pub annotations: Vec<AnnotationRecord>,
    /// Distinct highlight colours, sorted.
    pub highlight_colors: Vec<String>,
    pub metadata: DocumentMetadata,
    pub stats: ExportStats,
}
