//! Document capability: the annotation layer and text of each PDF page.
//!
//! The scanner and extractor never talk to pdfium directly. They see a
//! document through two small traits:
//!
//! * [`AnnotatedDocument`] — page count, page loading, title
//! * [`AnnotatedPage`]     — raw annotations and text inside a rectangle
//!
//! ## Why snapshot pages?
//!
//! pdfium handles are tied to the thread-local state of the C++ library and
//! are neither `Send` nor `Sync`. [`PdfiumDocument::open`] therefore walks
//! every page once, up front, copying out the annotation records and the
//! bounding box of every text glyph. The resulting [`PageSnapshot`]s are
//! plain data that the page-scanning pool can share freely.
//!
//! [`MemoryDocument`] implements the same traits from hand-built data; it
//! backs the test suite and callers whose annotations come from elsewhere.

use crate::error::{AnnotError, AnnotationReadError, PageLoadError};
use crate::output::DocumentMetadata;
use pdfium_render::prelude::*;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

// ── Geometry ─────────────────────────────────────────────────────────────────

/// A point in PDF user space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle in PDF user space (y grows upwards).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

impl Rect {
    pub fn new(left: f32, bottom: f32, right: f32, top: f32) -> Self {
        Self {
            left,
            bottom,
            right,
            top,
        }
    }

    /// Bounding rectangle of a quad's vertices. `None` for an empty slice.
    pub fn bounding(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let init = Rect::new(first.x, first.y, first.x, first.y);
        Some(points.iter().fold(init, |r, p| Rect {
            left: r.left.min(p.x),
            bottom: r.bottom.min(p.y),
            right: r.right.max(p.x),
            top: r.top.max(p.y),
        }))
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.left + self.right) / 2.0,
            (self.bottom + self.top) / 2.0,
        )
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.left && p.x <= self.right && p.y >= self.bottom && p.y <= self.top
    }
}

// ── Raw annotations ──────────────────────────────────────────────────────────

/// PDF annotation subtype as read from the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationSubtype {
    Highlight,
    /// Sticky note (`/Text`).
    Text,
    FreeText,
    /// Any other subtype; ignored by the scanner.
    Other(String),
}

/// One annotation as stored in the PDF, before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAnnotation {
    pub subtype: AnnotationSubtype,
    /// Stroke colour components in `[0, 1]`. Zero to three entries; `None`
    /// when the annotation has no colour at all.
    pub stroke_color: Option<Vec<f32>>,
    /// Author comment (`/Contents`).
    pub comment: Option<String>,
    /// Quad vertices, four per highlighted span.
    pub vertices: Vec<Point>,
}

impl RawAnnotation {
    pub fn new(subtype: AnnotationSubtype) -> Self {
        Self {
            subtype,
            stroke_color: None,
            comment: None,
            vertices: Vec::new(),
        }
    }

    pub fn with_color(mut self, components: impl Into<Vec<f32>>) -> Self {
        self.stroke_color = Some(components.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Append one quad covering `rect`, in PDF QuadPoints order.
    pub fn with_quad(mut self, rect: Rect) -> Self {
        self.vertices.extend([
            Point::new(rect.left, rect.top),
            Point::new(rect.right, rect.top),
            Point::new(rect.left, rect.bottom),
            Point::new(rect.right, rect.bottom),
        ]);
        self
    }
}

// ── Capability traits ────────────────────────────────────────────────────────

/// One loaded page.
pub trait AnnotatedPage: Send + Sync {
    /// Every annotation on the page in document order. Annotations that
    /// could not be read are reported individually.
    fn annotations(&self) -> Vec<Result<RawAnnotation, AnnotationReadError>>;

    /// Text laid out inside `rect`, in reading order.
    fn text_in_rect(&self, rect: &Rect) -> String;
}

impl<P: AnnotatedPage + ?Sized> AnnotatedPage for Arc<P> {
    fn annotations(&self) -> Vec<Result<RawAnnotation, AnnotationReadError>> {
        (**self).annotations()
    }

    fn text_in_rect(&self, rect: &Rect) -> String {
        (**self).text_in_rect(rect)
    }
}

/// An opened document.
pub trait AnnotatedDocument {
    type Page: AnnotatedPage;

    fn page_count(&self) -> usize;

    /// Load the page at 0-based `index`.
    fn load_page(&self, index: usize) -> Result<Self::Page, PageLoadError>;

    /// Document title from the info dictionary, if non-empty.
    fn title(&self) -> Option<String>;

    fn metadata(&self) -> DocumentMetadata {
        DocumentMetadata {
            title: self.title(),
            page_count: self.page_count(),
        }
    }
}

// ── pdfium backend ───────────────────────────────────────────────────────────

/// A text glyph and its loose bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glyph {
    pub ch: char,
    pub bounds: Rect,
}

/// Owned copy of one page's annotations and glyph boxes.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    annotations: Vec<Result<RawAnnotation, AnnotationReadError>>,
    glyphs: Vec<Glyph>,
}

impl PageSnapshot {
    pub fn new(
        annotations: Vec<Result<RawAnnotation, AnnotationReadError>>,
        glyphs: Vec<Glyph>,
    ) -> Self {
        Self {
            annotations,
            glyphs,
        }
    }
}

impl AnnotatedPage for PageSnapshot {
    fn annotations(&self) -> Vec<Result<RawAnnotation, AnnotationReadError>> {
        self.annotations.clone()
    }

    /// Glyphs whose centre lies inside `rect`. Whitespace glyphs directly
    /// following a taken glyph are kept too, since pdfium often reports
    /// generated spaces with degenerate boxes.
    fn text_in_rect(&self, rect: &Rect) -> String {
        let mut out = String::new();
        let mut previous_taken = false;
        for glyph in &self.glyphs {
            let inside = rect.contains(glyph.bounds.center());
            if inside || (previous_taken && glyph.ch.is_whitespace()) {
                out.push(glyph.ch);
                previous_taken = inside;
            } else {
                previous_taken = false;
            }
        }
        out
    }
}

/// A PDF opened through pdfium and snapshotted page by page.
#[derive(Debug, Clone)]
pub struct PdfiumDocument {
    pages: Vec<Result<Arc<PageSnapshot>, PageLoadError>>,
    title: Option<String>,
}

impl PdfiumDocument {
    /// Open `path` and snapshot every page.
    ///
    /// Blocking; call from `spawn_blocking` inside async code. A page that
    /// fails to load is recorded as a [`PageLoadError`] and reported when
    /// the extractor asks for it.
    pub fn open(path: &Path) -> Result<Self, AnnotError> {
        let pdfium = bind_pdfium()?;
        let document =
            pdfium
                .load_pdf_from_file(path, None)
                .map_err(|e| AnnotError::DocumentOpen {
                    path: path.to_path_buf(),
                    detail: format!("{:?}", e),
                })?;

        let title = document
            .metadata()
            .get(PdfDocumentMetadataTagType::Title)
            .map(|t| t.value().trim().to_string())
            .filter(|t| !t.is_empty());

        let total_pages = document.pages().len() as usize;
        info!("PDF loaded: {} pages", total_pages);

        let pages = (0..total_pages)
            .map(|idx| snapshot_page(&document, idx).map(Arc::new))
            .collect();

        Ok(Self { pages, title })
    }
}

impl AnnotatedDocument for PdfiumDocument {
    type Page = Arc<PageSnapshot>;

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn load_page(&self, index: usize) -> Result<Self::Page, PageLoadError> {
        match self.pages.get(index) {
            Some(Ok(page)) => Ok(Arc::clone(page)),
            Some(Err(e)) => Err(e.clone()),
            None => Err(PageLoadError {
                page: index,
                detail: format!("out of range (document has {} pages)", self.pages.len()),
            }),
        }
    }

    fn title(&self) -> Option<String> {
        self.title.clone()
    }
}

/// Bind pdfium from `PDFIUM_LIB_PATH`, the working directory, or the
/// system library path, in that order.
pub fn bind_pdfium() -> Result<Pdfium, AnnotError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(&path),
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| AnnotError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

/// Read the title and page count without scanning annotations. Blocking.
pub fn read_metadata(path: &Path) -> Result<DocumentMetadata, AnnotError> {
    let pdfium = bind_pdfium()?;
    let document =
        pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| AnnotError::DocumentOpen {
                path: path.to_path_buf(),
                detail: format!("{:?}", e),
            })?;

    let title = document
        .metadata()
        .get(PdfDocumentMetadataTagType::Title)
        .map(|t| t.value().trim().to_string())
        .filter(|t| !t.is_empty());

    Ok(DocumentMetadata {
        title,
        page_count: document.pages().len() as usize,
    })
}

fn snapshot_page(document: &PdfDocument<'_>, idx: usize) -> Result<PageSnapshot, PageLoadError> {
    let load_err = |e: PdfiumError| PageLoadError {
        page: idx,
        detail: format!("{:?}", e),
    };

    let page = document.pages().get(idx as u16).map_err(load_err)?;
    let text = page.text().map_err(load_err)?;

    let glyphs: Vec<Glyph> = text
        .chars()
        .iter()
        .filter_map(|c| {
            let ch = c.unicode_char()?;
            let bounds = c.loose_bounds().ok()?;
            Some(Glyph {
                ch,
                bounds: to_rect(&bounds),
            })
        })
        .collect();

    let annotations: Vec<_> = page
        .annotations()
        .iter()
        .enumerate()
        .map(|(i, annotation)| read_annotation(idx, i, &annotation))
        .collect();

    debug!(
        "Snapshotted page {}: {} annotations, {} glyphs",
        idx + 1,
        annotations.len(),
        glyphs.len()
    );

    Ok(PageSnapshot::new(annotations, glyphs))
}

fn read_annotation(
    page: usize,
    index: usize,
    annotation: &PdfPageAnnotation<'_>,
) -> Result<RawAnnotation, AnnotationReadError> {
    let subtype = match annotation.annotation_type() {
        PdfPageAnnotationType::Highlight => AnnotationSubtype::Highlight,
        PdfPageAnnotationType::Text => AnnotationSubtype::Text,
        PdfPageAnnotationType::FreeText => AnnotationSubtype::FreeText,
        other => return Ok(RawAnnotation::new(AnnotationSubtype::Other(format!("{:?}", other)))),
    };

    let mut raw = RawAnnotation::new(subtype.clone());
    raw.comment = annotation.contents();
    raw.stroke_color = match annotation.stroke_color() {
        Ok(c) => Some(vec![
            f32::from(c.red()) / 255.0,
            f32::from(c.green()) / 255.0,
            f32::from(c.blue()) / 255.0,
        ]),
        Err(e) => {
            debug!("Page {}: annotation #{} has no stroke colour: {:?}", page + 1, index, e);
            None
        }
    };

    if subtype == AnnotationSubtype::Highlight {
        for quad in annotation.attachment_points().iter() {
            raw = raw.with_quad(to_rect(&quad.to_rect()));
        }
        if raw.vertices.is_empty() {
            warn!("Page {}: highlight #{} has no quad points", page + 1, index);
            return Err(AnnotationReadError {
                page,
                index,
                detail: "highlight has no quad points".into(),
            });
        }
    }

    Ok(raw)
}

fn to_rect(r: &PdfRect) -> Rect {
    Rect::new(r.left().value, r.bottom().value, r.right().value, r.top().value)
}

// ── In-memory backend ────────────────────────────────────────────────────────

/// A page built from plain data: annotations plus positioned text runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryPage {
    annotations: Vec<Result<RawAnnotation, AnnotationReadError>>,
    spans: Vec<(Rect, String)>,
}

impl MemoryPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_annotation(mut self, annotation: RawAnnotation) -> Self {
        self.annotations.push(Ok(annotation));
        self
    }

    pub fn with_unreadable_annotation(mut self, error: AnnotationReadError) -> Self {
        self.annotations.push(Err(error));
        self
    }

    /// Lay `text` out inside `rect`.
    pub fn with_text(mut self, rect: Rect, text: impl Into<String>) -> Self {
        self.spans.push((rect, text.into()));
        self
    }
}

impl AnnotatedPage for MemoryPage {
    fn annotations(&self) -> Vec<Result<RawAnnotation, AnnotationReadError>> {
        self.annotations.clone()
    }

    fn text_in_rect(&self, rect: &Rect) -> String {
        self.spans
            .iter()
            .filter(|(r, _)| rect.contains(r.center()))
            .map(|(_, t)| t.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A document built from [`MemoryPage`]s.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocument {
    pages: Vec<Result<Arc<MemoryPage>, PageLoadError>>,
    title: Option<String>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_page(mut self, page: MemoryPage) -> Self {
        self.pages.push(Ok(Arc::new(page)));
        self
    }

    /// Append a page that fails to load with `detail`.
    pub fn with_broken_page(mut self, detail: impl Into<String>) -> Self {
        let page = self.pages.len();
        self.pages.push(Err(PageLoadError {
            page,
            detail: detail.into(),
        }));
        self
    }
}

impl AnnotatedDocument for MemoryDocument {
    type Page = Arc<MemoryPage>;

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn load_page(&self, index: usize) -> Result<Self::Page, PageLoadError> {
        match self.pages.get(index) {
            Some(Ok(page)) => Ok(Arc::clone(page)),
            Some(Err(e)) => Err(e.clone()),
            None => Err(PageLoadError {
                page: index,
                detail: "out of range".into(),
            }),
        }
    }

    fn title(&self) -> Option<String> {
        self.title.clone()
    }
}
