//! Per-page annotation scanning.
//!
//! Turns the raw annotation list of one page into [`AnnotationRecord`]s.
//! The kind of every record is fixed here, once; nothing downstream looks
//! at PDF subtypes again.

use crate::output::{AnnotationKind, AnnotationRecord, PageScan};
use crate::pipeline::document::{AnnotatedPage, AnnotationSubtype, RawAnnotation, Rect};
use crate::pipeline::normalize::TextNormalizer;
use tracing::{debug, warn};

/// Colour used when an annotation carries no stroke colour.
pub const DEFAULT_COLOR: &str = "#000000";

/// Convert stroke colour components in `[0, 1]` to lowercase `#rrggbb`.
///
/// Missing components count as 0; out-of-range values are clamped.
pub fn color_to_hex(components: Option<&[f32]>) -> String {
    let Some(c) = components else {
        return DEFAULT_COLOR.to_string();
    };
    let channel = |i: usize| -> u8 {
        let v = c.get(i).copied().unwrap_or(0.0);
        if v.is_nan() {
            return 0;
        }
        (v * 255.0).round().clamp(0.0, 255.0) as u8
    };
    format!("#{:02x}{:02x}{:02x}", channel(0), channel(1), channel(2))
}

/// Scans single pages. Cheap to share across worker threads.
#[derive(Debug, Clone, Copy)]
pub struct PageAnnotationScanner<'a> {
    normalizer: &'a TextNormalizer,
}

impl<'a> PageAnnotationScanner<'a> {
    pub fn new(normalizer: &'a TextNormalizer) -> Self {
        Self { normalizer }
    }

    /// Scan one page. Never fails: unreadable annotations are logged and
    /// counted in [`PageScan::skipped`].
    ///
    /// `page_index` is 0-based; records carry `page_index + page_offset`.
    pub fn scan<P: AnnotatedPage + ?Sized>(
        &self,
        page: &P,
        page_index: usize,
        page_offset: i64,
    ) -> PageScan {
        let page_number = page_index as i64 + page_offset;
        let mut scan = PageScan::default();

        for entry in page.annotations() {
            let raw = match entry {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Skipping annotation: {}", e);
                    scan.skipped += 1;
                    continue;
                }
            };

            let color = color_to_hex(raw.stroke_color.as_deref());
            match raw.subtype {
                AnnotationSubtype::Highlight => {
                    let text = self.highlighted_text(page, &raw);
                    let record = match comment_of(&raw) {
                        Some(comment) => AnnotationRecord::highlight_with_comment(
                            page_number,
                            &text,
                            comment,
                            color.clone(),
                        ),
                        None => AnnotationRecord::new(
                            page_number,
                            AnnotationKind::Highlight,
                            text,
                            color.clone(),
                        ),
                    };
                    scan.colors.insert(color);
                    scan.records.push(record);
                }
                AnnotationSubtype::Text => scan.records.push(AnnotationRecord::new(
                    page_number,
                    AnnotationKind::Note,
                    comment_of(&raw).unwrap_or_default(),
                    color,
                )),
                AnnotationSubtype::FreeText => scan.records.push(AnnotationRecord::new(
                    page_number,
                    AnnotationKind::FreeTextComment,
                    comment_of(&raw).unwrap_or_default(),
                    color,
                )),
                AnnotationSubtype::Other(ref name) => {
                    debug!("Page {}: ignoring {} annotation", page_number, name);
                }
            }
        }

        debug!(
            "Page {}: {} records, {} skipped",
            page_number,
            scan.records.len(),
            scan.skipped
        );
        scan
    }

    /// Text under every quad, joined, newline-collapsed and normalised.
    fn highlighted_text<P: AnnotatedPage + ?Sized>(&self, page: &P, raw: &RawAnnotation) -> String {
        let joined: String = raw
            .vertices
            .chunks(4)
            .filter_map(Rect::bounding)
            .map(|rect| page.text_in_rect(&rect))
            .collect();
        let flattened = joined.trim().replace(['\r', '\n'], " ");
        self.normalizer.normalize(&flattened)
    }
}

/// Trimmed author comment, `None` when absent or blank.
fn comment_of(raw: &RawAnnotation) -> Option<&str> {
    raw.comment
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
}
