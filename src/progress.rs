//! Progress-callback trait for export events.
//!
//! Inject an [`Arc<dyn ExportProgressCallback>`] via
//! [`crate::config::AnnotationConfigBuilder::progress_callback`] to receive
//! events as the pipeline scans pages and summarises highlights.
//!
//! The trait is `Send + Sync`: summary events fire from concurrently
//! running tokio tasks, so implementations must protect shared mutable
//! state with `Mutex` or atomics.
//!
//! # Example
//!
//! ```rust
//! use pdf_annotations::{AnnotationConfig, ExportProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl ExportProgressCallback for CountingCallback {
//!     fn on_summary_complete(&self, index: usize, total: usize, _ok: bool) {
//!         let n = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("summary #{} done ({n}/{total})", index + 1);
//!     }
//! }
//!
//! let config = AnnotationConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the export pipeline at each milestone.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ExportProgressCallback: Send + Sync {
    /// Called once the document is open and its pages are loaded.
    fn on_extraction_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called after every page has been scanned.
    fn on_extraction_complete(&self, annotations: usize, pages_scanned: usize) {
        let _ = (annotations, pages_scanned);
    }

    /// Called before the summarisation batch is fanned out.
    fn on_summaries_start(&self, total: usize) {
        let _ = total;
    }

    /// Called as each summary resolves. `ok` is false for sentinels.
    ///
    /// # Arguments
    /// * `index` — 0-based position of the text in the batch
    /// * `total` — batch size
    /// * `ok`    — whether a real summary (cached or fresh) was produced
    fn on_summary_complete(&self, index: usize, total: usize, ok: bool) {
        let _ = (index, total, ok);
    }

    /// Called once the Markdown is assembled.
    fn on_export_complete(&self, annotations: usize, summaries: usize) {
        let _ = (annotations, summaries);
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl ExportProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnnotationConfig`].
pub type ProgressCallback = Arc<dyn ExportProgressCallback>;
