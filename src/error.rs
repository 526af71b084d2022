//! Error types for the pdf-annotations library.
//!
//! Two families of errors reflect two distinct failure modes:
//!
//! * [`AnnotError`] — **Fatal**: the export cannot proceed at all (missing
//!   file, unreadable PDF, provider not configured, output not writable).
//!   Returned as `Err(AnnotError)` from the top-level `export*` functions.
//!
//! * [`PageLoadError`], [`AnnotationReadError`], [`NormalizationError`] and
//!   [`SummaryError`] — **Recoverable**: one page, one annotation, one text or
//!   one summarisation call failed. They are absorbed at the smallest possible
//!   boundary, logged, and counted in [`crate::output::ExportStats`] so the
//!   rest of the document still makes it into the output.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf-annotations library.
#[derive(Debug, Error)]
pub enum AnnotError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// pdfium could not open or parse the document.
    #[error("Could not open PDF '{path}': {detail}")]
    DocumentOpen { path: PathBuf, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install pdfium for your platform, or set PDFIUM_LIB_PATH=/path/to/libpdfium\n\
to use an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration file could not be read or parsed.
    #[error("Failed to load configuration from '{path}': {detail}")]
    ConfigLoad { path: PathBuf, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A page handle could not be loaded; the page is excluded from scanning.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Page {page}: failed to load: {detail}")]
pub struct PageLoadError {
    /// 0-based page index.
    pub page: usize,
    pub detail: String,
}

/// One annotation could not be read; it is skipped, the page continues.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Page {page}: annotation #{index} unreadable: {detail}")]
pub struct AnnotationReadError {
    /// 0-based page index.
    pub page: usize,
    /// Position of the annotation within the page's annotation list.
    pub index: usize,
    pub detail: String,
}

/// Text normalisation failed internally; the original text is kept.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("placeholder {0} was lost during normalisation")]
    PlaceholderLost(String),

    #[error("unresolved placeholder marker left in output")]
    PlaceholderLeftOver,
}

/// Failure of a single summarisation call.
///
/// The variant decides the retry schedule in
/// [`crate::pipeline::summarize::SummarizationService`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SummaryError {
    /// The provider throttled us (HTTP 429 or equivalent).
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The provider returned an error (5xx, bad request, auth…).
    #[error("service error: {0}")]
    Service(String),

    /// Anything else: empty response, panicked task, transport oddities.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_open_display() {
        let e = AnnotError::DocumentOpen {
            path: PathBuf::from("/tmp/paper.pdf"),
            detail: "FormatError".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("paper.pdf"), "got: {msg}");
        assert!(msg.contains("FormatError"), "got: {msg}");
    }

    #[test]
    fn page_load_display() {
        let e = PageLoadError {
            page: 4,
            detail: "bad xref".into(),
        };
        assert_eq!(e.to_string(), "Page 4: failed to load: bad xref");
    }

    #[test]
    fn annotation_read_display() {
        let e = AnnotationReadError {
            page: 0,
            index: 2,
            detail: "no subtype".into(),
        };
        assert!(e.to_string().contains("annotation #2"));
    }

    #[test]
    fn summary_error_display() {
        assert!(SummaryError::RateLimited("429".into())
            .to_string()
            .contains("rate limited"));
        assert!(SummaryError::Service("boom".into())
            .to_string()
            .contains("boom"));
    }

    #[test]
    fn provider_not_configured_display() {
        let e = AnnotError::ProviderNotConfigured {
            provider: "anthropic".into(),
            hint: "set ANTHROPIC_API_KEY".into(),
        };
        assert!(e.to_string().contains("anthropic"));
        assert!(e.to_string().contains("ANTHROPIC_API_KEY"));
    }
}
