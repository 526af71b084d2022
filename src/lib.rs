//! # pdf-annotations
//!
//! Export the highlights, sticky notes and free-text comments of a PDF to
//! Markdown, with LLM summaries for the highlights you marked in chosen
//! colours.
//!
//! ## Why this crate?
//!
//! Reading a paper with a highlighter leaves the interesting parts buried in
//! the PDF's annotation layer. Text pulled from under a highlight is also
//! rarely clean: line-break hyphens ("bio- logical"), OCR debris
//! ("t h e r m a l") and glued punctuation ("end.Next") survive into any
//! naive export. This crate walks every page's annotations, repairs the
//! highlighted text, and sends the highlights in your "summarise me" colours
//! to a language model, so the output reads as notes rather than fragments.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      check the file exists and starts with %PDF
//!  ├─ 2. Document   snapshot annotations + glyph boxes via pdfium (spawn_blocking)
//!  ├─ 3. Extract    scan pages on a rayon pool, normalise highlighted text
//!  ├─ 4. Summarise  cached, rate-limited, retried LLM calls (tokio tasks)
//!  └─ 5. Render     Markdown with optional YAML front matter + stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_annotations::{export, AnnotationConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = AnnotationConfig::builder()
//!         .summary_colors(["#92e1fb"])
//!         .build()?;
//!     let output = export("paper.pdf", &config).await?;
//!     println!("{}", output.markdown);
//!     eprintln!("highlight colours: {:?}", output.highlight_colors);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `annot2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! pdf-annotations = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod export;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    AnnotationConfig, AnnotationConfigBuilder, ApiConfig, ColorConfig, NormalizerConfig,
    ProcessingConfig, PromptConfig, MAX_RETRY_DELAY_SECS,
};
pub use error::{
    AnnotError, AnnotationReadError, NormalizationError, PageLoadError, SummaryError,
};
pub use export::{
    default_output_path, export, export_document, export_sync, export_to_file, inspect,
    resolve_backend,
};
pub use output::{
    AnnotationKind, AnnotationRecord, DocumentMetadata, ExportOutput, ExportStats,
    ExtractionResult,
};
pub use pipeline::document::{
    AnnotatedDocument, AnnotatedPage, AnnotationSubtype, MemoryDocument, MemoryPage, Point,
    RawAnnotation, Rect,
};
pub use pipeline::normalize::TextNormalizer;
pub use pipeline::summarize::{LlmBackend, SummarizationService, SummaryBackend, SummaryCache};
pub use progress::{ExportProgressCallback, NoopProgressCallback, ProgressCallback};
