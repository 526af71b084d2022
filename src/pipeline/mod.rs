//! Pipeline stages for annotation export.
//!
//! Each submodule implements one step, so each can be tested on its own
//! and the document or LLM side can be swapped without touching the rest.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ document ──▶ extract ──▶ summarize ──▶ markdown
//! (%PDF)    (pdfium)     (scan ×N)   (LLM)         (render)
//! ```
//!
//! 1. [`input`]     — validate the user-supplied path
//! 2. [`document`]  — open the PDF and snapshot each page's annotations and
//!    glyph boxes; runs in `spawn_blocking` because pdfium is blocking
//! 3. [`extract`]   — scan every page on a rayon pool ([`scan`] per page,
//!    [`normalize`] on every highlighted text)
//! 4. [`summarize`] — summarise qualifying highlights with caching,
//!    a [`rate_limit`] window and retry/backoff; the only stage with
//!    network I/O
//! 5. [`markdown`]  — render records and summaries to Markdown

pub mod document;
pub mod extract;
pub mod input;
pub mod markdown;
pub mod normalize;
pub mod rate_limit;
pub mod scan;
pub mod summarize;
