//! Top-level export entry points.
//!
//! [`export`] runs the whole pipeline on a PDF file: validate, extract,
//! summarise, render. [`export_document`] does the same for any
//! [`AnnotatedDocument`] already in memory. Both return an
//! [`ExportOutput`]; [`export_to_file`] additionally writes the Markdown
//! next to wherever the caller asks, atomically.

use crate::config::AnnotationConfig;
use crate::error::{AnnotError, SummaryError};
use crate::output::{DocumentMetadata, ExportOutput, ExportStats, ExtractionResult};
use crate::pipeline::document::{self, AnnotatedDocument};
use crate::pipeline::extract::DocumentAnnotationExtractor;
use crate::pipeline::input;
use crate::pipeline::markdown;
use crate::pipeline::normalize::TextNormalizer;
use crate::pipeline::rate_limit::RateWindow;
use crate::pipeline::summarize::{
    sentinel, LlmBackend, SummarizationService, SummaryBackend, SummaryCache,
};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Sentinel detail used when no LLM provider could be set up.
const NO_BACKEND_DETAIL: &str = "no LLM provider configured";

/// Export the annotations of a PDF file to Markdown.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(ExportOutput)` even when some pages, annotations or summaries
/// failed; check `output.stats` for the counters.
///
/// # Errors
/// Returns `Err(AnnotError)` only for fatal errors:
/// - File not found / permission denied / not a PDF
/// - pdfium missing or unable to open the document
///
/// When summaries are needed but no LLM provider can be configured, each
/// qualifying highlight gets a "Summary not available" placeholder instead.
pub async fn export(
    pdf_path: impl AsRef<Path>,
    config: &AnnotationConfig,
) -> Result<ExportOutput, AnnotError> {
    let total_start = Instant::now();
    let pdf_path = input::validate_pdf(pdf_path)?;
    info!("Starting export: {}", pdf_path.display());

    // ── Step 1: Extract annotations ──────────────────────────────────────
    let extractor = build_extractor(config)?;
    let extraction_start = Instant::now();
    let (metadata, extraction) = extractor
        .extract_file_with_metadata(&pdf_path, config.processing.start_page)
        .await?;
    let extraction_ms = extraction_start.elapsed().as_millis() as u64;

    // ── Step 2: Summarise and render ─────────────────────────────────────
    finish(metadata, extraction, extraction_ms, config, total_start).await
}

/// Export an already-open document.
///
/// Pages are scanned synchronously: the current async worker thread blocks
/// until the scan is done (on a fresh rayon pool when `max_workers > 1`,
/// otherwise on this thread). Keep this to in-memory or otherwise cheap
/// documents; files on disk go through [`export`], which scans inside
/// `spawn_blocking`.
pub async fn export_document<D: AnnotatedDocument>(
    document: &D,
    config: &AnnotationConfig,
) -> Result<ExportOutput, AnnotError> {
    let total_start = Instant::now();
    let extractor = build_extractor(config)?;

    let extraction_start = Instant::now();
    let extraction = extractor.extract(document, config.processing.start_page);
    let extraction_ms = extraction_start.elapsed().as_millis() as u64;

    finish(
        document.metadata(),
        extraction,
        extraction_ms,
        config,
        total_start,
    )
    .await
}

/// Export and write the Markdown to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn export_to_file(
    pdf_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &AnnotationConfig,
) -> Result<ExportOutput, AnnotError> {
    let output = export(pdf_path, config).await?;
    write_atomic(output_path.as_ref(), &output.markdown).await?;
    Ok(output)
}

/// Synchronous wrapper around [`export`].
///
/// Creates a temporary tokio runtime internally.
pub fn export_sync(
    pdf_path: impl AsRef<Path>,
    config: &AnnotationConfig,
) -> Result<ExportOutput, AnnotError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| AnnotError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(export(pdf_path, config))
}

/// Read the title and page count without extracting anything.
///
/// Does not require an LLM provider or API key.
pub async fn inspect(pdf_path: impl AsRef<Path>) -> Result<DocumentMetadata, AnnotError> {
    let pdf_path = input::validate_pdf(pdf_path)?;
    tokio::task::spawn_blocking(move || document::read_metadata(&pdf_path))
        .await
        .map_err(|e| AnnotError::Internal(format!("Metadata task panicked: {}", e)))?
}

/// `<stem> (annotations).md`, next to the PDF.
pub fn default_output_path(pdf_path: impl AsRef<Path>) -> PathBuf {
    let pdf_path = pdf_path.as_ref();
    let stem = pdf_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    pdf_path.with_file_name(format!("{stem} (annotations).md"))
}

/// Write `contents` to `path` via a sibling temp file and a rename.
pub async fn write_atomic(path: &Path, contents: &str) -> Result<(), AnnotError> {
    let write_err = |e| AnnotError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    debug!("Wrote {} bytes to {}", contents.len(), path.display());
    Ok(())
}

/// Resolve the summarisation backend, from most-specific to least-specific.
///
/// 1. **Pre-built backend** (`config.backend`) — used as-is; this is how
///    tests and embedding applications inject their own.
/// 2. **Named provider** (`api.provider`) with `api.model`, built through
///    [`ProviderFactory::create_llm_provider`].
/// 3. **`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`**, when both are set.
/// 4. **OpenAI** with `api.model` when `OPENAI_API_KEY` is present, so users
///    holding several keys get a predictable default.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_backend(config: &AnnotationConfig) -> Result<Arc<dyn SummaryBackend>, AnnotError> {
    if let Some(ref backend) = config.backend {
        return Ok(Arc::clone(backend));
    }
    let provider = resolve_provider(config)?;
    Ok(Arc::new(LlmBackend::new(provider, &config.api)))
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn build_extractor(config: &AnnotationConfig) -> Result<DocumentAnnotationExtractor, AnnotError> {
    let normalizer = TextNormalizer::new(&config.normalization)?;
    Ok(
        DocumentAnnotationExtractor::new(normalizer, config.processing.max_workers)
            .with_progress(config.progress_callback.clone()),
    )
}

/// Summarise the qualifying highlights and render the final document.
async fn finish(
    metadata: DocumentMetadata,
    extraction: ExtractionResult,
    extraction_duration_ms: u64,
    config: &AnnotationConfig,
    total_start: Instant,
) -> Result<ExportOutput, AnnotError> {
    let candidates = markdown::summary_candidates(&extraction.records, &config.colors);

    let summary_start = Instant::now();
    let (summaries, summaries_failed, cache_hits) = if candidates.is_empty() {
        debug!("No highlights in summary colours; skipping summarisation");
        (Vec::new(), 0, 0)
    } else if !config.processing.summarize {
        info!(
            "Summarisation disabled; {} highlights rendered as quotes",
            candidates.len()
        );
        (Vec::new(), 0, 0)
    } else {
        summarize_candidates(&candidates, resolve_backend(config), config).await
    };
    let summary_duration_ms = summary_start.elapsed().as_millis() as u64;

    let markdown = format!(
        "{}{}",
        markdown::front_matter(metadata.title.as_deref()),
        markdown::render(&extraction.records, &summaries, &config.colors)
    );

    let stats = ExportStats {
        total_pages: extraction.pages_total,
        scanned_pages: extraction.pages_scanned,
        skipped_pages: extraction.pages_skipped,
        annotations: extraction.records.len(),
        skipped_annotations: extraction.annotations_skipped,
        summaries_requested: summaries.len(),
        summaries_failed,
        cache_hits,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        extraction_duration_ms,
        summary_duration_ms,
    };

    info!(
        "Export complete: {} annotations, {} summaries ({} unavailable), {}ms total",
        stats.annotations, stats.summaries_requested, stats.summaries_failed, stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_export_complete(stats.annotations, stats.summaries_requested);
    }

    Ok(ExportOutput {
        markdown,
        highlight_colors: extraction.highlight_colors.into_iter().collect(),
        annotations: extraction.records,
        metadata,
        stats,
    })
}

/// Summaries for `candidates`, or one placeholder each when there is no backend.
async fn summarize_candidates(
    candidates: &[String],
    backend: Result<Arc<dyn SummaryBackend>, AnnotError>,
    config: &AnnotationConfig,
) -> (Vec<String>, usize, usize) {
    let backend = match backend {
        Ok(backend) => backend,
        Err(e) => {
            warn!(
                "No summarisation backend available; {} highlights get a placeholder. {}",
                candidates.len(),
                e
            );
            let unavailable = sentinel(&SummaryError::Service(NO_BACKEND_DETAIL.to_string()));
            return (vec![unavailable; candidates.len()], candidates.len(), 0);
        }
    };

    let service = SummarizationService::new(
        backend,
        Arc::new(SummaryCache::new()),
        Arc::new(RateWindow::per_minute(config.api.rate_limit_per_minute)),
        &config.api,
        config.prompts.summarization.clone(),
    )
    .with_progress(config.progress_callback.clone());

    let summaries = service.summarize_all(candidates.to_vec()).await;
    (summaries, service.failures(), service.cache().hits())
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, AnnotError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        AnnotError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn resolve_provider(config: &AnnotationConfig) -> Result<Arc<dyn LLMProvider>, AnnotError> {
    let model = config.api.model.as_str();

    if let Some(name) = config.api.provider.as_deref().filter(|n| !n.is_empty()) {
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_provider(&prov, &env_model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| AnnotError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass --provider/--no-summaries.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
