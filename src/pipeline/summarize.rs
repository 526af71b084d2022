//! Highlight summarisation: cache, rate window, retries, sentinels.
//!
//! ## Retry Strategy
//!
//! Each text gets up to `api.max_retries` attempts. Rate-limit and service
//! errors back off exponentially (`retry_delay * 2^attempt`); unexpected
//! errors (empty responses and the like) wait a flat `retry_delay`. With the
//! default 1 s delay and 3 attempts a throttled text waits 1 s then 2 s
//! before the last try. Nothing sleeps after the final attempt.
//!
//! ## Never fails
//!
//! A text whose attempts are exhausted gets a sentinel string in place of
//! its summary, so the rendered document always has one entry per
//! qualifying highlight. Sentinels are never cached.
//!
//! ## Deduplication
//!
//! The cache maps the SHA-256 of a text to a `tokio::sync::OnceCell`.
//! Concurrent tasks summarising the same text wait on the same cell, so a
//! run makes at most one successful backend call per distinct text.

use crate::config::{ApiConfig, MAX_RETRY_DELAY_SECS};
use crate::error::SummaryError;
use crate::pipeline::rate_limit::RateWindow;
use crate::progress::ProgressCallback;
use crate::prompts::summary_prompt;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use futures::future::join_all;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Sentinel for a text that stayed rate-limited through every attempt.
pub const RATE_LIMITED_SENTINEL: &str = "Summary not available due to rate limiting";

/// The text standing in for a summary that could not be produced.
pub fn sentinel(error: &SummaryError) -> String {
    match error {
        SummaryError::RateLimited(_) => RATE_LIMITED_SENTINEL.to_string(),
        SummaryError::Service(detail) => format!("Summary not available: {detail}"),
        SummaryError::Unexpected(detail) => {
            format!("Summary not available due to an unexpected error: {detail}")
        }
    }
}

// ── Backend ──────────────────────────────────────────────────────────────────

/// Something that turns a prompt into a completion.
#[async_trait]
pub trait SummaryBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, SummaryError>;
}

/// [`SummaryBackend`] over an `edgequake_llm` provider.
pub struct LlmBackend {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
}

impl LlmBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, api: &ApiConfig) -> Self {
        Self {
            provider,
            temperature: api.temperature,
            max_tokens: api.max_tokens,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl SummaryBackend for LlmBackend {
    async fn complete(&self, prompt: &str) -> Result<String, SummaryError> {
        let messages = vec![ChatMessage::user(prompt)];
        let response = self
            .provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| classify_provider_error(&e.to_string()))?;

        let content = response.content.trim();
        if content.is_empty() {
            return Err(SummaryError::Unexpected("empty response from provider".into()));
        }
        Ok(content.to_string())
    }
}

/// Sort a provider error message into a [`SummaryError`] variant.
pub fn classify_provider_error(message: &str) -> SummaryError {
    let lower = message.to_lowercase();
    if lower.contains("rate limit")
        || lower.contains("ratelimit")
        || lower.contains("too many requests")
        || lower.contains("429")
    {
        SummaryError::RateLimited(message.to_string())
    } else {
        SummaryError::Service(message.to_string())
    }
}

// ── Cache ────────────────────────────────────────────────────────────────────

/// Content-addressed summary cache for one run.
#[derive(Debug, Default)]
pub struct SummaryCache {
    slots: Mutex<HashMap<String, Arc<OnceCell<String>>>>,
    hits: AtomicUsize,
}

impl SummaryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// SHA-256 of `text`, lowercase hex.
    pub fn key(text: &str) -> String {
        hex::encode(Sha256::digest(text.as_bytes()))
    }

    /// Cached summary for `text`, if one has been stored.
    pub fn get(&self, text: &str) -> Option<String> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(&Self::key(text)).and_then(|c| c.get().cloned())
    }

    /// Number of stored summaries.
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.values().filter(|c| c.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lookups answered without a backend call.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn slot(&self, text: &str) -> Arc<OnceCell<String>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(slots.entry(Self::key(text)).or_default())
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Service ──────────────────────────────────────────────────────────────────

/// Summarises batches of highlight texts.
///
/// Cheap to clone; clones share the backend, cache and rate window.
#[derive(Clone)]
pub struct SummarizationService {
    backend: Arc<dyn SummaryBackend>,
    cache: Arc<SummaryCache>,
    window: Arc<RateWindow>,
    max_retries: u32,
    retry_delay: Duration,
    prompt: String,
    failures: Arc<AtomicUsize>,
    progress_callback: Option<ProgressCallback>,
}

impl SummarizationService {
    pub fn new(
        backend: Arc<dyn SummaryBackend>,
        cache: Arc<SummaryCache>,
        window: Arc<RateWindow>,
        api: &ApiConfig,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            cache,
            window,
            max_retries: api.max_retries.max(1),
            retry_delay: retry_delay(api.retry_delay),
            prompt: prompt.into(),
            failures: Arc::new(AtomicUsize::new(0)),
            progress_callback: None,
        }
    }

    pub fn with_progress(mut self, callback: Option<ProgressCallback>) -> Self {
        self.progress_callback = callback;
        self
    }

    pub fn cache(&self) -> &Arc<SummaryCache> {
        &self.cache
    }

    /// Texts that ended with a sentinel so far.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    /// Summarise one text. `index` is used for logging only.
    pub async fn summarize_one(&self, text: &str, index: usize) -> String {
        self.resolve(text, index).await.0
    }

    /// Summarise every text concurrently. One output per input, same order.
    ///
    /// Each text runs in its own tokio task; a task that panics yields the
    /// unexpected-error sentinel for its index only.
    pub async fn summarize_all(&self, texts: Vec<String>) -> Vec<String> {
        let total = texts.len();
        if total == 0 {
            return Vec::new();
        }
        info!("Summarising {} highlights", total);
        if let Some(ref cb) = self.progress_callback {
            cb.on_summaries_start(total);
        }

        let handles: Vec<_> = texts
            .into_iter()
            .enumerate()
            .map(|(index, text)| {
                let service = self.clone();
                tokio::spawn(async move {
                    let (summary, ok) = service.resolve(&text, index).await;
                    if let Some(ref cb) = service.progress_callback {
                        cb.on_summary_complete(index, total, ok);
                    }
                    summary
                })
            })
            .collect();

        let mut summaries = Vec::with_capacity(total);
        for (index, joined) in join_all(handles).await.into_iter().enumerate() {
            match joined {
                Ok(summary) => summaries.push(summary),
                Err(e) => {
                    warn!("Summary #{}: task failed: {}", index + 1, e);
                    self.failures.fetch_add(1, Ordering::SeqCst);
                    if let Some(ref cb) = self.progress_callback {
                        cb.on_summary_complete(index, total, false);
                    }
                    summaries.push(sentinel(&SummaryError::Unexpected(e.to_string())));
                }
            }
        }

        info!(
            "Summaries done: {} ok, {} unavailable, {} cache hits",
            total - self.failures().min(total),
            self.failures(),
            self.cache.hits()
        );
        summaries
    }

    /// Summary or sentinel, plus whether it is a real summary.
    async fn resolve(&self, text: &str, index: usize) -> (String, bool) {
        let slot = self.cache.slot(text);
        let mut computed = false;
        let outcome = slot
            .get_or_try_init(|| {
                computed = true;
                self.call_with_retries(text, index)
            })
            .await;

        match outcome {
            Ok(summary) => {
                if !computed {
                    self.cache.record_hit();
                    debug!("Summary #{}: cache hit", index + 1);
                }
                (summary.clone(), true)
            }
            Err(sentinel_text) => {
                self.failures.fetch_add(1, Ordering::SeqCst);
                (sentinel_text, false)
            }
        }
    }

    async fn call_with_retries(&self, text: &str, index: usize) -> Result<String, String> {
        let prompt = summary_prompt(&self.prompt, text);
        let mut last_err = SummaryError::Unexpected("no attempt made".into());

        for attempt in 0..self.max_retries {
            self.window.acquire().await;

            match self.backend.complete(&prompt).await {
                Ok(summary) => {
                    debug!("Summary #{}: done after {} attempt(s)", index + 1, attempt + 1);
                    return Ok(summary);
                }
                Err(e) => {
                    warn!(
                        "Summary #{}: attempt {}/{} failed: {}",
                        index + 1,
                        attempt + 1,
                        self.max_retries,
                        e
                    );
                    let backoff = match e {
                        SummaryError::RateLimited(_) | SummaryError::Service(_) => {
                            exponential_backoff(self.retry_delay, attempt)
                        }
                        SummaryError::Unexpected(_) => self.retry_delay,
                    };
                    last_err = e;
                    if attempt + 1 < self.max_retries {
                        sleep(backoff).await;
                    }
                }
            }
        }

        Err(sentinel(&last_err))
    }
}

/// Base delay from config seconds; NaN and negatives become zero.
fn retry_delay(secs: f64) -> Duration {
    let secs = if secs.is_nan() { 0.0 } else { secs.clamp(0.0, MAX_RETRY_DELAY_SECS) };
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

/// `base * 2^attempt`, saturating at `Duration::MAX`.
fn exponential_backoff(base: Duration, attempt: u32) -> Duration {
    base.checked_mul(2u32.saturating_pow(attempt))
        .unwrap_or(Duration::MAX)
}

impl std::fmt::Debug for SummarizationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummarizationService")
            .field("backend", &"<dyn SummaryBackend>")
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("rate_limit", &self.window.limit())
            .finish()
    }
}
