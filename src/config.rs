//! Configuration types for annotation export.
//!
//! All export behaviour is controlled through [`AnnotationConfig`], either
//! built via its [`AnnotationConfigBuilder`] or loaded from a YAML file with
//! the same section layout as the on-disk config:
//!
//! ```yaml
//! api:
//!   model: gpt-4.1-nano
//!   max_retries: 3
//!   retry_delay: 1.0
//!   rate_limit_per_minute: 60
//! colors:
//!   summary_colors: ["#92e1fb", "#69aff0"]
//! prompts:
//!   summarization: "Please, explain the following to me in bullet points."
//! processing:
//!   max_workers: 4
//! ```
//!
//! Every section is `#[serde(default)]`, so a file only has to name the
//! values it changes.

use crate::error::AnnotError;
use crate::pipeline::summarize::SummaryBackend;
use crate::progress::ProgressCallback;
use crate::prompts::DEFAULT_SUMMARY_PROMPT;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Largest accepted `api.retry_delay`, in seconds.
pub const MAX_RETRY_DELAY_SECS: f64 = 3600.0;
use std::path::Path;
use std::sync::Arc;

/// Configuration for one annotation export.
///
/// # Example
/// ```rust
/// use pdf_annotations::AnnotationConfig;
///
/// let config = AnnotationConfig::builder()
///     .model("gpt-4.1-mini")
///     .max_workers(8)
///     .summary_colors(["#92E1FB"])
///     .build()
///     .unwrap();
/// assert!(config.colors.is_summary_color("#92e1fb"));
/// ```
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationConfig {
    pub api: ApiConfig,
    pub colors: ColorConfig,
    pub prompts: PromptConfig,
    pub processing: ProcessingConfig,
    pub normalization: NormalizerConfig,

    /// Pre-constructed summarisation backend. Takes precedence over
    /// `api.provider`; mostly useful in tests and embedding applications.
    #[serde(skip)]
    pub backend: Option<Arc<dyn SummaryBackend>>,

    /// Optional progress observer.
    #[serde(skip)]
    pub progress_callback: Option<ProgressCallback>,
}

impl fmt::Debug for AnnotationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnotationConfig")
            .field("api", &self.api)
            .field("colors", &self.colors)
            .field("prompts", &self.prompts)
            .field("processing", &self.processing)
            .field("normalization", &self.normalization)
            .field("backend", &self.backend.as_ref().map(|_| "<dyn SummaryBackend>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExportProgressCallback>"),
            )
            .finish()
    }
}

impl AnnotationConfig {
    /// Create a new builder for `AnnotationConfig`.
    pub fn builder() -> AnnotationConfigBuilder {
        AnnotationConfigBuilder {
            config: Self::default(),
        }
    }

    /// Parse a YAML document and validate it.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, AnnotError> {
        let config: AnnotationConfig = serde_yaml::from_str(yaml)
            .map_err(|e| AnnotError::InvalidConfig(format!("YAML: {e}")))?;
        config.validated()
    }

    /// Load and validate a YAML configuration file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, AnnotError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| AnnotError::ConfigLoad {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        Self::from_yaml_str(&text).map_err(|e| AnnotError::ConfigLoad {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    /// Check ranges and canonicalise colour strings.
    pub fn validated(mut self) -> Result<Self, AnnotError> {
        if self.api.max_retries == 0 {
            return Err(AnnotError::InvalidConfig(
                "api.max_retries must be ≥ 1".into(),
            ));
        }
        if !(0.0..=MAX_RETRY_DELAY_SECS).contains(&self.api.retry_delay) {
            return Err(AnnotError::InvalidConfig(format!(
                "api.retry_delay must be between 0 and {MAX_RETRY_DELAY_SECS} seconds, got {}",
                self.api.retry_delay
            )));
        }
        if self.api.rate_limit_per_minute == 0 {
            return Err(AnnotError::InvalidConfig(
                "api.rate_limit_per_minute must be ≥ 1".into(),
            ));
        }
        if self.processing.max_workers == 0 {
            return Err(AnnotError::InvalidConfig(
                "processing.max_workers must be ≥ 1".into(),
            ));
        }
        let mut canonical = BTreeSet::new();
        for color in &self.colors.summary_colors {
            let c = color.trim().to_ascii_lowercase();
            if !is_hex_color(&c) {
                return Err(AnnotError::InvalidConfig(format!(
                    "colors.summary_colors: '{color}' is not a #rrggbb colour"
                )));
            }
            canonical.insert(c);
        }
        self.colors.summary_colors = canonical;
        Ok(self)
    }
}

fn is_hex_color(s: &str) -> bool {
    s.len() == 7 && s.starts_with('#') && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}

// ── Sections ─────────────────────────────────────────────────────────────

/// `api.*`: the summarisation provider and its call budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Model identifier passed to the provider. Default: `gpt-4.1-nano`.
    pub model: String,

    /// Provider name (`openai`, `anthropic`, `gemini`, `ollama`, …).
    /// If `None`, the provider is auto-detected from the environment.
    pub provider: Option<String>,

    /// Attempts per summary before a sentinel is returned. Default: 3.
    pub max_retries: u32,

    /// Base backoff in seconds. Rate-limit and service errors wait
    /// `retry_delay * 2^attempt`; unexpected errors wait `retry_delay`.
    /// Default: 1.0. At most [`MAX_RETRY_DELAY_SECS`].
    pub retry_delay: f64,

    /// Hard ceiling on provider calls in any trailing 60 s window. Default: 60.
    pub rate_limit_per_minute: u32,

    /// Sampling temperature. Default: 0.3.
    pub temperature: f32,

    /// Maximum tokens per summary. Default: 1024.
    pub max_tokens: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4.1-nano".to_string(),
            provider: None,
            max_retries: 3,
            retry_delay: 1.0,
            rate_limit_per_minute: 60,
            temperature: 0.3,
            max_tokens: 1024,
        }
    }
}

/// `colors.*`: which highlight colours get summarised.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    /// Lowercase `#rrggbb` strings. Default: `#92e1fb`, `#69aff0`.
    pub summary_colors: BTreeSet<String>,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            summary_colors: ["#92e1fb", "#69aff0"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl ColorConfig {
    /// Case-insensitive membership test.
    pub fn is_summary_color(&self, color: &str) -> bool {
        self.summary_colors.contains(&color.to_ascii_lowercase())
    }
}

/// `prompts.*`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Prefixed (followed by a blank line) to every highlight sent for
    /// summarisation.
    pub summarization: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            summarization: DEFAULT_SUMMARY_PROMPT.to_string(),
        }
    }
}

/// `processing.*`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Width of the page-scanning thread pool. Default: 4.
    pub max_workers: usize,

    /// Logical number of the first PDF page. Default: 1.
    ///
    /// Books often start their numbering after the front matter; setting
    /// this makes the `(p. N)` references match the printed page numbers.
    pub start_page: i64,

    /// Summarise qualifying highlights at all. Default: true.
    pub summarize: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            start_page: 1,
            summarize: true,
        }
    }
}

/// `normalization.*`: tuning data for the text-cleaning heuristic.
///
/// These constants were tuned against academic papers; other corpora may
/// need different values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// First fragments that always rejoin across a hyphen break.
    pub hyphen_prefixes: Vec<String>,
    /// Second-fragment beginnings that always rejoin.
    pub hyphen_suffixes: Vec<String>,
    /// Fragments at or below this many chars keep their hyphen ("x- ray").
    pub short_fragment_len: usize,
    /// Rejoin when the combined word is longer than this.
    pub long_compound_len: usize,
    /// Runs of this many single-letter tokens are OCR noise.
    pub noise_run_len: usize,
    /// Minimum letters in a spaced acronym considered for protection.
    pub abbreviation_min_len: usize,
    /// Spaced acronyms that survive noise removal (matched case-insensitively).
    pub abbreviations: Vec<String>,
    /// Extensions recognised in `name.ext` tokens, protected verbatim.
    pub file_extensions: Vec<String>,
    /// Warn when output is shorter than this fraction of the input…
    pub warn_ratio: f64,
    /// …and the input is longer than this many chars.
    pub warn_min_len: usize,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        let strings = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            hyphen_prefixes: strings(&[
                "pre", "anti", "auto", "semi", "inter", "intra", "super", "sub",
            ]),
            hyphen_suffixes: strings(&[
                "ing", "ed", "tion", "sion", "ment", "ness", "able", "ible",
            ]),
            short_fragment_len: 2,
            long_compound_len: 15,
            noise_run_len: 4,
            abbreviation_min_len: 3,
            abbreviations: strings(&[
                "URL", "PDF", "DNA", "RNA", "ATP", "PCR", "MRI", "HTML", "HTTP", "API", "CPU",
                "GPU", "USA", "NASA", "JSON", "XML", "SQL", "WHO", "FDA", "NIH", "AIDS", "HIV",
            ]),
            file_extensions: strings(&[
                "pdf", "txt", "md", "doc", "docx", "csv", "json", "xml", "html", "yaml", "yml",
                "py", "rs", "js", "ts", "png", "jpg", "jpeg", "gif", "zip", "tex",
            ]),
            warn_ratio: 0.3,
            warn_min_len: 50,
        }
    }
}

/// Builder for [`AnnotationConfig`].
#[derive(Debug)]
pub struct AnnotationConfigBuilder {
    config: AnnotationConfig,
}

impl AnnotationConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.api.model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.api.provider = Some(name.into());
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.api.max_retries = n;
        self
    }

    pub fn retry_delay_secs(mut self, secs: f64) -> Self {
        self.config.api.retry_delay = secs;
        self
    }

    pub fn rate_limit_per_minute(mut self, n: u32) -> Self {
        self.config.api.rate_limit_per_minute = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.api.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.api.max_tokens = n;
        self
    }

    pub fn summary_colors<I, S>(mut self, colors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.colors.summary_colors = colors.into_iter().map(Into::into).collect();
        self
    }

    pub fn summary_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompts.summarization = prompt.into();
        self
    }

    pub fn max_workers(mut self, n: usize) -> Self {
        self.config.processing.max_workers = n.max(1);
        self
    }

    pub fn start_page(mut self, page: i64) -> Self {
        self.config.processing.start_page = page;
        self
    }

    pub fn summarize(mut self, v: bool) -> Self {
        self.config.processing.summarize = v;
        self
    }

    pub fn normalization(mut self, n: NormalizerConfig) -> Self {
        self.config.normalization = n;
        self
    }

    pub fn backend(mut self, backend: Arc<dyn SummaryBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnnotationConfig, AnnotError> {
        self.config.validated()
    }
}
