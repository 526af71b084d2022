//! CLI binary for pdf-annotations.
//!
//! A thin shim over the library crate that maps CLI flags (on top of an
//! optional YAML config file) to `AnnotationConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf_annotations::{
    default_output_path, export, export_to_file, inspect, AnnotationConfig,
    ExportProgressCallback, ExportStats, ProgressCallback,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner while pages are scanned, then a bar over the summary batch.
/// Summaries complete out of order, so the bar only counts.
struct CliProgressCallback {
    bar: ProgressBar,
    unavailable: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            unavailable: AtomicUsize::new(0),
        })
    }
}

impl ExportProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        self.bar.set_prefix("Scanning");
        self.bar.set_message(format!("{total_pages} pages"));
    }

    fn on_extraction_complete(&self, annotations: usize, pages_scanned: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "{annotations} annotations found on {pages_scanned} pages"
            ))
        ));
    }

    fn on_summaries_start(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} highlights  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_style(style);
        self.bar.set_prefix("Summarising");
        self.bar.reset_eta();
    }

    fn on_summary_complete(&self, index: usize, _total: usize, ok: bool) {
        if !ok {
            self.unavailable.fetch_add(1, Ordering::SeqCst);
            self.bar.println(format!(
                "  {} summary #{} unavailable",
                red("✗"),
                index + 1
            ));
        }
        self.bar.inc(1);
    }

    fn on_export_complete(&self, annotations: usize, summaries: usize) {
        self.bar.finish_and_clear();
        let unavailable = self.unavailable.load(Ordering::SeqCst);
        if unavailable == 0 {
            eprintln!(
                "{} {} annotations exported, {} summarised",
                green("✔"),
                bold(&annotations.to_string()),
                summaries
            );
        } else {
            eprintln!(
                "{} {} annotations exported, {}/{} summaries available",
                cyan("⚠"),
                bold(&annotations.to_string()),
                summaries - unavailable.min(summaries),
                summaries
            );
        }
    }
}

const AFTER_HELP: &str = r##"EXAMPLES:
  # Write "paper (annotations).md" next to the PDF
  annot2md paper.pdf

  # Choose the output file, print to stdout instead
  annot2md paper.pdf -o notes/paper.md
  annot2md paper.pdf --stdout

  # Summarise highlights in two colours, numbering pages from 0
  annot2md --summary-color '#92e1fb' --summary-color '#69aff0' --start-page 0 paper.pdf

  # No LLM at all: every highlight becomes a quote
  annot2md --no-summaries paper.pdf

  # Settings from a YAML file, flags win
  annot2md --config annot.yaml --model gpt-4.1-mini paper.pdf

  # Title and page count only (no API key needed)
  annot2md --inspect-only paper.pdf

CONFIG FILE (YAML, every key optional):
  api:
    model: gpt-4.1-nano
    provider: openai
    max_retries: 3
    retry_delay: 1.0          # seconds, doubled per retry
    rate_limit_per_minute: 60
  colors:
    summary_colors: ["#92e1fb", "#69aff0"]
  prompts:
    summarization: "Please, explain the following to me in bullet points. ..."
  processing:
    max_workers: 4
    start_page: 1

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium
"##;

/// Export PDF highlights, notes and comments to Markdown.
#[derive(Parser, Debug)]
#[command(
    name = "annot2md",
    version,
    about = "Export PDF highlights, notes and comments to Markdown",
    long_about = "Extract the annotation layer of a PDF (highlights, sticky notes, free-text \
comments), repair the highlighted text, and summarise highlights in selected colours with an \
LLM. Supports OpenAI, Anthropic, Google Gemini, Ollama and any provider edgequake-llm knows.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF file to read.
    input: PathBuf,

    /// Write Markdown here. Default: "<stem> (annotations).md" next to the PDF.
    #[arg(short, long, env = "ANNOT2MD_OUTPUT")]
    output: Option<PathBuf>,

    /// Print Markdown to stdout instead of writing a file.
    #[arg(long, conflicts_with = "output")]
    stdout: bool,

    /// YAML configuration file.
    #[arg(short, long, env = "ANNOT2MD_CONFIG")]
    config: Option<PathBuf>,

    /// Number given to the first page of the PDF.
    #[arg(long, env = "ANNOT2MD_START_PAGE", allow_negative_numbers = true)]
    start_page: Option<i64>,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// Threads used to scan pages.
    #[arg(long, env = "ANNOT2MD_MAX_WORKERS")]
    max_workers: Option<usize>,

    /// Attempts per summary.
    #[arg(long, env = "ANNOT2MD_MAX_RETRIES")]
    max_retries: Option<u32>,

    /// Base backoff between attempts, in seconds.
    #[arg(long, env = "ANNOT2MD_RETRY_DELAY")]
    retry_delay: Option<f64>,

    /// Maximum summarisation calls per minute.
    #[arg(long, env = "ANNOT2MD_RATE_LIMIT")]
    rate_limit: Option<u32>,

    /// Highlight colour (#rrggbb) whose highlights get summarised. Repeatable;
    /// replaces the configured set.
    #[arg(long = "summary-color", value_name = "HEX")]
    summary_colors: Vec<String>,

    /// Skip summarisation; every highlight renders as a quote.
    #[arg(long, env = "ANNOT2MD_NO_SUMMARIES")]
    no_summaries: bool,

    /// Output structured JSON (ExportOutput) on stdout instead of Markdown.
    #[arg(long, env = "ANNOT2MD_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "ANNOT2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Print PDF metadata only, no extraction.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "ANNOT2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "ANNOT2MD_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.verbose;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let meta = inspect(&cli.input).await.context("Failed to inspect PDF")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:   {}", cli.input.display());
            if let Some(ref t) = meta.title {
                println!("Title:  {}", t);
            }
            println!("Pages:  {}", meta.page_count);
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExportProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Run export ───────────────────────────────────────────────────────
    let output = if cli.json || cli.stdout {
        export(&cli.input, &config).await.context("Export failed")?
    } else {
        let output_path = cli
            .output
            .clone()
            .unwrap_or_else(|| default_output_path(&cli.input));
        let output = export_to_file(&cli.input, &output_path, &config)
            .await
            .context("Export failed")?;
        if !cli.quiet {
            eprintln!(
                "{}  {} annotations  {}ms  →  {}",
                green("✔"),
                output.stats.annotations,
                output.stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
        }
        output
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if cli.stdout {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(output.markdown.as_bytes())
            .context("Failed to write to stdout")?;
    }

    if !cli.quiet && !cli.json {
        print_report(&output.highlight_colors, &output.stats);
    }

    Ok(())
}

/// Highlight colours found plus a one-line summary of the run.
fn print_report(colors: &[String], stats: &ExportStats) {
    if colors.is_empty() {
        eprintln!("{}", dim("No highlights found."));
    } else {
        eprintln!("Highlight colours: {}", colors.join(", "));
    }
    if stats.skipped_pages > 0 || stats.skipped_annotations > 0 {
        eprintln!(
            "  {} pages and {} annotations could not be read",
            red(&stats.skipped_pages.to_string()),
            red(&stats.skipped_annotations.to_string()),
        );
    }
    eprintln!(
        "   {} summaries ({} unavailable, {} cached)  —  {}ms total",
        dim(&stats.summaries_requested.to_string()),
        stats.summaries_failed,
        stats.cache_hits,
        stats.total_duration_ms,
    );
}

/// Load the YAML file (if any) and apply CLI overrides on top.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AnnotationConfig> {
    let mut config = match cli.config {
        Some(ref path) => AnnotationConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => AnnotationConfig::default(),
    };

    if let Some(ref model) = cli.model {
        config.api.model = model.clone();
    }
    if let Some(ref provider) = cli.provider {
        config.api.provider = Some(provider.clone());
    }
    if let Some(n) = cli.max_retries {
        config.api.max_retries = n;
    }
    if let Some(d) = cli.retry_delay {
        config.api.retry_delay = d;
    }
    if let Some(n) = cli.rate_limit {
        config.api.rate_limit_per_minute = n;
    }
    if !cli.summary_colors.is_empty() {
        config.colors.summary_colors = cli.summary_colors.iter().cloned().collect();
    }
    if let Some(n) = cli.max_workers {
        config.processing.max_workers = n;
    }
    if let Some(p) = cli.start_page {
        config.processing.start_page = p;
    }
    if cli.no_summaries {
        config.processing.summarize = false;
    }
    config.progress_callback = progress;

    config.validated().context("Invalid configuration")
}
