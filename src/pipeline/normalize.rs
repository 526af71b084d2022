//! Text normalisation: deterministic cleanup of text extracted from
//! highlight regions.
//!
//! Text pulled out from under a highlight's quads carries the artefacts of
//! the page layout it came from:
//!
//! - words split across lines with a hyphen ("bio- logical")
//! - glyph-level extraction noise ("t h e r m a l")
//! - missing spaces after sentence punctuation ("understood.Various")
//! - stray bullets and symbols floating between words
//!
//! [`TextNormalizer::normalize`] applies eight ordered passes to fix these.
//! Substrings that must come out byte-for-byte (emails, version numbers,
//! file names, known acronyms) are swapped for placeholder tokens before
//! any rewriting and restored at the end.
//!
//! The heuristic is lossy by nature; false positives are tolerated. All of
//! its constants come from [`NormalizerConfig`].
//!
//! ## Pass Order
//!
//! 1. Collapse `\n`, `\t`, `\r` runs to one space
//! 2. Protect emails, file names, version numbers
//! 3. Rejoin line-break hyphenation
//! 4. Protect spaced acronyms, then drop single-letter noise runs
//! 5. Space after `.,;?!` followed by a letter
//! 6. Drop isolated single symbols
//! 7. Collapse whitespace and trim
//! 8. Restore acronyms, then protected substrings

use crate::config::NormalizerConfig;
use crate::error::{AnnotError, NormalizationError};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashSet;
use tracing::warn;

/// Opens a placeholder token. Private-use, so neither `\w`, alphanumeric,
/// punctuation nor whitespace to any later pass.
const OPEN: char = '\u{E000}';
/// Closes a placeholder token.
const CLOSE: char = '\u{E001}';

const TAG_PROTECTED: char = 'P';
const TAG_ABBREVIATION: char = 'A';

// ── Fixed patterns ───────────────────────────────────────────────────────────

static RE_LINE_BREAKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\n\t\r]+").unwrap());

static RE_EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());

static RE_VERSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+\.\d+(?:\.\d+)*").unwrap());

static RE_HYPHEN_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w+)-\s+(\w+)").unwrap());

static RE_PUNCT_LETTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"([.,;?!])(\p{L})").unwrap());

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Stateless, configurable text cleaner for highlighted text.
///
/// Construct once per run and share by reference (or `Arc`) across the
/// page-scanning workers; `normalize` takes `&self` and allocates only
/// per call.
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    prefixes: Vec<String>,
    suffixes: Vec<String>,
    abbreviations: HashSet<String>,
    short_fragment_len: usize,
    long_compound_len: usize,
    noise_run_len: usize,
    warn_ratio: f64,
    warn_min_len: usize,
    re_filename: Option<Regex>,
    re_spaced_caps: Regex,
}

impl TextNormalizer {
    /// Compile the configurable patterns.
    pub fn new(config: &NormalizerConfig) -> Result<Self, AnnotError> {
        let extensions: Vec<String> = config
            .file_extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.'))
            .filter(|e| !e.is_empty())
            .map(regex::escape)
            .collect();
        let re_filename = if extensions.is_empty() {
            None
        } else {
            let pattern = format!(r"(?i)\b[\w-]+\.(?:{})\b", extensions.join("|"));
            Some(Regex::new(&pattern).map_err(|e| {
                AnnotError::InvalidConfig(format!("normalization.file_extensions: {e}"))
            })?)
        };

        // A spaced run of at least `abbreviation_min_len` single capitals.
        let repeats = config.abbreviation_min_len.saturating_sub(1).max(1);
        let re_spaced_caps = Regex::new(&format!(r"\b[A-Z](?:\s+[A-Z]){{{repeats},}}\b"))
            .map_err(|e| AnnotError::InvalidConfig(format!("normalization: {e}")))?;

        Ok(Self {
            prefixes: lowercase_all(&config.hyphen_prefixes),
            suffixes: lowercase_all(&config.hyphen_suffixes),
            abbreviations: config
                .abbreviations
                .iter()
                .map(|a| a.trim().to_uppercase())
                .collect(),
            short_fragment_len: config.short_fragment_len,
            long_compound_len: config.long_compound_len,
            noise_run_len: config.noise_run_len.max(1),
            warn_ratio: config.warn_ratio,
            warn_min_len: config.warn_min_len,
            re_filename,
            re_spaced_caps,
        })
    }

    /// Clean `raw`. Never fails: on an internal error the input comes back
    /// unchanged and a warning is logged.
    pub fn normalize(&self, raw: &str) -> String {
        match self.try_normalize(raw) {
            Ok(cleaned) => {
                self.warn_on_heavy_reduction(raw, &cleaned);
                cleaned
            }
            Err(e) => {
                warn!("Text normalisation failed ({e}); keeping original text");
                raw.to_string()
            }
        }
    }

    fn try_normalize(&self, raw: &str) -> Result<String, NormalizationError> {
        if raw.contains([OPEN, CLOSE]) {
            return Err(NormalizationError::PlaceholderLeftOver);
        }

        let mut protected = Vec::new();
        let mut abbreviations = Vec::new();

        let s = RE_LINE_BREAKS.replace_all(raw, " ").into_owned();
        let s = self.protect_literals(&s, &mut protected);
        let s = self.rejoin_hyphenation(&s);
        let s = self.protect_abbreviations(&s, &mut abbreviations);
        let s = self.remove_noise_runs(&s);
        let s = RE_PUNCT_LETTER.replace_all(&s, "${1} ${2}").into_owned();
        let s = drop_isolated_symbols(&s);
        let s = RE_WHITESPACE.replace_all(&s, " ").trim().to_string();
        let s = restore(&s, TAG_ABBREVIATION, &abbreviations)?;
        let s = restore(&s, TAG_PROTECTED, &protected)?;

        if s.contains([OPEN, CLOSE]) {
            return Err(NormalizationError::PlaceholderLeftOver);
        }
        Ok(s)
    }

    // ── Pass 2: protect emails, file names, versions ────────────────────────

    fn protect_literals(&self, text: &str, vault: &mut Vec<String>) -> String {
        let s = stash(text, &RE_EMAIL, TAG_PROTECTED, vault);
        let s = match &self.re_filename {
            Some(re) => stash(&s, re, TAG_PROTECTED, vault),
            None => s,
        };
        stash(&s, &RE_VERSION, TAG_PROTECTED, vault)
    }

    // ── Pass 3: rejoin hyphenation ──────────────────────────────────────────

    fn rejoin_hyphenation(&self, text: &str) -> String {
        RE_HYPHEN_BREAK
            .replace_all(text, |caps: &Captures<'_>| {
                let (first, second) = (&caps[1], &caps[2]);
                if self.should_merge(first, second) {
                    format!("{first}{second}")
                } else {
                    format!("{first}-{second}")
                }
            })
            .into_owned()
    }

    fn should_merge(&self, first: &str, second: &str) -> bool {
        let (a, b) = (first.chars().count(), second.chars().count());
        if a <= self.short_fragment_len || b <= self.short_fragment_len {
            return false;
        }
        let first_lower = first.to_lowercase();
        let second_lower = second.to_lowercase();
        second.chars().next().is_some_and(char::is_lowercase)
            || self.prefixes.iter().any(|p| *p == first_lower)
            || self.suffixes.iter().any(|s| second_lower.starts_with(s.as_str()))
            || a + b > self.long_compound_len
    }

    // ── Pass 4: OCR noise ───────────────────────────────────────────────────

    fn protect_abbreviations(&self, text: &str, vault: &mut Vec<String>) -> String {
        self.re_spaced_caps
            .replace_all(text, |caps: &Captures<'_>| {
                let joined: String = caps[0].split_whitespace().collect();
                if self.abbreviations.contains(&joined.to_uppercase()) {
                    placeholder(TAG_ABBREVIATION, vault, &caps[0])
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned()
    }

    fn remove_noise_runs(&self, text: &str) -> String {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let mut kept = Vec::with_capacity(tokens.len());
        let mut i = 0;
        while i < tokens.len() {
            let run = tokens[i..]
                .iter()
                .take_while(|t| is_single_letter(t))
                .count();
            if run == 0 {
                kept.push(tokens[i]);
                i += 1;
                continue;
            }
            if run < self.noise_run_len {
                kept.extend_from_slice(&tokens[i..i + run]);
            }
            i += run;
        }
        kept.join(" ")
    }

    // ── Diagnostics ─────────────────────────────────────────────────────────

    fn warn_on_heavy_reduction(&self, raw: &str, cleaned: &str) {
        let before = raw.chars().count();
        let after = cleaned.chars().count();
        if before > self.warn_min_len && (after as f64) < before as f64 * self.warn_ratio {
            let head: String = cleaned.chars().take(50).collect();
            warn!(
                "Significant text reduction in cleaning ({} -> {} chars). Result start: '{}…'",
                before, after, head
            );
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn lowercase_all(xs: &[String]) -> Vec<String> {
    xs.iter().map(|x| x.trim().to_lowercase()).collect()
}

fn placeholder(tag: char, vault: &mut Vec<String>, original: &str) -> String {
    let token = format!("{OPEN}{tag}{}{CLOSE}", vault.len());
    vault.push(original.to_string());
    token
}

fn stash(text: &str, re: &Regex, tag: char, vault: &mut Vec<String>) -> String {
    re.replace_all(text, |caps: &Captures<'_>| placeholder(tag, vault, &caps[0]))
        .into_owned()
}

fn restore(text: &str, tag: char, vault: &[String]) -> Result<String, NormalizationError> {
    let mut out = text.to_string();
    for (i, original) in vault.iter().enumerate() {
        let token = format!("{OPEN}{tag}{i}{CLOSE}");
        if !out.contains(&token) {
            return Err(NormalizationError::PlaceholderLost(format!("{tag}{i}")));
        }
        out = out.replacen(&token, original, 1);
    }
    Ok(out)
}

fn is_single_letter(token: &str) -> bool {
    let mut chars = token.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_alphabetic())
}

fn is_isolated_symbol(token: &str) -> bool {
    let mut chars = token.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if !c.is_alphanumeric())
}

// ── Pass 6: isolated symbols ─────────────────────────────────────────────────

/// Drop single non-alphanumeric tokens with whitespace on both sides.
fn drop_isolated_symbols(text: &str) -> String {
    let lead = text.starts_with(char::is_whitespace);
    let trail = text.ends_with(char::is_whitespace);
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let last = tokens.len().saturating_sub(1);
    tokens
        .iter()
        .enumerate()
        .filter(|&(i, t)| {
            let surrounded = (i > 0 || lead) && (i < last || trail);
            !(surrounded && is_isolated_symbol(t))
        })
        .map(|(_, t)| *t)
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Tests ────────────────────────────────────────────────────────────────────
