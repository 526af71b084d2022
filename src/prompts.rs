//! Prompts for highlight summarisation.
//!
//! Callers can override the default via `prompts.summarization` in
//! [`crate::config::AnnotationConfig`]; the constant here is used only when
//! no override is provided.

/// Default instruction prefixed to every highlight sent to the provider.
///
/// Highlights from scientific papers frequently carry citations such as
/// "(Smith et al., 2019)"; the prompt asks the model to keep them so the
/// summary can still be traced back to the literature.
pub const DEFAULT_SUMMARY_PROMPT: &str = "Please, explain the following to me in bullet points. \
Make sure to keep scientific references if they are present in the text!";

/// Build the full prompt for one highlight.
pub fn summary_prompt(template: &str, text: &str) -> String {
    format!("{}\n\n{}", template.trim_end(), text)
}
