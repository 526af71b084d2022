//! Markdown rendering of annotation records and their summaries.

use crate::config::ColorConfig;
use crate::output::{AnnotationKind, AnnotationRecord};
use serde::Serialize;
use tracing::warn;

/// Document heading.
pub const HEADER: &str = "# Annotations";

/// Whether `record` is one of the highlights sent for summarisation.
pub fn wants_summary(record: &AnnotationRecord, colors: &ColorConfig) -> bool {
    record.kind() == AnnotationKind::Highlight && colors.is_summary_color(record.color())
}

/// Texts to summarise, in record order.
pub fn summary_candidates(records: &[AnnotationRecord], colors: &ColorConfig) -> Vec<String> {
    records
        .iter()
        .filter(|r| wants_summary(r, colors))
        .map(|r| r.content().to_string())
        .collect()
}

/// Render every record, in order, under the `# Annotations` heading.
///
/// `summaries` are consumed front to back by the records that
/// [`wants_summary`]; once they run out those records render as plain
/// quotes.
pub fn render(
    records: &[AnnotationRecord],
    summaries: &[String],
    colors: &ColorConfig,
) -> String {
    let mut pending = summaries.iter();
    let blocks: Vec<String> = records
        .iter()
        .map(|record| {
            let summary = if wants_summary(record, colors) {
                pending.next()
            } else {
                None
            };
            render_block(record, summary)
        })
        .collect();

    let leftover = pending.count();
    if leftover > 0 {
        warn!("{} summaries had no matching highlight", leftover);
    }
    format!("{HEADER}\n\n{}", blocks.concat())
}

/// One record as a Markdown block, trailing blank line included.
fn render_block(record: &AnnotationRecord, summary: Option<&String>) -> String {
    let page = record.page();
    match (record.kind(), summary) {
        (AnnotationKind::Highlight, Some(summary)) => format!(
            "- **Highlight on Page {page} (Summarized)**\n{}\n\n",
            summary.trim_end()
        ),
        (AnnotationKind::Highlight, None) => format!("> {} (p. {page})\n\n", record.content()),
        (AnnotationKind::HighlightWithComment, _) => {
            let (highlighted, comment) = record
                .comment_parts()
                .unwrap_or((record.content(), ""));
            format!(
                "- **Highlight Comment on Page {page}**\n- Comment: {comment}\n> {highlighted} (p. {page})\n\n"
            )
        }
        (AnnotationKind::Note, _) => {
            format!("- **Note on Page {page}**\n- {}\n\n", record.content())
        }
        (AnnotationKind::FreeTextComment, _) => {
            format!("- **Comment on Page {page}**\n- {}\n\n", record.content())
        }
    }
}

#[derive(Serialize)]
struct FrontMatter<'a> {
    #[serde(rename = "TITLE")]
    title: &'a str,
}

/// YAML front matter carrying the document title, or an empty string
/// when there is no usable title.
pub fn front_matter(title: Option<&str>) -> String {
    let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) else {
        return String::new();
    };
    match serde_yaml::to_string(&FrontMatter { title }) {
        Ok(yaml) => format!("---\n{}---\n\n", yaml.trim_start_matches("---\n")),
        Err(e) => {
            warn!("Could not serialise title front matter: {}", e);
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn colors() -> ColorConfig {
        ColorConfig::default()
    }

    fn highlight(page: i64, text: &str, color: &str) -> AnnotationRecord {
        AnnotationRecord::new(page, AnnotationKind::Highlight, text, color)
    }

    #[test]
    fn summarised_highlight_block() {
        let records = vec![highlight(1, "biological process", "#92e1fb")];
        let md = render(&records, &["- point one".to_string()], &colors());
        assert_eq!(
            md,
            "# Annotations\n\n- **Highlight on Page 1 (Summarized)**\n- point one\n\n"
        );
    }

    #[test]
    fn non_summary_colour_is_quoted_and_consumes_nothing() {
        let records = vec![
            highlight(2, "yellow text", "#ffff00"),
            highlight(3, "blue text", "#69aff0"),
        ];
        let md = render(&records, &["S".to_string()], &colors());
        assert!(md.contains("> yellow text (p. 2)\n\n"));
        assert!(md.contains("- **Highlight on Page 3 (Summarized)**\nS\n\n"));
    }

    #[test]
    fn surplus_summaries_are_ignored() {
        let records = vec![highlight(5, "only one", "#92e1fb")];
        let md = render(&records, &["S1".to_string(), "S2".to_string()], &colors());
        assert_eq!(
            md,
            "# Annotations\n\n- **Highlight on Page 5 (Summarized)**\nS1\n\n"
        );
    }

    #[test]
    fn missing_summaries_fall_back_to_quotes() {
        let records = vec![
            highlight(1, "first", "#92e1fb"),
            highlight(1, "second", "#92e1fb"),
        ];
        let md = render(&records, &["only one".to_string()], &colors());
        assert!(md.contains("(Summarized)**\nonly one"));
        assert!(md.contains("> second (p. 1)"));
    }

    #[test]
    fn comment_note_and_free_text_blocks() {
        let records = vec![
            AnnotationRecord::highlight_with_comment(4, "span", "why?", "#92e1fb"),
            AnnotationRecord::new(5, AnnotationKind::Note, "sticky", "#ffff00"),
            AnnotationRecord::new(6, AnnotationKind::FreeTextComment, "typed", "#000000"),
        ];
        let md = render(&records, &["unused".to_string()], &colors());
        assert_eq!(
            md,
            "# Annotations\n\n\
             - **Highlight Comment on Page 4**\n- Comment: why?\n> span (p. 4)\n\n\
             - **Note on Page 5**\n- sticky\n\n\
             - **Comment on Page 6**\n- typed\n\n"
        );
    }

    #[test]
    fn candidates_only_plain_highlights_in_summary_colours() {
        let records = vec![
            highlight(1, "a", "#92e1fb"),
            AnnotationRecord::highlight_with_comment(1, "b", "c", "#92e1fb"),
            highlight(2, "d", "#ff0000"),
            highlight(3, "e", "#69AFF0"),
        ];
        assert_eq!(summary_candidates(&records, &colors()), vec!["a", "e"]);
    }

    #[test]
    fn empty_records_render_header_only() {
        assert_eq!(render(&[], &[], &colors()), "# Annotations\n\n");
    }

    #[test]
    fn front_matter_with_title() {
        assert_eq!(
            front_matter(Some("Deep Learning")),
            "---\nTITLE: Deep Learning\n---\n\n"
        );
    }

    #[test]
    fn front_matter_quotes_when_needed() {
        let fm = front_matter(Some("Cells: a review"));
        assert!(fm.starts_with("---\nTITLE: "));
        assert!(fm.contains("'Cells: a review'") || fm.contains("\"Cells: a review\""));
    }

    #[test]
    fn no_front_matter_without_title() {
        assert_eq!(front_matter(None), "");
        assert_eq!(front_matter(Some("   ")), "");
    }
}
