//! Citation handling (spec §4.8): extracting which source ids an answer
//! actually cites, and stripping the inline `[S3]`/`【S3】` markers back out
//! of the answer text shown to the user.
//!
//! Grounded in `citation_parser.py::CitationParser.extract` and
//! `chat_service.py::_strip_inline_source_tags`.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

static CITATION_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\[【](S\d+)[\]】]").unwrap());
static INLINE_CITATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*[\[【](S\d+)[\]】]\s*").unwrap());

/// Returns the source ids cited in `answer`, in first-seen order,
/// filtered to `available_source_ids`.
pub fn extract_citations(answer: &str, available_source_ids: &[String]) -> Vec<String> {
    let available: HashSet<&str> = available_source_ids.iter().map(|s| s.as_str()).collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut ordered = Vec::new();

    for capture in CITATION_TAG.captures_iter(answer) {
        let source_id = capture[1].to_string();
        if !available.contains(source_id.as_str()) {
            continue;
        }
        if seen.insert(source_id.clone()) {
            ordered.push(source_id);
        }
    }

    ordered
}

/// Strips inline `[S3]`/`【S3】` markers from `answer`, collapsing the
/// surrounding whitespace each left behind and dropping blank lines.
pub fn strip_inline_citations(answer: &str) -> String {
    let without_tags = INLINE_CITATION.replace_all(answer, " ");

    without_tags
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_in_first_seen_order_and_dedups() {
        let answer = "Per [S2] and [S1], also see [S2] again.";
        let available = vec!["S1".to_string(), "S2".to_string(), "S3".to_string()];
        assert_eq!(extract_citations(answer, &available), vec!["S2", "S1"]);
    }

    #[test]
    fn filters_out_ids_not_available() {
        let answer = "See [S9] for details.";
        let available = vec!["S1".to_string()];
        assert!(extract_citations(answer, &available).is_empty());
    }

    #[test]
    fn supports_fullwidth_brackets() {
        let answer = "参照【S1】。";
        let available = vec!["S1".to_string()];
        assert_eq!(extract_citations(answer, &available), vec!["S1"]);
    }

    #[test]
    fn strips_markers_and_collapses_whitespace() {
        let answer = "The sky is blue [S1] and  the grass is green [S2].";
        let stripped = strip_inline_citations(answer);
        assert_eq!(stripped, "The sky is blue and the grass is green .");
    }

    #[test]
    fn drops_blank_lines_left_by_a_citation_only_paragraph() {
        let answer = "Intro line.\n\n[S1]\n\nConclusion line.";
        let stripped = strip_inline_citations(answer);
        assert_eq!(stripped, "Intro line. Conclusion line.");
    }
}
