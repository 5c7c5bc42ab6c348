//! Deterministic text normalization: ingestion-safe whitespace and
//! repeated-line cleanup. No external calls; purely a function of its
//! input.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static ZERO_WIDTH: Lazy<Regex> =
    Lazy::new(|| Regex::new("[\u{200b}\u{200c}\u{200d}\u{feff}]").unwrap());
static SOFT_HYPHEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w)-\n(\w)").unwrap());
static INLINE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\S\n]+").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizationResult {
    pub normalized_text: String,
    pub removed_repeated_line_count: usize,
    pub collapsed_whitespace_count: usize,
}

/// Normalizes `text` in place, in the fixed order spec §4.1 names:
/// line-ending normalization, zero-width stripping, soft-hyphen joining,
/// whitespace collapse, optional repeated-short-line removal, and
/// blank-line collapse.
pub fn normalize(text: &str, max_blank_lines: usize, remove_repeated_short_lines: bool) -> NormalizationResult {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let normalized = ZERO_WIDTH.replace_all(&normalized, "").into_owned();
    let normalized = SOFT_HYPHEN.replace_all(&normalized, "$1$2").into_owned();

    let collapsed_whitespace_count = INLINE_WHITESPACE.find_iter(&normalized).count();
    let normalized = INLINE_WHITESPACE.replace_all(&normalized, " ").into_owned();

    let mut lines: Vec<String> = normalized.split('\n').map(|l| l.trim().to_string()).collect();

    let mut removed_repeated_line_count = 0usize;
    if remove_repeated_short_lines {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for line in lines.iter().filter(|l| !l.is_empty() && l.len() <= 100) {
            *counts.entry(line.as_str()).or_insert(0) += 1;
        }
        let repeated: std::collections::HashSet<String> = counts
            .into_iter()
            .filter(|(_, count)| *count >= 3)
            .map(|(line, _)| line.to_string())
            .collect();

        if !repeated.is_empty() {
            let mut filtered = Vec::with_capacity(lines.len());
            for line in lines.into_iter() {
                if repeated.contains(&line) {
                    removed_repeated_line_count += 1;
                    continue;
                }
                filtered.push(line);
            }
            lines = filtered;
        }
    }

    let mut compacted: Vec<String> = Vec::with_capacity(lines.len());
    let mut blank_count = 0usize;
    for line in lines {
        if !line.is_empty() {
            blank_count = 0;
            compacted.push(line);
            continue;
        }
        blank_count += 1;
        if blank_count <= max_blank_lines {
            compacted.push(String::new());
        }
    }

    let normalized_text = compacted.join("\n").trim().to_string();

    NormalizationResult {
        normalized_text,
        removed_repeated_line_count,
        collapsed_whitespace_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizer_cleanup_scenario() {
        let input = "Header\nHeader\nHeader\nClause   A    starts here.\n\n\nClause B.";
        let result = normalize(input, 1, true);

        assert!(!result.normalized_text.contains("Header"));
        assert!(result.normalized_text.contains("Clause A starts here."));
        assert_eq!(result.removed_repeated_line_count, 3);
        assert!(!result.normalized_text.contains("\n\n\n"));
    }

    #[test]
    fn idempotent_on_already_normalized_text() {
        let first = normalize("Clause A starts here.\n\nClause B.", 1, true);
        let second = normalize(&first.normalized_text, 1, true);

        assert_eq!(second.normalized_text, first.normalized_text);
        assert_eq!(second.removed_repeated_line_count, 0);
        assert_eq!(second.collapsed_whitespace_count, 0);
    }

    #[test]
    fn joins_soft_hyphenated_line_breaks() {
        let result = normalize("infor-\nmation is here", 1, false);
        assert!(result.normalized_text.contains("information is here"));
    }

    #[test]
    fn strips_zero_width_characters() {
        let result = normalize("hel\u{200b}lo", 1, false);
        assert_eq!(result.normalized_text, "hello");
    }

    #[test]
    fn collapses_blank_line_runs_to_limit() {
        let result = normalize("A\n\n\n\n\nB", 0, false);
        assert_eq!(result.normalized_text, "A\nB");
    }
}
