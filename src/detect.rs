//! Content-type detection: tabular, screenplay, or hybrid.
//!
//! # Detection strategy
//!
//! Detection uses a layered approach, cheapest signal first:
//!
//! 1. **Shape** — input that arrives already row-oriented (headers + rows)
//!    is tabular with no further inspection.
//! 2. **Separator density** — a tabular vote when at least 60% of non-blank
//!    lines carry two or more column separators (tab or `|`).
//! 3. **Screenplay structure** — a screenplay vote when scene-heading-like
//!    lines reach 1% of non-blank lines, or when cue-like all-caps lines
//!    followed by text reach 5%.
//!
//! Both votes clearing their thresholds yields `Hybrid`. Neither clearing
//! defaults to `Screenplay`, which is also the tie-break — screenplay paths
//! supersede tabular within the same document region. The vote is a pure
//! function of the line set, so dispatch is deterministic for identical
//! input.

use crate::model::{ContentKind, DecodedInput};
use crate::tokenizer::{self, DEFAULT_SCENE_PREFIXES};

const TABULAR_RATIO: f64 = 0.60;
const SCENE_RATIO: f64 = 0.01;
const CUE_RATIO: f64 = 0.05;

/// Classify a decoded document.
///
/// `Multi` inputs classify as the union of their members: uniformly tabular
/// or uniformly screenplay collapse to that kind, anything mixed is hybrid.
pub fn detect_content_type(input: &DecodedInput) -> ContentKind {
    match input {
        DecodedInput::Table { .. } => ContentKind::Tabular,
        DecodedInput::Text { text } => detect_text(text),
        DecodedInput::Multi { inputs } => {
            let kinds: Vec<ContentKind> = inputs.iter().map(detect_content_type).collect();
            match (
                kinds.iter().all(|k| *k == ContentKind::Tabular),
                kinds.iter().all(|k| *k == ContentKind::Screenplay),
            ) {
                (true, false) => ContentKind::Tabular,
                (false, true) => ContentKind::Screenplay,
                _ => ContentKind::Hybrid,
            }
        }
    }
}

/// Classify normalized text by line-level votes.
pub fn detect_text(text: &str) -> ContentKind {
    let lines: Vec<&str> = text.split('\n').collect();
    let non_blank: Vec<&str> = lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();
    if non_blank.is_empty() {
        return ContentKind::Screenplay;
    }
    let total = non_blank.len() as f64;

    let separator_lines = non_blank.iter().filter(|l| separator_count(l) >= 2).count();
    let tabular_vote = separator_lines as f64 / total >= TABULAR_RATIO;

    let scene_prefixes: Vec<String> =
        DEFAULT_SCENE_PREFIXES.iter().map(|s| s.to_string()).collect();
    let scene_lines = non_blank
        .iter()
        .filter(|l| scene_prefixes.iter().any(|p| l.starts_with(p.as_str())))
        .count();

    // A cue only votes when something follows it on the next line
    let mut cue_lines = 0usize;
    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || !tokenizer::is_cue_like(trimmed) {
            continue;
        }
        if lines.get(i + 1).is_some_and(|next| !next.trim().is_empty()) {
            cue_lines += 1;
        }
    }

    let screenplay_vote = (scene_lines >= 1 && scene_lines as f64 / total >= SCENE_RATIO)
        || cue_lines as f64 / total >= CUE_RATIO;

    match (tabular_vote, screenplay_vote) {
        (true, true) => ContentKind::Hybrid,
        (true, false) => ContentKind::Tabular,
        _ => ContentKind::Screenplay,
    }
}

fn separator_count(line: &str) -> usize {
    line.chars().filter(|&c| c == '\t' || c == '|').count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_input_is_tabular() {
        let input = DecodedInput::Table {
            sheet_name: None,
            headers: vec!["Role".into()],
            rows: vec![],
        };
        assert_eq!(detect_content_type(&input), ContentKind::Tabular);
    }

    #[test]
    fn test_screenplay_text() {
        let text = "INT. ROOM - DAY\nJOHN\nHello.\nMARY\nHi.";
        assert_eq!(detect_text(text), ContentKind::Screenplay);
    }

    #[test]
    fn test_tabular_text() {
        let text = "TC\tRole\tText\n00:00:01\tJOHN\thi\n00:00:02\tMARY\they";
        assert_eq!(detect_text(text), ContentKind::Tabular);
    }

    #[test]
    fn test_hybrid_text() {
        let text = "INT. STUDIO - DAY\nTC\tRole\tText\n00:00:01\tJOHN\thi\n00:00:02\tMARY\they";
        assert_eq!(detect_text(text), ContentKind::Hybrid);
    }

    #[test]
    fn test_empty_defaults_to_screenplay() {
        assert_eq!(detect_text(""), ContentKind::Screenplay);
        assert_eq!(detect_text("\n\n"), ContentKind::Screenplay);
    }

    #[test]
    fn test_plain_prose_defaults_to_screenplay() {
        let text = "just a paragraph of notes\nwith no structure at all";
        assert_eq!(detect_text(text), ContentKind::Screenplay);
    }

    #[test]
    fn test_multi_mixed_is_hybrid() {
        let input = DecodedInput::Multi {
            inputs: vec![
                DecodedInput::Text {
                    text: "INT. ROOM - DAY\nJOHN\nHello.".into(),
                },
                DecodedInput::Table {
                    sheet_name: None,
                    headers: vec!["Role".into()],
                    rows: vec![],
                },
            ],
        };
        assert_eq!(detect_content_type(&input), ContentKind::Hybrid);
    }

    #[test]
    fn test_deterministic() {
        let text = "INT. A\nJOHN\nHi.\nA\tB\tC";
        let first = detect_text(text);
        for _ in 0..3 {
            assert_eq!(detect_text(text), first);
        }
    }
}
