//! Lexical cleanup of raw script text and the shared name-normalization key.
//!
//! # Architecture overview
//!
//! Every text document passes through `normalize_text` exactly once before
//! detection and tokenization. The cleanup is idempotent — running it on its
//! own output changes nothing — so callers never need to track whether a
//! string has already been normalized.
//!
//! `normalize_name` lives here rather than in the aggregator because it is
//! the identity key everywhere: the aggregator groups by it, the conflict
//! extractor orders pairs by it, and the applier joins bundle characters to
//! `project_roles.role_name_normalized` with it.
//!
//! # TRADE-OFFS
//!
//! Inline speaker expansion (`JOHN: Hello.` → cue line + dialogue line) is
//! skipped when the dialogue remainder itself reads as an inline cue. That
//! leaves a rare double-cue line unexpanded, but it is what makes the pass
//! idempotent and keeps the output bounded at two lines per input line.

use std::sync::LazyLock;

use regex::Regex;

/// Latin inline cue: all-caps name, a colon, then dialogue on the same line.
static INLINE_CUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Z0-9 .\-'/]{2,40}):\s+(.+)$").unwrap());

/// Hebrew inline cue. Hebrew has no letter case, so the class is membership
/// rather than uppercase; at least two Hebrew letters are required before the
/// colon for the match to count as a cue.
static INLINE_CUE_HEBREW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([\p{Hebrew}0-9 .\-'/]{2,40}):\s+(.+)$").unwrap());

/// Clean raw script text into the canonical form consumed by the tokenizer.
///
/// Guarantees:
/// - bidi controls (U+200E, U+200F, U+202A–U+202E), zero-width marks and the
///   BOM are removed
/// - `\r\n` and `\r` become `\n`; runs of blank lines collapse to one
/// - inline speaker-colon cues split into a cue line and a dialogue line
/// - trailing whitespace is trimmed from every line
/// - `normalize_text(normalize_text(x)) == normalize_text(x)`
/// - output has at most `2 * input_lines + 1` lines
pub fn normalize_text(raw: &str) -> String {
    let cleaned = strip_invisible(raw);
    let unified = cleaned.replace("\r\n", "\n").replace('\r', "\n");

    let mut out: Vec<String> = Vec::new();
    for line in unified.split('\n') {
        match expand_inline_cue(line) {
            Some((cue, dialogue)) => {
                out.push(cue);
                out.push(dialogue);
            }
            None => out.push(line.trim_end().to_string()),
        }
    }

    collapse_blank_runs(out).join("\n")
}

fn strip_invisible(s: &str) -> String {
    s.chars()
        .filter(|&c| {
            !matches!(
                c,
                '\u{FEFF}'
                    | '\u{200B}'
                    | '\u{200C}'
                    | '\u{200D}'
                    | '\u{200E}'
                    | '\u{200F}'
                    | '\u{202A}'..='\u{202E}'
            )
        })
        .collect()
}

/// Split `NAME: dialogue` into `(NAME, dialogue)` when the prefix reads as a
/// speaker cue and the remainder does not. The remainder check is what keeps
/// the whole pass idempotent: a produced dialogue line can never be split
/// again on a later run.
fn expand_inline_cue(line: &str) -> Option<(String, String)> {
    let caps = INLINE_CUE
        .captures(line)
        .or_else(|| INLINE_CUE_HEBREW.captures(line))?;
    let cue = caps.get(1)?.as_str().trim();
    let rest = caps.get(2)?.as_str().trim_end();

    if cue.chars().filter(|c| c.is_alphabetic()).count() < 2 {
        return None;
    }
    if INLINE_CUE.is_match(rest) || INLINE_CUE_HEBREW.is_match(rest) {
        return None;
    }
    Some((cue.to_string(), rest.to_string()))
}

fn collapse_blank_runs(lines: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(lines.len());
    let mut prev_blank = false;
    for line in lines {
        let blank = line.trim().is_empty();
        if blank && prev_blank {
            continue;
        }
        prev_blank = blank;
        // Blank lines carry no content worth preserving
        out.push(if blank { String::new() } else { line });
    }
    out
}

/// Compute the canonical identity key for a speaker or role name.
///
/// Uppercase, strip everything that is neither alphanumeric nor a space,
/// collapse whitespace, then drop a leading honorific from the closed list
/// {MR, MRS, MS, DR}. Punctuation is removed outright, so `V.O.` keys as
/// `VO`. Returns an empty string only for input with no alphanumeric content
/// at all — callers treat that as "no name".
pub fn normalize_name(raw: &str) -> String {
    let upper = raw.to_uppercase();
    let stripped: String = upper
        .chars()
        .filter(|&c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    strip_honorific(&collapsed)
}

const HONORIFICS: [&str; 4] = ["MR", "MRS", "MS", "DR"];

fn strip_honorific(name: &str) -> String {
    if let Some((first, rest)) = name.split_once(' ')
        && HONORIFICS.contains(&first)
        && !rest.is_empty()
    {
        return rest.to_string();
    }
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_bidi_and_bom() {
        let input = "\u{FEFF}JOHN\u{200E}\n\u{202B}Hello\u{202C}";
        assert_eq!(normalize_text(input), "JOHN\nHello");
    }

    #[test]
    fn test_unifies_newlines() {
        assert_eq!(normalize_text("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_collapses_blank_runs() {
        assert_eq!(normalize_text("a\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_trims_trailing_spaces() {
        assert_eq!(normalize_text("JOHN   \nHello.  "), "JOHN\nHello.");
    }

    #[test]
    fn test_expands_inline_cue() {
        assert_eq!(normalize_text("JOHN: Hello there."), "JOHN\nHello there.");
    }

    #[test]
    fn test_expands_hebrew_inline_cue() {
        assert_eq!(normalize_text("יוסי: שלום"), "יוסי\nשלום");
    }

    #[test]
    fn test_does_not_expand_lowercase_prefix() {
        let input = "Note: this is not a cue";
        assert_eq!(normalize_text(input), input);
    }

    #[test]
    fn test_does_not_expand_when_remainder_is_cue_like() {
        // Splitting here would make a second pass split again
        let input = "JOHN: GO HOME: NOW";
        assert_eq!(normalize_text(input), input);
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "JOHN: Hello.\r\n\r\n\r\nMARY: Hi.  ",
            "\u{FEFF}INT. ROOM - DAY\nJOHN\nHello.",
            "JOHN: GO HOME: NOW",
            "",
            "\n\n\n",
        ];
        for input in inputs {
            let once = normalize_text(input);
            assert_eq!(normalize_text(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn test_bounded_expansion() {
        let input = "A: x\nB: y\nC: z\nplain\n\n";
        let in_lines = input.split('\n').count();
        let out_lines = normalize_text(input).split('\n').count();
        assert!(out_lines <= 2 * in_lines + 1);
    }

    #[test]
    fn test_normalize_name_basic() {
        assert_eq!(normalize_name("  John  Smith "), "JOHN SMITH");
        assert_eq!(normalize_name("O'Brien"), "OBRIEN");
        assert_eq!(normalize_name("Sarah V.O."), "SARAH VO");
        assert_eq!(normalize_name("MR. SMITH"), "SMITH");
        assert_eq!(normalize_name("Dr. Cohen"), "COHEN");
    }

    #[test]
    fn test_normalize_name_honorific_alone_survives() {
        // A bare honorific is a name, not a prefix to strip
        assert_eq!(normalize_name("MR."), "MR");
    }

    #[test]
    fn test_normalize_name_hebrew() {
        assert_eq!(normalize_name(" יוסי "), "יוסי");
    }

    #[test]
    fn test_normalize_name_empty_for_punctuation_only() {
        assert_eq!(normalize_name("!!!"), "");
    }
}
