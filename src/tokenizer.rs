//! Line classifier: one provisional `Token` per source line.
//!
//! Classification is heuristic and ordered — blank, scene heading,
//! transition, character cue, parenthetical, dialogue, action. The state
//! machine in `parser::screenplay` resolves what the provisional kinds mean
//! in context; this module never looks ahead.
//!
//! The cue heuristic is deliberately permissive about what precedes a cue:
//! a new all-caps name may directly follow another cue (zero-line
//! appearance) or a dialogue line (hard speaker switch with no blank
//! separator). Only a parenthetical predecessor forces the line to read as
//! dialogue, since an all-caps line inside a modifier block is shouted
//! delivery, not a new speaker.

use std::sync::LazyLock;

use regex::Regex;

use crate::model::{Token, TokenKind};

/// Scene-heading prefixes checked case-sensitively, in order.
pub const DEFAULT_SCENE_PREFIXES: [&str; 5] = ["INT.", "EXT.", "I/E", "SCENE", "סצנה"];

static TRANSITION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(FADE IN|FADE OUT|CUT TO)[.:]?$").unwrap());

/// Cue extensions that qualify a speaker without changing identity.
static CUE_EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\((V\.O\.|O\.S\.|CONT'D)\)\s*$").unwrap());

/// Trailing markers that promote a cue to a group role.
static GROUP_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\((GROUP|CROWD|ALL)\)\s*$").unwrap());

/// Classify every line of normalized text, in source order.
///
/// Exactly one token is emitted per input line and `line_number` is the
/// 1-based line index, so `tokens.len()` always equals the line count.
pub fn tokenize(text: &str, scene_prefixes: &[String]) -> Vec<Token> {
    let mut tokens = Vec::new();
    // Kind of the last non-blank token, reset at structural boundaries
    let mut prev_kind: Option<TokenKind> = None;
    let mut in_dialogue_block = false;

    for (i, raw) in text.split('\n').enumerate() {
        let trimmed = raw.trim().to_string();
        let kind = classify(&trimmed, scene_prefixes, prev_kind, in_dialogue_block);

        match kind {
            TokenKind::Blank => {
                in_dialogue_block = false;
                prev_kind = Some(TokenKind::Blank);
            }
            TokenKind::SceneHeading | TokenKind::Transition | TokenKind::Action => {
                in_dialogue_block = false;
                prev_kind = Some(kind);
            }
            TokenKind::CharacterCue | TokenKind::Parenthetical | TokenKind::Dialogue => {
                in_dialogue_block = true;
                prev_kind = Some(kind);
            }
        }

        tokens.push(Token {
            line_number: i + 1,
            raw: raw.to_string(),
            trimmed,
            kind,
        });
    }

    tokens
}

fn classify(
    trimmed: &str,
    scene_prefixes: &[String],
    prev: Option<TokenKind>,
    in_dialogue_block: bool,
) -> TokenKind {
    if trimmed.is_empty() {
        return TokenKind::Blank;
    }

    if scene_prefixes.iter().any(|p| trimmed.starts_with(p.as_str())) {
        return TokenKind::SceneHeading;
    }

    if is_transition(trimmed) {
        return TokenKind::Transition;
    }

    if trimmed.starts_with('(') && trimmed.ends_with(')') {
        return TokenKind::Parenthetical;
    }

    if is_cue(trimmed) && prev != Some(TokenKind::Parenthetical) {
        return TokenKind::CharacterCue;
    }

    if in_dialogue_block {
        return TokenKind::Dialogue;
    }

    TokenKind::Action
}

fn is_transition(trimmed: &str) -> bool {
    if TRANSITION.is_match(trimmed) {
        return true;
    }
    trimmed.ends_with("TO:") && is_caps(trimmed)
}

/// All-caps in the unicode sense: at least one alphabetic character and no
/// lowercase ones. Hebrew letters carry no case, so an all-Hebrew cue passes.
fn is_caps(s: &str) -> bool {
    let mut saw_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            saw_alpha = true;
            if c.is_lowercase() {
                return false;
            }
        }
    }
    saw_alpha
}

/// Context-free cue test used by the content-type detector, which has no
/// predecessor information to consult.
pub(crate) fn is_cue_like(trimmed: &str) -> bool {
    is_cue(trimmed)
}

fn is_cue(trimmed: &str) -> bool {
    // Extensions and group markers qualify a cue without disqualifying it
    let base = CUE_EXTENSION.replace(trimmed, "");
    let base = GROUP_MARKER.replace(&base, "");
    let base = base.trim();

    let len = base.chars().count();
    if !(2..=40).contains(&len) {
        return false;
    }
    if base.contains(['.', '!', '?']) {
        return false;
    }
    is_caps(base)
}

/// Strip `(V.O.)`/`(O.S.)`/`(CONT'D)` extensions from a cue. The remainder
/// is the identity-bearing part of the speaker label.
pub fn strip_cue_extensions(cue: &str) -> String {
    CUE_EXTENSION.replace_all(cue, "").trim().to_string()
}

/// Detect and strip a trailing group marker. Returns the base cue and
/// whether a marker was present.
pub fn strip_group_marker(cue: &str) -> (String, bool) {
    if let Some(m) = GROUP_MARKER.find(cue) {
        (cue[..m.start()].trim().to_string(), true)
    } else {
        (cue.trim().to_string(), false)
    }
}
