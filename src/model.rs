//! Core model types for the rolecall ingestion pipeline.
//!
//! # Architecture overview
//!
//! Rolecall converts heterogeneous dialogue-script documents (plain text,
//! screenplay-formatted text, separator-delimited tables, rows extracted from
//! spreadsheets) into a unified casting model before anything touches the
//! database. This module defines that model — the bundle layer.
//!
//! ```text
//! Input (text/rows) → Detector → Parser → ParseBundle → Formatter / Applier
//! ```
//!
//! # Design philosophy
//!
//! Each source format has wildly different conventions for naming speakers and
//! marking structure. Rather than letting the applier or the formatters know
//! about every format's quirks, parsers normalize everything into this shared
//! bundle. Downstream code only needs to understand the bundle, not the raw
//! documents.
//!
//! # TRADE-OFFS
//!
//! - `DecodedInput` and `UserEdit` use tagged enums to allow heterogeneous
//!   shapes without boxing. All variants must be known at compile time —
//!   adding a new input kind requires touching this file and every exhaustive
//!   match on it.
//! - `Character.scenes_present` and `ConflictPair.scenes` are `BTreeSet<usize>`
//!   rather than `HashSet` so that serialization order is stable and two runs
//!   over identical input produce byte-identical bundles.
//! - `replica_count` is `u32` rather than `Option<u32>` — cue-only appearances
//!   simply count zero, so formatters never handle a missing count.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Provisional classification of a single source line.
///
/// WHY: The tokenizer assigns one kind per line so the screenplay state
/// machine can be written as an exhaustive match over `(state, kind)` pairs
/// instead of re-inspecting line content at every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Blank,
    SceneHeading,
    CharacterCue,
    Parenthetical,
    Dialogue,
    Action,
    Transition,
}

/// One classified source line. Immutable after tokenization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// 1-based line index in the normalized text.
    pub line_number: usize,
    pub raw: String,
    pub trimmed: String,
    pub kind: TokenKind,
}

/// Document classification produced by the content-type detector.
///
/// `Hybrid` means both the tabular and the screenplay heuristics cleared
/// their thresholds; screenplay parsing supersedes tabular within any
/// region that reads as both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Tabular,
    Screenplay,
    Hybrid,
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentKind::Tabular => write!(f, "tabular"),
            ContentKind::Screenplay => write!(f, "screenplay"),
            ContentKind::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// A region of the script delimited by scene headings.
///
/// Scene 0 is synthetic when the document opens with content before any
/// heading; otherwise the first heading opens scene 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    pub index: usize,
    /// Heading text, absent for the synthetic opening scene.
    pub heading: Option<String>,
    /// 1-based line of the first token belonging to this scene.
    pub start_line: usize,
}

/// A speaker cue together with the dialogue block attributed to it.
///
/// WHY: The state machine emits these as flat events so the aggregator can
/// group them by normalized key without knowing anything about scenes or
/// token order. `dialogue_lines` may be empty — a cue immediately followed
/// by a blank line still marks scene presence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDialogue {
    /// Scene the cue appeared in. `None` for tabular rows, which carry no
    /// scene structure and therefore never contribute co-appearance pairs.
    pub scene_index: Option<usize>,
    pub speaker_raw: String,
    /// Uppercased, punctuation-stripped, whitespace-collapsed identity key.
    /// Never empty.
    pub speaker_normalized: String,
    pub dialogue_lines: Vec<String>,
    /// 1-based line of the cue.
    pub cue_line: usize,
    /// Set when the cue carried a `(GROUP)`/`(CROWD)`/`(ALL)` marker.
    pub group: bool,
}

/// How a character relates to the rest of the cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharacterKind {
    Regular,
    Group,
    Variant,
}

/// An aggregated character, keyed by its normalized name.
///
/// Invariants: `replica_count` equals the sum of dialogue lines over every
/// `RawDialogue` folded into this character; a `Variant` always names a
/// parent that exists in the same bundle and is itself never a variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    /// Most frequent surface form; first-seen breaks ties.
    pub display_name: String,
    /// Unique identity key within a bundle.
    pub normalized_name: String,
    pub replica_count: u32,
    /// Every distinct surface form observed, in first-seen order.
    pub variants: Vec<String>,
    pub kind: CharacterKind,
    /// Only set when `kind == Variant`.
    pub parent_normalized_name: Option<String>,
    pub scenes_present: BTreeSet<usize>,
}

/// An unordered pair of characters sharing at least one scene.
///
/// Canonical form: `a < b` lexicographically, `scenes` non-empty. The same
/// actor cannot be cast to both sides of a pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictPair {
    pub a: String,
    pub b: String,
    pub scenes: BTreeSet<usize>,
}

impl ConflictPair {
    /// Build a canonicalized pair, ordering the endpoints.
    pub fn new(x: &str, y: &str) -> ConflictPair {
        let (a, b) = if x <= y { (x, y) } else { (y, x) };
        ConflictPair {
            a: a.to_string(),
            b: b.to_string(),
            scenes: BTreeSet::new(),
        }
    }
}

/// Recording status of a tabular script line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecStatus {
    Recorded,
    NotRecorded,
    Optional,
}

impl RecStatus {
    /// Parse a cell value into a status, `None` for anything unrecognized.
    ///
    /// Accepts the English forms plus the Hebrew spreadsheet conventions
    /// (`הוקלט` recorded, `לא הוקלט` not recorded, `אופציונלי` optional).
    pub fn parse(s: &str) -> Option<RecStatus> {
        let t = s.trim().to_lowercase();
        match t.as_str() {
            "recorded" | "rec" | "yes" | "v" | "הוקלט" => Some(RecStatus::Recorded),
            "not_recorded" | "not recorded" | "no" | "x" | "לא הוקלט" => {
                Some(RecStatus::NotRecorded)
            }
            "optional" | "opt" | "אופציונלי" => Some(RecStatus::Optional),
            _ => None,
        }
    }
}

/// One projected row from a tabular script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptLine {
    /// Strictly increasing across the produced lines, starting at 1.
    pub line_number: usize,
    pub role_name: String,
    /// Validated `H:MM:SS` or `H:MM:SS:FF`; invalid values are dropped to
    /// `None` with a warning rather than rejecting the row.
    pub timecode: Option<String>,
    pub source_text: Option<String>,
    pub translation: Option<String>,
    pub rec_status: Option<RecStatus>,
    pub notes: Option<String>,
}

/// Column assignment for tabular parsing, by header name.
///
/// Produced by `auto_detect_columns` or supplied by the caller. Every named
/// column must exist in the headers; `role_name` is mandatory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub role_name: String,
    pub timecode: Option<String>,
    pub source_text: Option<String>,
    pub translation: Option<String>,
    pub rec_status: Option<String>,
    pub notes: Option<String>,
}

/// A spreadsheet cell as delivered by external decoders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Str(String),
    Num(f64),
    Null,
}

impl Cell {
    /// Render the cell as trimmed text; numbers drop a trailing `.0`.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Str(s) => {
                let t = s.trim();
                if t.is_empty() { None } else { Some(t.to_string()) }
            }
            Cell::Num(n) => {
                if n.fract() == 0.0 {
                    Some(format!("{}", *n as i64))
                } else {
                    Some(format!("{n}"))
                }
            }
            Cell::Null => None,
        }
    }
}

/// Decoded document shape handed to the pipeline.
///
/// WHY: Raw decoding (PDF→text, DOCX→text, XLSX→rows) happens outside the
/// pipeline. A closed enum plus a single dispatch function in `parser`
/// replaces per-format subclassing — every consumer matches exhaustively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecodedInput {
    Text {
        text: String,
    },
    Table {
        sheet_name: Option<String>,
        headers: Vec<String>,
        rows: Vec<HashMap<String, Cell>>,
    },
    Multi {
        inputs: Vec<DecodedInput>,
    },
}

/// A user correction applied to a bundle before it is committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserEdit {
    /// Fold `sources` into `primary`, re-pointing conflicts and variants.
    Merge {
        sources: Vec<String>,
        primary: String,
    },
    /// Remove a character and every conflict touching it.
    Delete { target: String },
    /// Change the display name; the identity key is recomputed from it.
    Rename { target: String, new_display: String },
}

/// Diagnostic severity. `Error` means a stage produced no (or partial)
/// output; `Warning` and `Info` never suppress output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Where in the source a diagnostic points, when known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

/// A single accumulated diagnostic. Never thrown — stages record and
/// continue, and the caller always receives data plus diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl Diagnostic {
    pub fn error(code: &str, message: impl Into<String>) -> Diagnostic {
        Diagnostic {
            severity: Severity::Error,
            code: code.to_string(),
            message: message.into(),
            location: None,
        }
    }

    pub fn warning(code: &str, message: impl Into<String>) -> Diagnostic {
        Diagnostic {
            severity: Severity::Warning,
            code: code.to_string(),
            message: message.into(),
            location: None,
        }
    }

    pub fn info(code: &str, message: impl Into<String>) -> Diagnostic {
        Diagnostic {
            severity: Severity::Info,
            code: code.to_string(),
            message: message.into(),
            location: None,
        }
    }

    pub fn at_line(mut self, line: usize) -> Diagnostic {
        self.location.get_or_insert_with(Location::default).line = Some(line);
        self
    }

    pub fn in_file(mut self, file: impl Into<String>) -> Diagnostic {
        self.location.get_or_insert_with(Location::default).file = Some(file.into());
        self
    }
}

/// Stable diagnostic codes shared across stages.
pub mod codes {
    pub const MISSING_ROLE_COLUMN: &str = "MISSING_ROLE_COLUMN";
    pub const UNKNOWN_COLUMN: &str = "UNKNOWN_COLUMN";
    pub const BAD_TIMECODE: &str = "BAD_TIMECODE";
    pub const EMPTY_ROLE: &str = "EMPTY_ROLE";
    pub const ORPHAN_DIALOGUE: &str = "ORPHAN_DIALOGUE";
    pub const UNTERMINATED_BLOCK: &str = "UNTERMINATED_BLOCK";
    pub const SCENE_CAST_CAPPED: &str = "SCENE_CAST_CAPPED";
    pub const CANCELLED: &str = "CANCELLED";
    pub const UNKNOWN_EDIT_TARGET: &str = "UNKNOWN_EDIT_TARGET";
    pub const SCRIPT_ALREADY_INGESTED: &str = "SCRIPT_ALREADY_INGESTED";
}

/// Bundle-level metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMetadata {
    /// Sum of `replica_count` over every character.
    pub total_replicas: u32,
    /// Caller-provided labels for the documents that fed this bundle.
    pub source_files: Vec<String>,
}

/// The aggregated parser output for one or more documents processed together.
///
/// Characters keep first-insertion order so reruns are byte-identical; the
/// `character` / `character_mut` accessors do the key lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseBundle {
    pub characters: Vec<Character>,
    pub conflicts: Vec<ConflictPair>,
    pub script_lines: Vec<ScriptLine>,
    pub metadata: BundleMetadata,
    pub diagnostics: Vec<Diagnostic>,
}

impl ParseBundle {
    pub fn character(&self, normalized: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.normalized_name == normalized)
    }

    pub fn character_mut(&mut self, normalized: &str) -> Option<&mut Character> {
        self.characters
            .iter_mut()
            .find(|c| c.normalized_name == normalized)
    }

    /// Recompute `metadata.total_replicas` after any mutation of the cast.
    pub fn refresh_totals(&mut self) {
        self.metadata.total_replicas = self.characters.iter().map(|c| c.replica_count).sum();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_pair_orders_endpoints() {
        let p = ConflictPair::new("MARY", "JOHN");
        assert_eq!(p.a, "JOHN");
        assert_eq!(p.b, "MARY");
    }

    #[test]
    fn test_token_kind_serde_roundtrip() {
        let json = serde_json::to_string(&TokenKind::SceneHeading).unwrap();
        assert_eq!(json, "\"scene_heading\"");
        let parsed: TokenKind = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, TokenKind::SceneHeading);
    }

    #[test]
    fn test_user_edit_serde_roundtrip() {
        let edit = UserEdit::Merge {
            sources: vec!["SARAH OLDER".to_string()],
            primary: "SARAH".to_string(),
        };
        let json = serde_json::to_string(&edit).unwrap();
        assert!(json.contains("\"type\":\"merge\""));
        let parsed: UserEdit = serde_json::from_str(&json).unwrap();
        if let UserEdit::Merge { sources, primary } = parsed {
            assert_eq!(sources, vec!["SARAH OLDER"]);
            assert_eq!(primary, "SARAH");
        } else {
            panic!("expected Merge variant");
        }
    }

    #[test]
    fn test_cell_as_text() {
        assert_eq!(Cell::Str("  hi ".into()).as_text().as_deref(), Some("hi"));
        assert_eq!(Cell::Str("   ".into()).as_text(), None);
        assert_eq!(Cell::Num(3.0).as_text().as_deref(), Some("3"));
        assert_eq!(Cell::Num(1.5).as_text().as_deref(), Some("1.5"));
        assert_eq!(Cell::Null.as_text(), None);
    }

    #[test]
    fn test_cell_untagged_deserialize() {
        let cells: Vec<Cell> = serde_json::from_str(r#"["JOHN", 42, null]"#).unwrap();
        assert_eq!(cells[0], Cell::Str("JOHN".into()));
        assert_eq!(cells[1], Cell::Num(42.0));
        assert_eq!(cells[2], Cell::Null);
    }

    #[test]
    fn test_rec_status_parse() {
        assert_eq!(RecStatus::parse("Recorded"), Some(RecStatus::Recorded));
        assert_eq!(RecStatus::parse("הוקלט"), Some(RecStatus::Recorded));
        assert_eq!(RecStatus::parse("לא הוקלט"), Some(RecStatus::NotRecorded));
        assert_eq!(RecStatus::parse("opt"), Some(RecStatus::Optional));
        assert_eq!(RecStatus::parse("maybe"), None);
    }

    #[test]
    fn test_diagnostic_location_builder() {
        let d = Diagnostic::warning(codes::BAD_TIMECODE, "bad tc")
            .at_line(7)
            .in_file("ep1.tsv");
        let loc = d.location.unwrap();
        assert_eq!(loc.line, Some(7));
        assert_eq!(loc.file.as_deref(), Some("ep1.tsv"));
    }

    #[test]
    fn test_bundle_refresh_totals() {
        let mut bundle = ParseBundle::default();
        bundle.characters.push(Character {
            display_name: "JOHN".into(),
            normalized_name: "JOHN".into(),
            replica_count: 3,
            variants: vec!["JOHN".into()],
            kind: CharacterKind::Regular,
            parent_normalized_name: None,
            scenes_present: BTreeSet::from([0]),
        });
        bundle.characters.push(Character {
            display_name: "MARY".into(),
            normalized_name: "MARY".into(),
            replica_count: 2,
            variants: vec!["MARY".into()],
            kind: CharacterKind::Regular,
            parent_normalized_name: None,
            scenes_present: BTreeSet::from([0]),
        });
        bundle.refresh_totals();
        assert_eq!(bundle.metadata.total_replicas, 5);
    }
}
