//! Tabular parser: column auto-detection and row projection.
//!
//! # Architecture overview
//!
//! Spreadsheet-shaped input arrives as a header list plus one string-keyed
//! row map per line (the shape external XLSX/CSV decoders produce). The
//! parser resolves a `ColumnMapping` — either supplied by the caller or
//! auto-detected from the headers — and projects each row into a
//! `ScriptLine`.
//!
//! # Detection strategy
//!
//! Each header is scored against a fixed English/Hebrew synonym set per
//! role: exact match beats containment, higher score beats lower, and the
//! earlier column wins ties. A header can serve at most one role, assigned
//! in a fixed role order, so detection is deterministic for identical
//! headers.
//!
//! # Error behavior
//!
//! A missing role column is the only fatal condition, and even that is
//! reported as an error diagnostic with empty output rather than a failure
//! — parse stages never abort on content. Bad timecodes degrade to `None`
//! with a warning; rows without a role are skipped.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::model::{Cell, ColumnMapping, Diagnostic, RecStatus, ScriptLine, codes};
use crate::parser::CancelToken;

static TIMECODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2}):(\d{2}):(\d{2})(?::(\d{2}))?$").unwrap());

const ROLE_NAMES: [&str; 5] = ["role", "character", "char", "תפקיד", "דמות"];
const TIMECODE_NAMES: [&str; 4] = ["tc", "timecode", "time", "קוד זמן"];
const SOURCE_NAMES: [&str; 5] = ["text", "dialogue", "english", "source", "מקור"];
const TRANSLATION_NAMES: [&str; 3] = ["translation", "hebrew", "תרגום"];
const REC_NAMES: [&str; 4] = ["rec", "status", "הוקלט", "סטטוס"];
const NOTES_NAMES: [&str; 4] = ["note", "notes", "הערה", "הערות"];

/// Resolve a column mapping from header names alone.
///
/// Returns `None` when no header scores against the role-name synonym set —
/// the caller decides whether that is an error (`parse_table` reports
/// `MISSING_ROLE_COLUMN`).
pub fn auto_detect_columns(headers: &[String]) -> Option<ColumnMapping> {
    let mut taken: Vec<usize> = Vec::new();

    let role_idx = best_match(headers, &ROLE_NAMES, &taken)?;
    taken.push(role_idx);

    let assign = |names: &[&str], taken: &mut Vec<usize>| -> Option<String> {
        let idx = best_match(headers, names, taken)?;
        taken.push(idx);
        Some(headers[idx].clone())
    };

    Some(ColumnMapping {
        role_name: headers[role_idx].clone(),
        timecode: assign(&TIMECODE_NAMES, &mut taken),
        source_text: assign(&SOURCE_NAMES, &mut taken),
        translation: assign(&TRANSLATION_NAMES, &mut taken),
        rec_status: assign(&REC_NAMES, &mut taken),
        notes: assign(&NOTES_NAMES, &mut taken),
    })
}

/// Best-scoring header index for a synonym set; ties go to the earlier
/// column. Already-assigned headers are skipped.
fn best_match(headers: &[String], names: &[&str], taken: &[usize]) -> Option<usize> {
    let mut best: Option<(u8, usize)> = None;
    for (idx, header) in headers.iter().enumerate() {
        if taken.contains(&idx) {
            continue;
        }
        let score = match_score(header, names);
        if score == 0 {
            continue;
        }
        if best.is_none_or(|(s, _)| score > s) {
            best = Some((score, idx));
        }
    }
    best.map(|(_, idx)| idx)
}

fn match_score(header: &str, names: &[&str]) -> u8 {
    let h = fold_header(header);
    if h.is_empty() {
        return 0;
    }
    let mut score = 0;
    for name in names {
        let n = fold_header(name);
        if h == n {
            return 2;
        }
        // Abbreviated headers ("EN" for english, "HE" for hebrew) score as
        // prefixes of the synonym; single characters are too ambiguous
        if h.contains(&n) || (h.chars().count() >= 2 && n.starts_with(&h)) {
            score = 1;
        }
    }
    score
}

/// Case-, whitespace- and diacritic-insensitive header form.
fn fold_header(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .filter(|&c| !is_diacritic(c))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Hebrew points and Latin combining marks.
fn is_diacritic(c: char) -> bool {
    matches!(c, '\u{0591}'..='\u{05C7}' | '\u{0300}'..='\u{036F}')
}

/// Check a supplied mapping against the actual headers.
///
/// Every named column must exist; the first missing one is reported.
pub fn validate_mapping(mapping: &ColumnMapping, headers: &[String]) -> Result<(), Diagnostic> {
    let check = |col: &str| -> Result<(), Diagnostic> {
        if headers.iter().any(|h| h == col) {
            Ok(())
        } else {
            Err(Diagnostic::error(
                codes::UNKNOWN_COLUMN,
                format!("mapped column {col:?} not present in headers"),
            ))
        }
    };
    check(&mapping.role_name)?;
    for col in [
        &mapping.timecode,
        &mapping.source_text,
        &mapping.translation,
        &mapping.rec_status,
        &mapping.notes,
    ]
    .into_iter()
    .flatten()
    {
        check(col)?;
    }
    Ok(())
}

/// Project header/row tables into `ScriptLine`s.
///
/// `mapping` falls back to auto-detection when absent. Line numbers are
/// strictly increasing from 1 over the emitted lines; skipped rows do not
/// consume a number. The cancel token is checked between rows and yields a
/// partial result plus a `CANCELLED` diagnostic.
pub fn parse_table(
    headers: &[String],
    rows: &[HashMap<String, Cell>],
    mapping: Option<&ColumnMapping>,
    cancel: Option<&CancelToken>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<ScriptLine> {
    let mapping = match mapping {
        Some(m) => {
            if let Err(d) = validate_mapping(m, headers) {
                diagnostics.push(d);
                return Vec::new();
            }
            m.clone()
        }
        None => match auto_detect_columns(headers) {
            Some(m) => m,
            None => {
                diagnostics.push(Diagnostic::error(
                    codes::MISSING_ROLE_COLUMN,
                    format!("no role column among headers {headers:?}"),
                ));
                return Vec::new();
            }
        },
    };

    let mut lines = Vec::new();
    let mut next_number = 1usize;

    for (row_idx, row) in rows.iter().enumerate() {
        if cancel.is_some_and(|c| c.is_cancelled()) {
            diagnostics.push(Diagnostic::warning(
                codes::CANCELLED,
                format!("table parse cancelled after {} of {} rows", row_idx, rows.len()),
            ));
            break;
        }

        let Some(role_name) = cell_text(row, &mapping.role_name) else {
            diagnostics.push(
                Diagnostic::info(codes::EMPTY_ROLE, "row skipped: empty role")
                    .at_line(row_idx + 1),
            );
            continue;
        };

        let timecode = mapping
            .timecode
            .as_deref()
            .and_then(|col| cell_text(row, col))
            .and_then(|tc| match validate_timecode(&tc) {
                true => Some(tc),
                false => {
                    diagnostics.push(
                        Diagnostic::warning(
                            codes::BAD_TIMECODE,
                            format!("invalid timecode {tc:?}"),
                        )
                        .at_line(row_idx + 1),
                    );
                    None
                }
            });

        lines.push(ScriptLine {
            line_number: next_number,
            role_name,
            timecode,
            source_text: mapping
                .source_text
                .as_deref()
                .and_then(|col| cell_text(row, col)),
            translation: mapping
                .translation
                .as_deref()
                .and_then(|col| cell_text(row, col)),
            rec_status: mapping
                .rec_status
                .as_deref()
                .and_then(|col| cell_text(row, col))
                .and_then(|s| RecStatus::parse(&s)),
            notes: mapping.notes.as_deref().and_then(|col| cell_text(row, col)),
        });
        next_number += 1;
    }

    lines
}

fn cell_text(row: &HashMap<String, Cell>, column: &str) -> Option<String> {
    row.get(column).and_then(Cell::as_text)
}

/// `H:MM:SS` or `H:MM:SS:FF` with MM,SS in 0..=59. FF is two digits and
/// therefore always in range.
pub fn validate_timecode(tc: &str) -> bool {
    let Some(caps) = TIMECODE.captures(tc) else {
        return false;
    };
    let minutes: u32 = caps[2].parse().unwrap_or(60);
    let seconds: u32 = caps[3].parse().unwrap_or(60);
    minutes < 60 && seconds < 60
}
