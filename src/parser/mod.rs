//! Parse dispatch: decoded inputs in, one `ParseBundle` out.
//!
//! # Architecture overview
//!
//! This module sits at the boundary between decoded documents and the
//! normalized bundle. It routes each `DecodedInput` through the right
//! stages:
//!
//! ```text
//! Text  → normalize → detect → screenplay and/or tabular → RawDialogue/ScriptLine
//! Table → mapping → tabular projection → ScriptLine (+ sceneless RawDialogue)
//! Multi → each member as above, scene indices offset per document
//! ```
//!
//! and then joins everything through the aggregator and the conflict
//! extractor into a single bundle.
//!
//! # Hybrid documents
//!
//! A hybrid text mixes screenplay structure with separator-delimited rows.
//! Contiguous runs of at least three lines carrying two or more separators
//! form candidate table regions; a region is projected tabularly only when
//! its first row auto-detects a role column. Table-region lines are blanked
//! (not removed) for the screenplay pass, which keeps line numbers stable
//! and scene indices continuous across the whole document. Screenplay wins
//! whenever a region reads as both.
//!
//! # TRADE-OFFS
//!
//! Scene indices are offset per document inside a `Multi` input rather than
//! shared, so characters from different files never co-appear. That means a
//! two-part script split across files produces no cross-file conflicts —
//! callers who need those must concatenate the text before decoding.

pub mod screenplay;
pub mod tabular;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::aggregate::aggregate;
use crate::conflicts::extract_conflicts;
use crate::detect::detect_text;
use crate::model::{
    Cell, ColumnMapping, ContentKind, DecodedInput, Diagnostic, ParseBundle, RawDialogue,
    ScriptLine,
};
use crate::normalize::{normalize_name, normalize_text};
use crate::tokenizer::{DEFAULT_SCENE_PREFIXES, tokenize};

/// Cooperative cancellation flag checked between table rows.
///
/// Parsing is cheap enough that screenplay passes run to completion; only
/// the row loop, which can face six-figure spreadsheet exports, polls this.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Caller-tunable parse behavior. `Default` matches the built-in heuristics.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Scene-heading prefixes, checked case-sensitively.
    pub scene_prefixes: Vec<String>,
    /// Explicit column mapping for tabular input; auto-detected when absent.
    pub mapping: Option<ColumnMapping>,
    /// Labels recorded as `metadata.source_files`, in caller order.
    pub source_labels: Vec<String>,
    pub cancel: Option<CancelToken>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            scene_prefixes: DEFAULT_SCENE_PREFIXES.iter().map(|s| s.to_string()).collect(),
            mapping: None,
            source_labels: Vec::new(),
            cancel: None,
        }
    }
}

/// Accumulated per-document output before aggregation.
#[derive(Default)]
struct Collected {
    dialogues: Vec<RawDialogue>,
    script_lines: Vec<ScriptLine>,
    diagnostics: Vec<Diagnostic>,
    sheet_names: Vec<String>,
    scene_base: usize,
}

/// Parse one decoded input (possibly multi-document) into a bundle.
pub fn parse_script(input: &DecodedInput, options: &ParseOptions) -> ParseBundle {
    let mut collected = Collected::default();
    collect(input, options, &mut collected);

    // Script lines renumber once across all documents so the strictly
    // increasing invariant holds bundle-wide
    for (i, line) in collected.script_lines.iter_mut().enumerate() {
        line.line_number = i + 1;
    }

    let characters = aggregate(&collected.dialogues);
    let conflicts = extract_conflicts(&collected.dialogues, &mut collected.diagnostics);

    let mut bundle = ParseBundle {
        characters,
        conflicts,
        script_lines: collected.script_lines,
        metadata: Default::default(),
        diagnostics: collected.diagnostics,
    };
    bundle.metadata.source_files = if options.source_labels.is_empty() {
        collected.sheet_names
    } else {
        options.source_labels.clone()
    };
    bundle.refresh_totals();
    bundle
}

fn collect(input: &DecodedInput, options: &ParseOptions, out: &mut Collected) {
    match input {
        DecodedInput::Text { text } => collect_text(text, options, out),
        DecodedInput::Table {
            sheet_name,
            headers,
            rows,
        } => {
            if let Some(name) = sheet_name {
                out.sheet_names.push(name.clone());
            }
            collect_table(headers, rows, options, out);
        }
        DecodedInput::Multi { inputs } => {
            for inner in inputs {
                collect(inner, options, out);
            }
        }
    }
}

fn collect_text(text: &str, options: &ParseOptions, out: &mut Collected) {
    let normalized = normalize_text(text);
    match detect_text(&normalized) {
        ContentKind::Screenplay => collect_screenplay(&normalized, options, out),
        ContentKind::Tabular => {
            let lines: Vec<&str> = normalized.split('\n').collect();
            collect_text_table(&lines, options, out);
        }
        ContentKind::Hybrid => collect_hybrid(&normalized, options, out),
    }
}

fn collect_screenplay(normalized: &str, options: &ParseOptions, out: &mut Collected) {
    let tokens = tokenize(normalized, &options.scene_prefixes);
    let parse = screenplay::parse_screenplay(&tokens);
    let scene_count = parse.scenes.len();

    for mut d in parse.dialogues {
        d.scene_index = d.scene_index.map(|s| s + out.scene_base);
        out.dialogues.push(d);
    }
    out.diagnostics.extend(parse.diagnostics);
    out.scene_base += scene_count;
}

/// Project a run of separator-delimited text lines: first non-blank line is
/// the header row, the rest are data rows.
fn collect_text_table(lines: &[&str], options: &ParseOptions, out: &mut Collected) {
    let mut iter = lines.iter().filter(|l| !l.trim().is_empty());
    let Some(header_line) = iter.next() else {
        return;
    };
    let headers = split_cells(header_line);
    let rows: Vec<HashMap<String, Cell>> = iter
        .map(|line| {
            headers
                .iter()
                .cloned()
                .zip(split_cells(line).into_iter().map(Cell::Str))
                .collect()
        })
        .collect();
    collect_table(&headers, &rows, options, out);
}

fn collect_table(
    headers: &[String],
    rows: &[HashMap<String, Cell>],
    options: &ParseOptions,
    out: &mut Collected,
) {
    let lines = tabular::parse_table(
        headers,
        rows,
        options.mapping.as_ref(),
        options.cancel.as_ref(),
        &mut out.diagnostics,
    );

    // Each projected row is one replica of its role, with no scene
    for line in &lines {
        let normalized = normalize_name(&line.role_name);
        if normalized.is_empty() {
            continue;
        }
        let text = line
            .source_text
            .clone()
            .or_else(|| line.translation.clone())
            .unwrap_or_default();
        out.dialogues.push(RawDialogue {
            scene_index: None,
            speaker_raw: line.role_name.clone(),
            speaker_normalized: normalized,
            dialogue_lines: vec![text],
            cue_line: line.line_number,
            group: false,
        });
    }
    out.script_lines.extend(lines);
}

fn collect_hybrid(normalized: &str, options: &ParseOptions, out: &mut Collected) {
    let lines: Vec<&str> = normalized.split('\n').collect();
    let mut is_table_line = vec![false; lines.len()];

    for region in table_regions(&lines) {
        let region_lines = &lines[region.clone()];
        let headers = split_cells(region_lines[0]);
        if tabular::auto_detect_columns(&headers).is_none() {
            // Screenplay supersedes: leave the region to the text pass
            continue;
        }
        collect_text_table(region_lines, options, out);
        for flag in &mut is_table_line[region] {
            *flag = true;
        }
    }

    // Blank table lines rather than removing them so scene indices and
    // diagnostics keep real line numbers
    let screenplay_text: Vec<&str> = lines
        .iter()
        .zip(&is_table_line)
        .map(|(&line, &is_table)| if is_table { "" } else { line })
        .collect();
    collect_screenplay(&screenplay_text.join("\n"), options, out);
}

/// Maximal runs of at least three consecutive lines with two or more column
/// separators each.
fn table_regions(lines: &[&str]) -> Vec<std::ops::Range<usize>> {
    const MIN_REGION: usize = 3;
    let mut regions = Vec::new();
    let mut start: Option<usize> = None;

    for (i, line) in lines.iter().enumerate() {
        let dense = line.chars().filter(|&c| c == '\t' || c == '|').count() >= 2;
        match (dense, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                if i - s >= MIN_REGION {
                    regions.push(s..i);
                }
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start
        && lines.len() - s >= MIN_REGION
    {
        regions.push(s..lines.len());
    }
    regions
}

/// Split a separator-delimited line into trimmed cells. Tab wins over pipe
/// when both appear; border pipes do not produce empty edge cells.
fn split_cells(line: &str) -> Vec<String> {
    let sep = if line.contains('\t') { '\t' } else { '|' };
    let mut cells: Vec<String> = line.split(sep).map(|c| c.trim().to_string()).collect();
    if sep == '|' {
        if cells.first().is_some_and(|c| c.is_empty()) {
            cells.remove(0);
        }
        if cells.last().is_some_and(|c| c.is_empty()) {
            cells.pop();
        }
    }
    cells
}
