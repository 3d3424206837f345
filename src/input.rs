//! Decoded-input adapters for the CLI.
//!
//! The pipeline consumes `DecodedInput`, not files — PDF, DOCX and XLSX
//! decoding happen outside this crate. What the CLI can decode on its own
//! is plain text and separator-delimited text (`.tsv`/`.csv`), which is
//! enough for the common case of a transcript export sitting in a
//! directory. Everything here produces the same shapes an external decoder
//! would.

use std::collections::HashMap;
use std::path::Path;

use crate::error::RolecallError;
use crate::model::{Cell, DecodedInput};

/// Decode one file into a `DecodedInput` based on its extension.
///
/// `.tsv` and `.csv` become `Table` inputs with the first non-empty line as
/// headers; everything else is `Text` and goes through content-type
/// detection downstream.
pub fn decode_file(path: &Path) -> Result<DecodedInput, RolecallError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::InvalidData {
            RolecallError::UndecodableInput(format!("{} is not UTF-8 text", path.display()))
        } else {
            RolecallError::Io(e)
        }
    })?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match ext.as_deref() {
        Some("tsv") => Ok(decode_delimited(path, &content, '\t')),
        Some("csv") => Ok(decode_delimited(path, &content, ',')),
        _ => Ok(DecodedInput::Text { text: content }),
    }
}

/// Decode several files into one `Multi` input, in the given order.
pub fn decode_files(paths: &[std::path::PathBuf]) -> Result<DecodedInput, RolecallError> {
    let mut inputs = Vec::with_capacity(paths.len());
    for path in paths {
        inputs.push(decode_file(path)?);
    }
    Ok(DecodedInput::Multi { inputs })
}

fn decode_delimited(path: &Path, content: &str, sep: char) -> DecodedInput {
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());
    let Some(header_line) = lines.next() else {
        return DecodedInput::Table {
            sheet_name: sheet_name(path),
            headers: Vec::new(),
            rows: Vec::new(),
        };
    };

    let headers: Vec<String> = split_row(header_line, sep);
    let rows: Vec<HashMap<String, Cell>> = lines
        .map(|line| {
            headers
                .iter()
                .cloned()
                .zip(split_row(line, sep).into_iter().map(Cell::Str))
                .collect()
        })
        .collect();

    DecodedInput::Table {
        sheet_name: sheet_name(path),
        headers,
        rows,
    }
}

fn sheet_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

/// Split one delimited row. Quoted CSV cells keep embedded separators; a
/// doubled quote inside a quoted cell is an escaped quote.
fn split_row(line: &str, sep: char) -> Vec<String> {
    if sep != ',' {
        return line.split(sep).map(|c| c.trim().to_string()).collect();
    }

    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                cells.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(c),
        }
    }
    cells.push(current.trim().to_string());
    cells
}
