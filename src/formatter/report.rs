//! Plain-text cast report (the default output format).
//!
//! The layout is optimized for a quick read before committing an import:
//! cast first (with kind markers and replica counts), then co-appearance
//! conflicts, then whatever the parser had to warn about. Every section is
//! prefixed so the output greps cleanly — `grep '^conflict' report.txt`
//! lists every pair.

use std::io::Write;

use crate::error::RolecallError;
use crate::formatter::Formatter;
use crate::model::{Character, CharacterKind, ParseBundle, Severity};

/// Formatter producing the human-readable import preview.
pub struct ReportFormatter;

impl Formatter for ReportFormatter {
    fn format(&self, bundle: &ParseBundle, writer: &mut dyn Write) -> Result<(), RolecallError> {
        format_header(bundle, writer)?;
        writeln!(writer)?;

        for c in &bundle.characters {
            format_character(c, writer)?;
        }

        if !bundle.conflicts.is_empty() {
            writeln!(writer)?;
            for pair in &bundle.conflicts {
                let scenes: Vec<String> = pair.scenes.iter().map(|s| s.to_string()).collect();
                writeln!(
                    writer,
                    "conflict: {} x {} (scenes {})",
                    pair.a,
                    pair.b,
                    scenes.join(",")
                )?;
            }
        }

        if !bundle.script_lines.is_empty() {
            writeln!(writer)?;
            writeln!(writer, "lines: {} projected rows", bundle.script_lines.len())?;
        }

        let warnings = bundle
            .diagnostics
            .iter()
            .filter(|d| d.severity != Severity::Info)
            .count();
        if warnings > 0 {
            writeln!(writer)?;
            for d in &bundle.diagnostics {
                if d.severity == Severity::Info {
                    continue;
                }
                let line = d
                    .location
                    .as_ref()
                    .and_then(|l| l.line)
                    .map(|n| format!(" (line {n})"))
                    .unwrap_or_default();
                writeln!(writer, "warning: [{}] {}{}", d.code, d.message, line)?;
            }
        }

        Ok(())
    }
}

fn format_header(bundle: &ParseBundle, w: &mut dyn Write) -> Result<(), RolecallError> {
    if !bundle.metadata.source_files.is_empty() {
        writeln!(w, "source: {}", bundle.metadata.source_files.join(", "))?;
    }
    writeln!(
        w,
        "cast: {} characters, {} replicas, {} conflicts",
        bundle.characters.len(),
        bundle.metadata.total_replicas,
        bundle.conflicts.len()
    )?;
    Ok(())
}

fn format_character(c: &Character, w: &mut dyn Write) -> Result<(), RolecallError> {
    let marker = match c.kind {
        CharacterKind::Regular => "",
        CharacterKind::Group => " [group]",
        CharacterKind::Variant => " [variant]",
    };
    let parent = c
        .parent_normalized_name
        .as_deref()
        .map(|p| format!(" of {p}"))
        .unwrap_or_default();

    write!(
        w,
        "role: {}{marker}{parent}: {} replicas, {} scenes",
        c.display_name,
        c.replica_count,
        c.scenes_present.len()
    )?;
    if c.variants.len() > 1 {
        write!(w, " (also as {})", c.variants[1..].join(", "))?;
    }
    writeln!(w)?;
    Ok(())
}
