//! Configuration loading and management for rolecall.
//!
//! # Architecture overview
//!
//! Configuration lives in `~/.config/rolecall/config.toml` and is purely
//! optional. When absent, every option falls back to a sensible default so
//! that rolecall works out of the box without any setup.
//!
//! Config values flow into the rest of the system through two paths:
//! 1. **`Config::load()`** — used at runtime by the CLI to fill in defaults
//!    before parsing scripts or applying bundles.
//! 2. **`get_value` / `set_value` / `unset_value`** — used by the
//!    `rolecall get/set/unset` subcommands to read and write individual
//!    keys from the live file.
//!
//! CLI flags always override config values; the merge happens in `main.rs`.
//!
//! # TRADE-OFFS
//!
//! - `toml_edit` is used instead of plain `toml` for the mutation helpers
//!   because it preserves comments and formatting in the user's config
//!   file. This adds a second TOML dependency but is worth it to avoid
//!   silently destroying hand-written comments.
//! - Paths are stored as `Option<String>` rather than `Option<PathBuf>` so
//!   that tilde expansion happens at point-of-use, keeping serialization
//!   round-trips lossless.

use std::path::PathBuf;

use serde::Deserialize;
use toml_edit::DocumentMut;

use crate::error::RolecallError;

/// Parsing overrides from the `[parse]` table.
///
/// `scene_prefixes` replaces the built-in scene-heading markers when set —
/// productions using nonstandard headings (`ACT`, `EPISODE`) point the
/// tokenizer at their own list without touching any other heuristic.
#[derive(Debug, Default, Deserialize)]
pub struct ParseConfig {
    pub scene_prefixes: Option<Vec<String>>,
}

/// Top-level config deserialized from `~/.config/rolecall/config.toml`.
///
/// All fields are optional. Missing fields fall back to built-in defaults,
/// so a config file with a single key is valid and common. `Config::load()`
/// returns `Config::default()` when the file is absent rather than
/// erroring, so rolecall is always runnable without any configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Default output directory for bundle reports and JSON dumps.
    pub output: Option<String>,
    /// Default output format: `"report"` or `"json"`.
    pub format: Option<String>,
    /// Path to the casting database applied against by `rolecall apply`.
    pub database: Option<String>,
    /// Default project id for `apply` and `roles`.
    pub project: Option<i64>,
    #[serde(default)]
    pub parse: ParseConfig,
}

impl Config {
    /// Load config from `~/.config/rolecall/config.toml`.
    ///
    /// Returns `Config::default()` silently when the file is absent —
    /// rolecall is designed to be zero-config, so a missing file is never
    /// an error. Parse failures also fall back to default to avoid breaking
    /// normal usage when a user has written an invalid value.
    pub fn load() -> Config {
        let Some(home) = dirs::home_dir() else {
            return Config::default();
        };
        let path = home.join(".config/rolecall/config.toml");
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Config::default();
        };
        toml::from_str(&content).unwrap_or_default()
    }

    /// Resolve the configured output path, expanding a leading `~`.
    pub fn output_path(&self) -> Option<PathBuf> {
        self.output.as_deref().map(expand_tilde)
    }

    /// Resolve the configured database path, expanding a leading `~`.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.database.as_deref().map(expand_tilde)
    }
}

/// Print a config value by dotted key (e.g. `"parse.scene_prefixes"`).
///
/// Reads the live config file so that comments and formatting written by
/// the user are not disturbed. Errors if the key does not exist.
pub fn get_value(key: &str) -> Result<(), RolecallError> {
    let content = read_config_file()?;
    let doc: DocumentMut = content
        .parse()
        .map_err(|e| RolecallError::Other(format!("Failed to parse config: {e}")))?;

    match resolve_key(&doc, key) {
        Some(item) => {
            println!("{}", format_item(item));
            Ok(())
        }
        None => Err(RolecallError::Other(format!("Key not found: {key}"))),
    }
}

/// Write a config value by dotted key (e.g. `rolecall set project 3`).
///
/// Creates the config file and any intermediate TOML tables as needed.
/// Values are type-inferred from their string representation — `"true"` /
/// `"false"` become booleans, numeric strings become integers or floats,
/// and everything else becomes a string.
pub fn set_value(key: &str, value: &str) -> Result<(), RolecallError> {
    let content = read_config_file().unwrap_or_default();
    let mut doc: DocumentMut = content
        .parse()
        .map_err(|e| RolecallError::Other(format!("Failed to parse config: {e}")))?;

    let (table_path, field) = split_key(key)?;

    let mut table = doc.as_table_mut();
    for segment in &table_path {
        if !table.contains_key(segment) {
            table.insert(segment, toml_edit::Item::Table(toml_edit::Table::new()));
        }
        table = table[segment]
            .as_table_mut()
            .ok_or_else(|| RolecallError::Other(format!("'{segment}' is not a table")))?;
    }

    table.insert(&field, toml_edit::Item::Value(infer_value(value)));

    write_config_file(&doc.to_string())?;
    Ok(())
}

/// Remove a config value by dotted key (`rolecall unset <key>`).
///
/// Errors if the key does not exist, so the command gives clear feedback
/// rather than silently succeeding on a typo.
pub fn unset_value(key: &str) -> Result<(), RolecallError> {
    let content = read_config_file()?;
    let mut doc: DocumentMut = content
        .parse()
        .map_err(|e| RolecallError::Other(format!("Failed to parse config: {e}")))?;

    let (table_path, field) = split_key(key)?;

    let mut table = doc.as_table_mut();
    for segment in &table_path {
        table = table
            .get_mut(segment)
            .and_then(|item| item.as_table_mut())
            .ok_or_else(|| RolecallError::Other(format!("Key not found: {key}")))?;
    }

    if table.remove(&field).is_none() {
        return Err(RolecallError::Other(format!("Key not found: {key}")));
    }

    write_config_file(&doc.to_string())?;
    Ok(())
}

/// Print all config values in `key = value` format (`rolecall get`).
pub fn list_values() -> Result<(), RolecallError> {
    let content = read_config_file()?;
    let doc: DocumentMut = content
        .parse()
        .map_err(|e| RolecallError::Other(format!("Failed to parse config: {e}")))?;

    let mut entries = Vec::new();
    collect_entries(doc.as_table(), "", &mut entries);

    if entries.is_empty() {
        eprintln!("No config values set.");
    } else {
        for (key, value) in entries {
            println!("{key} = {value}");
        }
    }
    Ok(())
}

/// Write the default config template to `~/.config/rolecall/config.toml`.
///
/// All options are commented out so that the file documents what is
/// available without changing any behavior. Errors if the file already
/// exists to avoid overwriting user customizations.
pub fn init() -> Result<(), RolecallError> {
    let path = config_path()?;
    if path.exists() {
        return Err(RolecallError::Other(format!(
            "Config file already exists: {}",
            path.display()
        )));
    }

    let template = r#"# Rolecall configuration
# See: rolecall docs

# Default output directory for bundle reports and JSON dumps
# output = "~/casting"

# Default output format: "report" or "json"
# format = "report"

# Casting database used by `rolecall apply` and `rolecall roles`
# database = "~/casting/casting.db"

# Default project id
# project = 1

[parse]
# Replace the built-in scene-heading markers
# scene_prefixes = ["INT.", "EXT.", "I/E", "SCENE", "סצנה"]
"#;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, template)?;

    eprintln!("Created config file: {}", path.display());
    eprintln!();
    eprintln!("Edit it directly, or use:");
    eprintln!("  rolecall set database ~/casting/casting.db");
    eprintln!("  rolecall set project 1");
    eprintln!("  rolecall get");

    Ok(())
}

// ── Private helpers ──────────────────────────────────────────────────────────

fn config_path() -> Result<PathBuf, RolecallError> {
    let home = dirs::home_dir()
        .ok_or_else(|| RolecallError::Other("Cannot determine home directory".into()))?;
    Ok(home.join(".config/rolecall/config.toml"))
}

fn read_config_file() -> Result<String, RolecallError> {
    let path = config_path()?;
    std::fs::read_to_string(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RolecallError::Other(format!("Config file not found: {}", path.display()))
        } else {
            RolecallError::Io(e)
        }
    })
}

fn write_config_file(content: &str) -> Result<(), RolecallError> {
    let path = config_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, content)?;
    Ok(())
}

/// Parse a dotted key into a table path and a leaf field name.
///
/// `"parse.scene_prefixes"` → `(["parse"], "scene_prefixes")`
/// `"output"` → `([], "output")`
fn split_key(key: &str) -> Result<(Vec<String>, String), RolecallError> {
    let parts: Vec<&str> = key.split('.').collect();
    if parts.is_empty() || parts.iter().any(|p| p.is_empty()) {
        return Err(RolecallError::Other(format!("Invalid key: {key}")));
    }
    let field = parts[parts.len() - 1].to_string();
    let table_path = parts[..parts.len() - 1]
        .iter()
        .map(|s| s.to_string())
        .collect();
    Ok((table_path, field))
}

/// Walk a dotted key path in a `toml_edit` document and return the matching
/// item, `None` when any segment is missing.
fn resolve_key<'a>(doc: &'a DocumentMut, key: &str) -> Option<&'a toml_edit::Item> {
    let mut current: &toml_edit::Item = doc.as_item();
    for part in key.split('.') {
        current = current.as_table_like()?.get(part)?;
    }
    Some(current)
}

/// Render a `toml_edit::Item` as a clean user-facing string. Tables expand
/// into `key = value` lines so `rolecall get parse` shows every leaf.
fn format_item(item: &toml_edit::Item) -> String {
    match item {
        toml_edit::Item::Value(v) => match v {
            toml_edit::Value::String(s) => s.value().clone(),
            toml_edit::Value::Integer(i) => i.value().to_string(),
            toml_edit::Value::Float(f) => f.value().to_string(),
            toml_edit::Value::Boolean(b) => b.value().to_string(),
            other => other.to_string(),
        },
        toml_edit::Item::Table(t) => {
            let mut entries = Vec::new();
            collect_entries(t, "", &mut entries);
            entries
                .iter()
                .map(|(k, v)| format!("{k} = {v}"))
                .collect::<Vec<_>>()
                .join("\n")
        }
        other => other.to_string(),
    }
}

/// Recursively walk a TOML table and collect leaf values as dotted
/// `(key, value)` pairs, round-trippable into `rolecall set` commands.
fn collect_entries(table: &toml_edit::Table, prefix: &str, out: &mut Vec<(String, String)>) {
    for (key, item) in table.iter() {
        let full_key = if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}.{key}")
        };
        match item {
            toml_edit::Item::Value(v) => {
                out.push((full_key, format_value(v)));
            }
            toml_edit::Item::Table(t) => {
                collect_entries(t, &full_key, out);
            }
            _ => {}
        }
    }
}

/// Render a TOML scalar without `toml_edit`'s whitespace decoration.
fn format_value(v: &toml_edit::Value) -> String {
    match v {
        toml_edit::Value::String(s) => format!("\"{}\"", s.value()),
        toml_edit::Value::Integer(i) => i.value().to_string(),
        toml_edit::Value::Float(f) => f.value().to_string(),
        toml_edit::Value::Boolean(b) => b.value().to_string(),
        other => other.to_string(),
    }
}

/// Infer a TOML value type from a CLI string argument.
///
/// Precedence: boolean → integer → float (only when the string contains
/// `.`) → string. Users run `rolecall set project 3` and expect an integer,
/// not the string `"3"`.
fn infer_value(s: &str) -> toml_edit::Value {
    if s == "true" {
        return toml_edit::Value::from(true);
    }
    if s == "false" {
        return toml_edit::Value::from(false);
    }
    if let Ok(n) = s.parse::<i64>() {
        return toml_edit::Value::from(n);
    }
    if let Ok(f) = s.parse::<f64>()
        && s.contains('.')
    {
        return toml_edit::Value::from(f);
    }
    toml_edit::Value::from(s)
}

/// Expand a leading `~` or `~/` prefix to the user's home directory.
/// Absolute and relative paths pass through unchanged.
pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~"
        && let Some(home) = dirs::home_dir()
    {
        return home;
    }
    PathBuf::from(path)
}
