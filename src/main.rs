//! CLI entry point for rolecall.
//!
//! # Architecture overview
//!
//! `main.rs` is the thin coordination layer between the CLI surface and the
//! library crate. Its responsibilities are:
//!
//! 1. Parse CLI arguments (via `clap`)
//! 2. Load and merge configuration from `~/.config/rolecall/config.toml`
//! 3. Dispatch to the appropriate processing mode:
//!    - **Subcommands** (`init`, `get`, `set`, `unset`, `docs`, `roles`,
//!      `apply`) are handled inline before the process-mode logic.
//!    - **Process mode** routes to `run_single_file`, `run_stdin`, or
//!      `run_batch_mode` based on the presence and type of the `PATH`
//!      argument.
//!
//! # Configuration merging
//!
//! CLI flags take precedence over config file values. `--format` is only
//! overridden by config while the CLI value is still the default `report`,
//! so an explicit `--format` always wins.
//!
//! # Error handling
//!
//! All functions return `Result<(), RolecallError>`. `main()` catches
//! errors and prints them to stderr before exiting with code 1.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use clap::{Parser as ClapParser, Subcommand};

use rolecall::apply::{ScriptMeta, apply_bundle};
use rolecall::config::{self, Config};
use rolecall::discover;
use rolecall::error::RolecallError;
use rolecall::formatter::{Formatter, OutputFormat};
use rolecall::input;
use rolecall::model::{DecodedInput, ParseBundle, Severity, UserEdit};
use rolecall::parser::{ParseOptions, parse_script};
use rolecall::store::ProjectStore;
use rolecall::store::sqlite::SqliteStore;

#[derive(ClapParser)]
#[command(name = "rolecall", about = "Script ingestion for casting management")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Input script file or directory (omit for stdin)
    path: Option<PathBuf>,

    /// Output directory for batch mode
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "report", global = true)]
    format: String,

    /// Project id in the casting database
    #[arg(short, long, global = true)]
    project: Option<i64>,

    /// Path to the casting database
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Regenerate even if output is newer than input
    #[arg(long, global = true)]
    force: bool,

    /// Ignore config file; all options must be explicit
    #[arg(long, global = true)]
    detached: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Create a default config file
    Init,
    /// Get a config value (e.g. `rolecall get database`)
    Get {
        /// Dotted config key (e.g. "parse.scene_prefixes")
        key: Option<String>,
    },
    /// Set a config value (e.g. `rolecall set project 1`)
    Set {
        /// Dotted config key
        key: String,
        /// Value to set
        value: String,
    },
    /// Remove a config value
    Unset {
        /// Dotted config key
        key: String,
    },
    /// Show full documentation
    Docs,
    /// List roles stored for a project
    Roles,
    /// Parse a script and reconcile it with the casting database
    Apply {
        /// Script file, or a saved bundle with `--bundle`
        path: PathBuf,
        /// Treat PATH as a bundle JSON produced by `--format json`
        #[arg(long)]
        bundle: bool,
        /// JSON file of user edits applied before committing
        #[arg(long)]
        edits: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(mut cli: Cli) -> Result<(), RolecallError> {
    // Handle subcommands before process mode
    match cli.command.take() {
        Some(Command::Init) => return config::init(),
        Some(Command::Get { key }) => {
            return match key {
                Some(k) => config::get_value(&k),
                None => config::list_values(),
            };
        }
        Some(Command::Set { key, value }) => return config::set_value(&key, &value),
        Some(Command::Unset { key }) => return config::unset_value(&key),
        Some(Command::Docs) => {
            print!("{}", include_str!("../README.md"));
            return Ok(());
        }
        Some(Command::Roles) => {
            let config = load_config(&cli);
            return run_roles(&cli, &config);
        }
        Some(Command::Apply {
            path,
            bundle,
            edits,
        }) => {
            let config = load_config(&cli);
            return run_apply(&cli, &config, &path, bundle, edits.as_deref());
        }
        None => {}
    }

    // Process mode — load config and merge
    let config = load_config(&cli);

    if cli.output.is_none() {
        cli.output = config.output_path();
    }
    if cli.format == "report"
        && let Some(ref fmt) = config.format
    {
        cli.format = fmt.clone();
    }

    let format: OutputFormat = cli
        .format
        .parse()
        .map_err(|e: String| RolecallError::Other(e))?;
    let formatter = format.formatter();
    let options = parse_options(&config);

    match cli.path {
        Some(ref path) if path.is_dir() => {
            run_batch_mode(path, &cli, &options, format, &*formatter)
        }
        Some(ref path) if path.is_file() => run_single_file(path, &options, &*formatter),
        Some(ref path) => Err(RolecallError::Other(format!(
            "Path not found: {}",
            path.display()
        ))),
        None => run_stdin(&options, &*formatter),
    }
}

fn load_config(cli: &Cli) -> Config {
    if cli.detached {
        Config::default()
    } else {
        Config::load()
    }
}

fn parse_options(config: &Config) -> ParseOptions {
    let mut options = ParseOptions::default();
    if let Some(prefixes) = &config.parse.scene_prefixes {
        options.scene_prefixes = prefixes.clone();
    }
    options
}

/// Parse and format a single script file, writing output to stdout.
fn run_single_file(
    path: &Path,
    options: &ParseOptions,
    formatter: &dyn Formatter,
) -> Result<(), RolecallError> {
    let bundle = parse_file(path, options)?;

    let stdout = io::stdout();
    let mut writer = stdout.lock();
    formatter.format(&bundle, &mut writer)?;
    Ok(())
}

/// Read all of stdin as one text document and format the bundle.
fn run_stdin(options: &ParseOptions, formatter: &dyn Formatter) -> Result<(), RolecallError> {
    let mut text = String::new();
    io::stdin().read_to_string(&mut text)?;
    if text.trim().is_empty() {
        return Err(RolecallError::Other("No input on stdin".into()));
    }

    let bundle = parse_script(&DecodedInput::Text { text }, options);

    let stdout = io::stdout();
    let mut writer = stdout.lock();
    formatter.format(&bundle, &mut writer)?;
    Ok(())
}

/// Parse every script file in a directory, writing one bundle file each to
/// `--output`. Files whose output is already newer than the input are
/// skipped unless `--force` is set.
fn run_batch_mode(
    dir: &Path,
    cli: &Cli,
    options: &ParseOptions,
    format: OutputFormat,
    formatter: &dyn Formatter,
) -> Result<(), RolecallError> {
    let output_dir = cli
        .output
        .as_ref()
        .ok_or_else(|| RolecallError::Other("--output is required for batch mode".into()))?;
    std::fs::create_dir_all(output_dir)?;

    let files = discover::find_script_files(dir);
    let total = files.len();
    eprintln!("Found {total} script files");

    let mut written = 0u32;
    let mut skipped = 0u32;
    for (i, path) in files.iter().enumerate() {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("script-{i}"));
        let out_path = output_dir.join(format!("{stem}.{}", format.extension()));

        if !cli.force && is_up_to_date(path, &out_path) {
            skipped += 1;
            continue;
        }

        eprint!("[{} of {total}] {}...", i + 1, path.display());
        let bundle = parse_file(path, options)?;
        let mut out = std::fs::File::create(&out_path)?;
        formatter.format(&bundle, &mut out)?;
        out.flush()?;
        eprintln!(" ok");
        written += 1;
    }

    eprintln!("Wrote {written} bundles, skipped {skipped} up-to-date");
    Ok(())
}

fn is_up_to_date(input: &Path, output: &Path) -> bool {
    let (Ok(in_meta), Ok(out_meta)) = (input.metadata(), output.metadata()) else {
        return false;
    };
    match (in_meta.modified(), out_meta.modified()) {
        (Ok(i), Ok(o)) => o >= i,
        _ => false,
    }
}

fn parse_file(path: &Path, options: &ParseOptions) -> Result<ParseBundle, RolecallError> {
    let decoded = input::decode_file(path)?;
    let mut options = options.clone();
    if let Some(name) = path.file_name() {
        options.source_labels = vec![name.to_string_lossy().into_owned()];
    }
    Ok(parse_script(&decoded, &options))
}

/// `rolecall apply`: parse (or load) a bundle, apply optional user edits,
/// and reconcile it with the casting database.
fn run_apply(
    cli: &Cli,
    config: &Config,
    path: &Path,
    is_bundle: bool,
    edits_path: Option<&Path>,
) -> Result<(), RolecallError> {
    let project_id = cli.project.or(config.project).ok_or_else(|| {
        RolecallError::Other("--project is required (or set via `rolecall set project <id>`)".into())
    })?;
    let db_path = cli
        .database
        .clone()
        .or_else(|| config.database_path())
        .ok_or_else(|| {
            RolecallError::Other(
                "--database is required (or set via `rolecall set database <path>`)".into(),
            )
        })?;

    let raw = std::fs::read_to_string(path)?;
    let mut bundle = if is_bundle {
        serde_json::from_str(&raw).map_err(|source| RolecallError::Json {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        let options = parse_options(config);
        parse_file(path, &options)?
    };

    if let Some(edits_file) = edits_path {
        let edits_raw = std::fs::read_to_string(edits_file)?;
        let edits: Vec<UserEdit> =
            serde_json::from_str(&edits_raw).map_err(|source| RolecallError::Json {
                path: edits_file.to_path_buf(),
                source,
            })?;
        bundle = rolecall::apply_user_edits(bundle, &edits);
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let meta = ScriptMeta::for_content(file_name, &raw);

    let mut store = SqliteStore::open(&db_path)?;
    let outcome = apply_bundle(&mut store, project_id, &bundle, Some(&meta))?;

    eprintln!(
        "Applied to project {project_id}: {} roles created, {} updated, {} conflicts inserted",
        outcome.roles_created, outcome.roles_updated, outcome.conflicts_inserted
    );
    for d in bundle.diagnostics.iter().chain(&outcome.diagnostics) {
        if d.severity == Severity::Info {
            continue;
        }
        eprintln!("warning: [{}] {}", d.code, d.message);
    }
    Ok(())
}

/// `rolecall roles`: list the stored roles of a project.
fn run_roles(cli: &Cli, config: &Config) -> Result<(), RolecallError> {
    let project_id = cli.project.or(config.project).ok_or_else(|| {
        RolecallError::Other("--project is required (or set via `rolecall set project <id>`)".into())
    })?;
    let db_path = cli
        .database
        .clone()
        .or_else(|| config.database_path())
        .ok_or_else(|| {
            RolecallError::Other(
                "--database is required (or set via `rolecall set database <path>`)".into(),
            )
        })?;

    let mut store = SqliteStore::open(&db_path)?;
    let roles = store.get_project_roles(project_id)?;
    if roles.is_empty() {
        eprintln!("No roles in project {project_id}");
        return Ok(());
    }

    println!("id\trole\tnormalized\treplicas\tsource\tparent");
    for r in &roles {
        let parent = r
            .parent_role_id
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            r.id,
            r.role_name,
            r.role_name_normalized,
            r.replicas_needed,
            r.source.as_str(),
            parent
        );
    }
    Ok(())
}
