//! V2Ray outbound CLI
//!
//! Command-line interface for inspecting, editing, validating and linting
//! flat outbound records.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use v2ray_outbound::{
    ensure_unique_tag, import_links, lint_record, load_record, load_text_auto, outbounds, resolve,
    to_flat, to_structured, validate_section, write_record, BuiltinValidator, FlatRecord,
    MapError, MemoryStore, OutboundEntry, ResolveOptions, SectionStatus, Severity, Store,
    StoreError, ValidateError, OUTBOUND_SECTION,
};

#[derive(Parser)]
#[command(name = "v2ray-outbound")]
#[command(about = "Map, resolve, validate and import v2ray outbound sections")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which fields are active, required or omitted for a section
    Resolve {
        /// Record file
        record: PathBuf,

        /// Section id
        #[arg(long, short)]
        section: String,

        /// Assume the REALITY capability flag is set
        #[arg(long)]
        reality: bool,
    },

    /// Print outbound sections as structured entries
    Export {
        /// Record file
        record: PathBuf,

        /// Only export this section
        #[arg(long, short)]
        section: Option<String>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Write a structured entry back into the record
    Apply {
        /// Record file
        record: PathBuf,

        /// Entry JSON file, or - for stdin
        #[arg(long)]
        entry: String,

        /// Section to overwrite (default: the entry's id, or a new section)
        #[arg(long, short)]
        section: Option<String>,

        /// Output file (default: overwrite the record)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Import vmess:// share links, one per line
    Import {
        /// Record file
        record: PathBuf,

        /// Links file, or - for stdin
        #[arg(long)]
        links: String,

        /// Output file (default: overwrite the record)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Validate one section
    Validate {
        /// Record file
        record: PathBuf,

        /// Section id
        #[arg(long, short)]
        section: String,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,

        /// Assume the REALITY capability flag is set
        #[arg(long)]
        reality: bool,
    },

    /// Lint every outbound section of a record
    Lint {
        /// Record file
        record: PathBuf,

        /// Output format: text (default) or json
        #[arg(long, default_value = "text")]
        format: String,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,

        /// Only show sections with problems
        #[arg(long, short)]
        quiet: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Resolve {
            record,
            section,
            reality,
        } => run_resolve(&record, &section, reality),

        Commands::Export {
            record,
            section,
            pretty,
        } => run_export(&record, section.as_deref(), pretty),

        Commands::Apply {
            record,
            entry,
            section,
            output,
        } => run_apply(&record, &entry, section, output),

        Commands::Import {
            record,
            links,
            output,
        } => run_import(&record, &links, output),

        Commands::Validate {
            record,
            section,
            json,
            reality,
        } => run_validate(&record, &section, json, reality),

        Commands::Lint {
            record,
            format,
            strict,
            quiet,
        } => run_lint(&record, &format, strict, quiet),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: &Path) -> Result<FlatRecord, u8> {
    load_record(path).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })
}

fn save(path: &Path, record: &FlatRecord) -> Result<(), u8> {
    write_record(path, record).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<(), u8> {
    let json_output = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;
    println!("{}", json_output);
    Ok(())
}

fn map_failure(e: MapError) -> u8 {
    eprintln!("Error: {}", e);
    e.exit_code() as u8
}

fn run_resolve(path: &Path, section_id: &str, reality: bool) -> Result<(), u8> {
    let record = load(path)?;
    let section = record.get(section_id).ok_or_else(|| {
        map_failure(MapError::SectionNotFound {
            section: section_id.to_string(),
        })
    })?;

    let options = ResolveOptions::new().reality(reality);
    let resolution = resolve(section, &options).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    print_json(&resolution, true)
}

fn run_export(path: &Path, section_id: Option<&str>, pretty: bool) -> Result<(), u8> {
    let record = load(path)?;

    match section_id {
        Some(id) => {
            let mapped = to_structured(&record, id).map_err(map_failure)?;
            print_json(&mapped.entry, pretty)
        }
        None => {
            let entries = outbounds(&record)
                .map(|(id, _)| to_structured(&record, id).map(|m| m.entry))
                .collect::<Result<Vec<_>, _>>()
                .map_err(map_failure)?;
            print_json(&entries, pretty)
        }
    }
}

fn run_apply(
    path: &Path,
    entry_source: &str,
    section: Option<String>,
    output: Option<PathBuf>,
) -> Result<(), u8> {
    let record = load(path)?;

    let content = load_text_auto(entry_source).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;
    let entry: OutboundEntry = serde_json::from_str(&content).map_err(|e| {
        eprintln!("Error: invalid entry: {}", e);
        2u8
    })?;

    let section = section.or_else(|| entry.id.clone());
    ensure_unique_tag(&record, &entry.tag, section.as_deref()).map_err(map_failure)?;

    let mut store = MemoryStore::from_record(record);
    let id = match section {
        Some(id) if store.get(&id).is_some() => id,
        Some(id) => {
            return Err(map_failure(MapError::SectionNotFound { section: id }));
        }
        None => store.add(OUTBOUND_SECTION),
    };

    let store_failure = |e: StoreError| {
        eprintln!("Error: {}", e);
        2u8
    };
    to_flat(&entry)
        .apply_to(&mut store, &id)
        .map_err(store_failure)?;
    store.save().map_err(store_failure)?;

    save(output.as_deref().unwrap_or(path), store.record())?;
    println!("{}", id);
    Ok(())
}

fn run_import(path: &Path, links_source: &str, output: Option<PathBuf>) -> Result<(), u8> {
    let record = load(path)?;
    let input = load_text_auto(links_source).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let report = import_links(&input, &record);
    for skipped in &report.skipped {
        eprintln!("  line {}: {}", skipped.line, skipped.reason);
    }

    let mut store = MemoryStore::from_record(record);
    let ids = report.commit(&mut store).map_err(|e| {
        eprintln!("Error: {}", e);
        2u8
    })?;

    if !ids.is_empty() {
        save(output.as_deref().unwrap_or(path), store.record())?;
    }
    for id in &ids {
        println!("{}", id);
    }
    eprintln!(
        "Imported {} link(s), skipped {}",
        ids.len(),
        report.skipped.len()
    );

    if ids.is_empty() && !report.skipped.is_empty() {
        Err(1)
    } else {
        Ok(())
    }
}

fn run_validate(path: &Path, section_id: &str, json_output: bool, reality: bool) -> Result<(), u8> {
    let record = load(path)?;
    let options = ResolveOptions::new().reality(reality);

    match validate_section(&record, section_id, &BuiltinValidator, &options) {
        Ok(()) => {
            if json_output {
                println!(r#"{{"valid":true}}"#);
            } else {
                println!("Valid");
            }
            Ok(())
        }
        Err(ValidateError::Invalid { errors }) => {
            if json_output {
                let output = serde_json::json!({
                    "valid": false,
                    "errors": errors
                });
                println!("{}", output);
            } else {
                eprintln!("Validation failed:");
                for error in errors {
                    eprintln!("  {}", error);
                }
            }
            Err(1)
        }
        Err(e) => {
            report_error(json_output, &e.to_string());
            Err(e.exit_code() as u8)
        }
    }
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", serde_json::json!({ "valid": false, "error": msg }));
    } else {
        eprintln!("Error: {}", msg);
    }
}

fn run_lint(path: &Path, format: &str, strict: bool, quiet: bool) -> Result<(), u8> {
    let record = load(path)?;
    let result = lint_record(&record, strict);

    if format == "json" {
        print_json(&result, true)?;
    } else {
        if !quiet {
            println!("Linting {} ...\n", path.display());
        }

        for section in &result.results {
            let status_icon = match section.status {
                SectionStatus::Ok => "\x1b[32m✓\x1b[0m",
                SectionStatus::Warning => "\x1b[33m⚠\x1b[0m",
                SectionStatus::Error => "\x1b[31m✗\x1b[0m",
            };

            if !quiet || section.status != SectionStatus::Ok {
                println!("  {} {}", status_icon, section.section);
            }

            for diag in &section.diagnostics {
                let (color, label) = match diag.severity {
                    Severity::Error => ("\x1b[31m", "error"),
                    Severity::Warning => ("\x1b[33m", "warning"),
                };
                if !quiet || diag.severity == Severity::Error {
                    println!(
                        "    {}{}[{}]\x1b[0m: {} - {}",
                        color,
                        label,
                        diag.code,
                        diag.field.as_deref().unwrap_or("-"),
                        diag.message
                    );
                }
            }
        }

        println!();
        if result.failed == 0 {
            println!(
                "\x1b[32m✓ {} sections checked, all passed\x1b[0m",
                result.sections_checked
            );
        } else {
            println!(
                "\x1b[31m✗ {} sections checked: {} passed, {} failed ({} errors, {} warnings)\x1b[0m",
                result.sections_checked, result.passed, result.failed, result.errors, result.warnings
            );
        }
    }

    if result.failed == 0 {
        Ok(())
    } else {
        Err(1)
    }
}
