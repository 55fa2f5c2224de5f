//! rowgraph - command-line tools for catalogs and change batches
//!
//! `check` decodes a change batch against a catalog and validates every
//! change; `order` prints the order in which a save writes entities.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use rowgraph::catalog::Catalog;
use rowgraph::changes::{ChangeDecoder, ChangeKind};
use rowgraph::model::{dependency_order, validate_change};
use tracing_subscriber::EnvFilter;

enum Command {
    Check { catalog: PathBuf, changes: PathBuf },
    Order { catalog: PathBuf },
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    // Parse simple command line args.
    let mut verbose = false;
    let mut catalog: Option<PathBuf> = None;
    let mut positional: Vec<String> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-c" | "--catalog" => {
                i += 1;
                if i < args.len() {
                    catalog = Some(PathBuf::from(&args[i]));
                }
            }
            "-v" | "--verbose" => {
                verbose = true;
            }
            "-h" | "--help" => {
                print_help();
                return ExitCode::SUCCESS;
            }
            "--version" => {
                println!("rowgraph v{}", env!("CARGO_PKG_VERSION"));
                return ExitCode::SUCCESS;
            }
            arg => {
                if !arg.starts_with('-') {
                    positional.push(arg.to_string());
                } else {
                    eprintln!("Unknown option: {}", arg);
                    return ExitCode::FAILURE;
                }
            }
        }
        i += 1;
    }

    init_logging(verbose);

    let command = match parse_command(&positional, catalog) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("{}", message);
            eprintln!("Try 'rowgraph --help' for usage.");
            return ExitCode::FAILURE;
        }
    };

    let outcome = match command {
        Command::Check { catalog, changes } => check(&catalog, &changes),
        Command::Order { catalog } => order(&catalog),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    if !verbose && std::env::var_os("RUST_LOG").is_none() {
        return;
    }
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_command(positional: &[String], catalog: Option<PathBuf>) -> Result<Command, String> {
    let (name, rest) = positional.split_first().ok_or("No command given")?;
    let catalog = catalog.ok_or("Missing --catalog FILE")?;
    match (name.as_str(), rest) {
        ("check", [changes]) => Ok(Command::Check {
            catalog,
            changes: PathBuf::from(changes),
        }),
        ("check", _) => Err("Usage: rowgraph check --catalog FILE CHANGES".to_string()),
        ("order", []) => Ok(Command::Order { catalog }),
        ("order", _) => Err("Usage: rowgraph order --catalog FILE".to_string()),
        (other, _) => Err(format!("Unknown command: {}", other)),
    }
}

fn check(catalog: &Path, changes: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = Catalog::load(catalog)?;
    let json = std::fs::read_to_string(changes)?;
    let batch = ChangeDecoder::with_catalog(&catalog).decode_str(&json)?;

    let mut counts: BTreeMap<ChangeKind, usize> = BTreeMap::new();
    for (index, change) in batch.iter().enumerate() {
        validate_change(&catalog, change).map_err(|e| format!("change {}: {}", index, e))?;
        *counts.entry(change.kind()).or_default() += 1;
        println!("{}", change);
    }

    let summary: Vec<String> = counts.iter().map(|(kind, n)| format!("{} {}", n, kind)).collect();
    if summary.is_empty() {
        println!("(0 changes)");
    } else {
        println!("({} changes: {})", batch.len(), summary.join(", "));
    }
    Ok(())
}

fn order(catalog: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = Catalog::load(catalog)?;
    catalog.validate()?;
    for definition in dependency_order(&catalog.definitions()) {
        println!("{}", definition.name);
    }
    Ok(())
}

fn print_help() {
    println!("rowgraph - identity-mapped object graph tools");
    println!();
    println!("Usage: rowgraph [OPTIONS] COMMAND");
    println!();
    println!("Commands:");
    println!("  check CHANGES          Decode and validate a JSON change batch");
    println!("  order                  Print entities in save order, principals first");
    println!();
    println!("Options:");
    println!("  -c, --catalog FILE     Catalog JSON file (required)");
    println!("  -v, --verbose          Enable debug logging (or set RUST_LOG)");
    println!("  -h, --help             Show this help message");
    println!("  --version              Show version");
    println!();
    println!("Examples:");
    println!("  rowgraph check --catalog shop.json batch.json");
    println!("  rowgraph order --catalog shop.json");
}
