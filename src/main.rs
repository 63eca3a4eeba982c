use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use serde_json::{json, Value};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use strategy_patcher::config::{self, ConfigError, EngineConfig};
use strategy_patcher::diff::display_diff;
use strategy_patcher::index::build_index;
use strategy_patcher::patch::{self, ChangeMode, PatchError};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "strategy-patcher")]
#[command(about = "Structural, verified patching of Python strategy files", long_about = None)]
#[command(version)]
struct Cli {
    /// Engine config (TOML); falls back to $STRATEGY_PATCHER_CONFIG, then defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log resolution and application details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the structural index (classes, functions, params)
    Index { file: PathBuf },

    /// Apply `{edits, dryRun}` read from stdin
    Apply {
        file: PathBuf,

        /// Also print a colored diff to stderr
        #[arg(long)]
        show_diff: bool,
    },

    /// Extract or patch parameter assignments
    Params {
        #[command(subcommand)]
        action: ValueAction,
    },

    /// Extract or patch whitelisted class attributes
    Attrs {
        #[command(subcommand)]
        action: ValueAction,
    },
}

#[derive(Subcommand)]
enum ValueAction {
    /// Print the current values as JSON
    Extract { file: PathBuf },

    /// Apply `{changes, dryRun}` read from stdin
    Apply { file: PathBuf },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}: {}", error_code(&err).red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    // stdout carries the JSON result
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "strategy_patcher=debug" } else { "warn" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn error_code(err: &anyhow::Error) -> &'static str {
    if let Some(patch_err) = err.downcast_ref::<PatchError>() {
        return patch_err.kind().code();
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return "config-error";
    }
    "error"
}

fn run(cli: &Cli) -> Result<()> {
    let config = config::resolve(cli.config.as_deref())?;

    match &cli.command {
        Commands::Index { file } => {
            let index = index_file(file, &config)?;
            emit(&index, cli.pretty)
        }
        Commands::Apply { file, show_diff } => {
            let report = patch::run_apply(file, read_payload()?, &config)?;
            if *show_diff {
                display_diff(&file.display().to_string(), &report.original, &report.content);
            }
            emit(&report, cli.pretty)
        }
        Commands::Params { action } => run_values(ChangeMode::Params, action, &config, cli.pretty),
        Commands::Attrs { action } => run_values(ChangeMode::Attrs, action, &config, cli.pretty),
    }
}

fn run_values(mode: ChangeMode, action: &ValueAction, config: &EngineConfig, pretty: bool) -> Result<()> {
    match action {
        ValueAction::Extract { file } => {
            let index = index_file(file, config)?;
            let output = match mode {
                ChangeMode::Params => json!({ "params": index.params }),
                ChangeMode::Attrs => json!({ "attrs": index.attrs }),
            };
            emit(&output, pretty)
        }
        ValueAction::Apply { file } => {
            let report = patch::run_changes(file, mode, read_payload()?, config)?;
            emit(&report, pretty)
        }
    }
}

fn index_file(path: &Path, config: &EngineConfig) -> Result<strategy_patcher::SourceIndex> {
    let source = patch::read_source(path)?;
    let index = build_index(&source, config).map_err(PatchError::from)?;
    Ok(index)
}

/// Read the JSON request from stdin; empty input is an empty object.
fn read_payload() -> Result<Value> {
    let mut raw = String::new();
    io::stdin()
        .read_to_string(&mut raw)
        .map_err(|err| anyhow!("failed to read request from stdin: {err}"))?;
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    let payload = serde_json::from_str(&raw)
        .map_err(|err| PatchError::InvalidPayload(format!("request is not valid JSON: {err}")))?;
    Ok(payload)
}

fn emit(value: &impl Serialize, pretty: bool) -> Result<()> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{rendered}");
    Ok(())
}
