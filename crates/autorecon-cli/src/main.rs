// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use anyhow::{bail, Context, Result};
use autorecon_config::{
    apply_cli_overrides, apply_environment_overrides, find_config_file, load_config, validate_config,
    AutoreconConfig,
};
use autorecon_observability::{init_logging, CrateDebugFlags, LoggingOptions, DEBUG_ENV};
use autorecon_pipeline::{discover_specimens, load_manifest, BatchReport, Pipeline};
use autorecon_skeleton::{read_swc, MorphometrySummary};
use clap::{Args, Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

/// Automated neuron reconstruction from microscopy slice stacks
#[derive(Parser, Debug)]
#[command(name = "autorecon", version, long_about = None)]
struct Cli {
    /// Configuration file (searched for when omitted, built-in defaults if none is found)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Crates to log at debug level (comma-separated, or `all`). The
    /// `--debug-<crate>` and `--debug-all` forms are accepted too.
    #[arg(long, global = true, value_delimiter = ',')]
    debug: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconstruct a batch of specimens
    Run(RunArgs),
    /// Load and validate the configuration, then print it
    ValidateConfig,
    /// Print the morphometry of an SWC file
    Inspect {
        swc: PathBuf,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Batch manifest (TOML list of specimens)
    #[arg(long, conflicts_with = "input_root", required_unless_present = "input_root")]
    manifest: Option<PathBuf>,

    /// Directory whose sub-directories are specimen stacks
    #[arg(long)]
    input_root: Option<PathBuf>,

    /// Specimens reconstructed concurrently (0 = one per core)
    #[arg(short, long)]
    workers: Option<usize>,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Re-run specimens whose checkpoint records a terminal failure
    #[arg(long)]
    retry_failed: bool,

    /// Leave stage artifacts in the work directory
    #[arg(long)]
    keep_intermediate: bool,

    /// Further overrides, e.g. `--set stitch_policy=average`
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    overrides: Vec<(String, String)>,
}

impl RunArgs {
    fn override_map(&self) -> HashMap<String, String> {
        let mut map: HashMap<String, String> = self.overrides.iter().cloned().collect();
        if let Some(workers) = self.workers {
            map.insert("workers".to_string(), workers.to_string());
        }
        if let Some(dir) = &self.output_dir {
            map.insert("output_dir".to_string(), dir.display().to_string());
        }
        if let Some(dir) = &self.work_dir {
            map.insert("work_dir".to_string(), dir.display().to_string());
        }
        if self.retry_failed {
            map.insert("retry_failed".to_string(), "true".to_string());
        }
        if self.keep_intermediate {
            map.insert("keep_intermediate".to_string(), "true".to_string());
        }
        map
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

/// Split `--debug-<crate>` flags off before clap sees the arguments
fn split_debug_flags<I>(args: I) -> (Vec<String>, CrateDebugFlags)
where
    I: IntoIterator<Item = String>,
{
    let (debug, rest): (Vec<String>, Vec<String>) =
        args.into_iter().partition(|arg| arg.starts_with("--debug-"));
    (rest, CrateDebugFlags::from_args(debug))
}

fn main() -> ExitCode {
    let (args, debug_flags) = split_debug_flags(std::env::args());
    let cli = Cli::parse_from(args);
    match dispatch(cli, debug_flags) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli, debug_flags: CrateDebugFlags) -> Result<ExitCode> {
    match &cli.command {
        Command::Run(args) => run(&cli, args, debug_flags),
        Command::ValidateConfig => {
            let config = load_configuration(cli.config.as_deref(), &HashMap::new())?;
            let rendered = toml::to_string_pretty(&config).context("rendering configuration")?;
            println!("{}", rendered);
            Ok(ExitCode::SUCCESS)
        }
        Command::Inspect { swc } => {
            let graph = read_swc(swc).with_context(|| format!("reading {}", swc.display()))?;
            println!("{}", swc.display());
            println!("{}", MorphometrySummary::of(&graph));
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run(cli: &Cli, args: &RunArgs, mut debug_flags: CrateDebugFlags) -> Result<ExitCode> {
    let config = load_configuration(cli.config.as_deref(), &args.override_map())?;

    for name in &cli.debug {
        debug_flags.merge_spec(name);
    }
    if let Ok(spec) = std::env::var(DEBUG_ENV) {
        debug_flags.merge_spec(&spec);
    }
    let logging = LoggingOptions {
        log_dir: config.logging.log_dir.clone(),
        base_level: config.logging.level.clone(),
        retention_days: config.logging.retention_days,
        retention_runs: config.logging.retention_runs,
    };
    let guard = init_logging(&debug_flags, &logging).context("initializing logging")?;
    info!(
        target: "autorecon-cli",
        "autorecon {} (logs in {})",
        env!("CARGO_PKG_VERSION"),
        guard.log_dir().display()
    );

    let manifest = match (&args.manifest, &args.input_root) {
        (Some(path), _) => load_manifest(path)?,
        (None, Some(root)) => discover_specimens(root)?,
        (None, None) => bail!("either --manifest or --input-root is required"),
    };
    if manifest.specimens.is_empty() {
        warn!(target: "autorecon-cli", "no specimens to reconstruct");
    }

    let pipeline = Pipeline::new(config);
    let context = pipeline.context().clone();
    ctrlc::set_handler(move || context.cancel()).context("installing Ctrl-C handler")?;

    let report = pipeline.run_batch(&manifest.specimens)?;
    print_report(&report);
    Ok(exit_code(&report))
}

fn load_configuration(path: Option<&Path>, overrides: &HashMap<String, String>) -> Result<AutoreconConfig> {
    let config = match path {
        Some(path) => load_config(Some(path), Some(overrides))
            .with_context(|| format!("loading {}", path.display()))?,
        None => match find_config_file() {
            Ok(found) => load_config(Some(&found), Some(overrides))
                .with_context(|| format!("loading {}", found.display()))?,
            Err(_) => {
                let mut config = AutoreconConfig::default();
                apply_environment_overrides(&mut config);
                apply_cli_overrides(&mut config, overrides)?;
                config
            }
        },
    };
    validate_config(&config)?;
    Ok(config)
}

fn print_report(report: &BatchReport) {
    println!(
        "{} specimens: {} done, {} failed, {} cancelled",
        report.total, report.done, report.failed, report.cancelled
    );
    for specimen in &report.specimens {
        let status = match (&specimen.failed_stage, specimen.cancelled) {
            (Some(stage), _) => {
                let review = if specimen.needs_review { " [review]" } else { "" };
                format!(
                    "failed at {}{}: {}",
                    stage,
                    review,
                    specimen.reason.as_deref().unwrap_or("")
                )
            }
            (None, true) => format!("cancelled at {}", specimen.final_state),
            (None, false) => match &specimen.output {
                Some(path) => format!("done -> {}", path.display()),
                None => specimen.final_state.to_string(),
            },
        };
        println!("  {:<24} {}", specimen.specimen_id, status);
    }
}

/// 0 all done, 2 some specimens failed, 130 interrupted
fn exit_code(report: &BatchReport) -> ExitCode {
    if report.cancelled > 0 {
        ExitCode::from(130)
    } else if report.failed > 0 {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    }
}
