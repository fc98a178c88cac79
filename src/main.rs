// src/main.rs

// cas-harness: misuse-injection harness for the CAS-2D sharpening library.
//
// Subcommands:
//   run     run the scenario catalog (or a subset) in isolated workers
//   list    print the catalog
//   worker  internal: run one scenario in this process

use anyhow::Context;
use cas_harness::config::{ComputeBackend, Config, NativeBackend, ReportFormat};
use cas_harness::report::{self, EXIT_OK, EXIT_USAGE};
use cas_harness::runner::{self, ScenarioRunner};
use cas_harness::scenario::{self, Scenario, CATALOG};
use clap::{Args, Parser, Subcommand};
use log::{error, info};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "cas-harness",
    version,
    about = "Misuse-injection harness for the CAS-2D library"
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run scenarios, each in its own worker process, and report verdicts
    Run(RunArgs),
    /// Print the scenario catalog
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Run one scenario in this process, streaming step records on stdout
    #[command(hide = true)]
    Worker { name: String },
}

#[derive(Args)]
struct RunArgs {
    /// Scenarios to run (default: the whole catalog)
    scenarios: Vec<String>,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
    /// Native library implementation
    #[arg(long, value_enum)]
    backend: Option<NativeBackend>,
    /// Compute queue implementation
    #[arg(long, value_enum)]
    compute: Option<ComputeBackend>,
    /// Path of the CAS shared library
    #[arg(long)]
    library: Option<PathBuf>,
    /// Attempts per scenario
    #[arg(long)]
    repeats: Option<u32>,
    /// Bounded wait per attempt, in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// JSON config file (overrides CAS_HARNESS_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,
}

impl RunArgs {
    /// Applies command-line overrides on top of `config`.
    fn apply(&self, config: &mut Config) {
        if let Some(backend) = self.backend {
            config.library.backend = backend;
        }
        if let Some(compute) = self.compute {
            config.compute.backend = compute;
        }
        if let Some(library) = &self.library {
            config.library.path = Some(library.clone());
        }
        if let Some(repeats) = self.repeats {
            config.runner.repeats = repeats;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.runner.timeout_ms = timeout_ms;
        }
        if self.json {
            config.runner.report = ReportFormat::Json;
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; a worker's stdout carries only step records.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Cmd::Run(args) => cmd_run(&args)?,
        Cmd::List { json } => cmd_list(json)?,
        Cmd::Worker { name } => {
            let config = Config::from_handoff()?;
            runner::worker::run_worker(&name, &config)?
        }
    };
    std::process::exit(code);
}

fn cmd_run(args: &RunArgs) -> anyhow::Result<i32> {
    let mut config = match Config::from_env(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Config error: {:#}", e);
            return Ok(EXIT_USAGE);
        }
    };
    args.apply(&mut config);
    info!(
        "Library backend: {:?}, compute backend: {:?}, repeats: {}, timeout: {} ms",
        config.library.backend,
        config.compute.backend,
        config.runner.repeats,
        config.runner.timeout_ms
    );

    let scenarios: Vec<&'static Scenario> = if args.scenarios.is_empty() {
        CATALOG.iter().collect()
    } else {
        let mut selected = Vec::with_capacity(args.scenarios.len());
        for name in &args.scenarios {
            match scenario::find(name) {
                Some(s) => selected.push(s),
                None => {
                    error!("Unknown scenario '{}' (see `cas-harness list`)", name);
                    return Ok(EXIT_USAGE);
                }
            }
        }
        selected
    };

    let runner = ScenarioRunner::new(&config)?;
    let outcomes = runner.run_all(scenarios);

    match config.runner.report {
        ReportFormat::Json => println!("{}", report::render_json(&outcomes)?),
        ReportFormat::Text => print!("{}", report::render_text(&outcomes)),
    }
    Ok(report::exit_code(&outcomes))
}

#[derive(Serialize)]
struct CatalogEntry {
    name: &'static str,
    summary: &'static str,
    violates: scenario::Preconditions,
    expected: scenario::Expectation,
    steps: Vec<String>,
}

fn cmd_list(json: bool) -> anyhow::Result<i32> {
    if json {
        let entries: Vec<CatalogEntry> = CATALOG
            .iter()
            .map(|s| CatalogEntry {
                name: s.name,
                summary: s.summary,
                violates: s.violates,
                expected: s.expected,
                steps: s.steps.iter().map(|step| step.label()).collect(),
            })
            .collect();
        let text = serde_json::to_string_pretty(&entries).context("Failed to serialize catalog")?;
        println!("{}", text);
        return Ok(EXIT_OK);
    }

    for s in CATALOG {
        println!("{:<28} {:<26} {}", s.name, s.expected.to_string(), s.violates);
        println!("    {}", s.summary);
    }
    Ok(EXIT_OK)
}
