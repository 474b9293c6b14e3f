#![doc = include_str!("../README.md")]

use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;

use clap::{ArgGroup, Parser};
use figment::providers::Serialized;
use rotor_harness::config::ConfigError;
use rotor_harness::{run_unit_suite, HarnessConfig, Orchestrator, SolverBackend, EXIT_HARNESS_FAULT};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "rotor-bench",
    version,
    about = "Check that a binary-to-model translator preserves program behavior"
)]
#[command(group(ArgGroup::new("mode").required(true).args(["integration", "unit"])))]
struct Cli {
    /// Build, translate and check every case of the corpus.
    #[arg(short = 'i', long)]
    integration: bool,

    /// Run the harness contract checks against fixtures.
    #[arg(short = 'u', long)]
    unit: bool,

    /// Corpus root (one directory per case).
    #[arg(long)]
    corpus: Option<PathBuf>,

    /// Configuration file (default: ./rotor.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Build timeout in seconds.
    #[arg(long, value_name = "S")]
    build_timeout: Option<u64>,

    /// Subject timeout in seconds.
    #[arg(long, value_name = "S")]
    run_timeout: Option<u64>,

    /// Solver timeout in seconds.
    #[arg(long, value_name = "S")]
    solver_timeout: Option<u64>,

    /// Worker threads (0 = available parallelism).
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    #[arg(long, value_name = "DIR")]
    work_dir: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    report_dir: Option<PathBuf>,

    /// Solver backend: smtlib | btor2 | exhaustive
    #[arg(long)]
    solver_backend: Option<SolverBackend>,

    /// Solver executable.
    #[arg(long, value_name = "CMD")]
    solver: Option<String>,

    /// Fail the run on inconclusive cases.
    #[arg(long)]
    strict: bool,

    /// Remove the work directory after the report is written.
    #[arg(long)]
    clean: bool,

    /// Output format: text | json
    #[arg(long, default_value = "text")]
    format: OutputFormat,

    /// Debug logging (RUST_LOG takes precedence).
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format '{other}', use 'text' or 'json'")),
        }
    }
}

/// Layer the command-line overrides on top of defaults, file and environment.
fn load_config(cli: &Cli) -> Result<HarnessConfig, ConfigError> {
    if let Some(path) = &cli.config {
        if !path.is_file() {
            return Err(ConfigError::MissingFile {
                path: path.display().to_string(),
            });
        }
    }
    let mut figment = HarnessConfig::figment(cli.config.as_deref());
    if let Some(corpus) = &cli.corpus {
        figment = figment.merge(Serialized::default("corpus", corpus));
    }
    if let Some(dir) = &cli.work_dir {
        figment = figment.merge(Serialized::default("work_dir", dir));
    }
    if let Some(dir) = &cli.report_dir {
        figment = figment.merge(Serialized::default("report_dir", dir));
    }
    if let Some(workers) = cli.workers {
        figment = figment.merge(Serialized::default("workers", workers));
    }
    if let Some(secs) = cli.build_timeout {
        figment = figment.merge(Serialized::default("toolchain.timeout_secs", secs));
    }
    if let Some(secs) = cli.run_timeout {
        figment = figment.merge(Serialized::default("subject.timeout_secs", secs));
    }
    if let Some(secs) = cli.solver_timeout {
        figment = figment.merge(Serialized::default("solver.timeout_secs", secs));
    }
    if let Some(backend) = cli.solver_backend {
        figment = figment.merge(Serialized::default("solver.backend", backend));
    }
    if let Some(solver) = &cli.solver {
        figment = figment.merge(Serialized::default("solver.command", solver));
    }
    if cli.strict {
        figment = figment.merge(Serialized::default("policy.strict", true));
    }
    if cli.clean {
        figment = figment.merge(Serialized::default("clean", true));
    }
    HarnessConfig::from_figment(figment)
}

fn run_integration(config: HarnessConfig, format: OutputFormat) -> miette::Result<i32> {
    let orchestrator = Orchestrator::from_config(config);
    let report = orchestrator.run_integration()?;
    for path in orchestrator.publish(&report)? {
        info!(path = %path.display(), "report written");
    }
    match format {
        OutputFormat::Text => print!("{}", report.render_summary_text()),
        OutputFormat::Json => print!("{}", report.to_json()?),
    }
    Ok(report.exit_code())
}

fn run_unit(config: HarnessConfig, format: OutputFormat) -> miette::Result<i32> {
    let report = run_unit_suite(&config)?;
    let path = report.write(&config.report_dir)?;
    info!(path = %path.display(), "report written");
    match format {
        OutputFormat::Text => print!("{}", report.render_summary_text()),
        OutputFormat::Json => print!("{}", report.to_json()?),
    }
    Ok(report.exit_code())
}

fn run(cli: Cli) -> miette::Result<i32> {
    let config = load_config(&cli)?;
    info!(
        corpus = %config.corpus.display(),
        backend = %config.solver.backend,
        workers = config.worker_count(),
        strict = config.policy.strict,
        "configuration loaded"
    );
    if cli.unit {
        run_unit(config, cli.format)
    } else {
        run_integration(config, cli.format)
    }
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let code = match run(cli) {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            EXIT_HARNESS_FAULT
        }
    };
    let _ = std::io::stdout().flush();
    std::process::exit(code);
}
