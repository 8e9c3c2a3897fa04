use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

mod aggregate;
mod config;
mod error;
mod ingest;
mod models;
mod report;

use aggregate::{AbsenceRule, Aggregator};
use config::Config;
use report::Locale;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "absence-report")]
#[command(about = "Absence totals per student and module from an attendance export", long_about = None)]
struct Cli {
    /// Attendance file; defaults to absences.csv next to the executable
    ///
    /// A relative path is looked up in the current directory first, then
    /// next to the executable.
    input: Option<PathBuf>,
    /// Path to a TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Which rows count as absences
    #[arg(long, value_enum)]
    rule: Option<AbsenceRule>,
    /// Header language
    #[arg(long, value_enum)]
    locale: Option<Locale>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    /// Write the report to a file instead of stdout
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,
    #[arg(short, long)]
    verbose: bool,
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        }
    }
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(cli.log_level()).into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install log subscriber: {err}"))
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    if let Some(path) = &cli.config {
        info!("loading config from {}", path.display());
        return Config::load(path);
    }

    match Config::load_default()? {
        Some(config) => {
            info!("loaded {}", config::DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        None => {
            debug!("no config file found, using defaults");
            Ok(Config::default())
        }
    }
}

fn program_dir() -> anyhow::Result<PathBuf> {
    let exe = std::env::current_exe().context("failed to locate the running executable")?;
    Ok(exe
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(".")))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;
    debug!("arguments: {:?}", cli);

    let mut config = load_config(&cli)?;
    if let Some(rule) = cli.rule {
        config.input.absence_rule = rule;
    }
    if let Some(locale) = cli.locale {
        config.report.locale = locale;
    }

    let input = config::resolve_input(
        cli.input.as_deref(),
        &config.input.default_file,
        &program_dir()?,
    );
    info!("reading attendance from {}", input.display());

    let mut aggregator = Aggregator::new(config.input.absence_rule);
    ingest::load_into(&input, config.read_options()?, &mut aggregator)?;
    info!(
        "{} students, {} modules, {} rows ({:?} rule)",
        aggregator.students().len(),
        aggregator.modules().len(),
        aggregator.rows_seen(),
        aggregator.rule()
    );

    let table = report::build_table(&aggregator);
    let mut output = match cli.format {
        OutputFormat::Text => {
            report::render_text(&table, config.layout(), config.report.locale).join("\n")
        }
        OutputFormat::Json => report::render_json(&table, &input.display().to_string())?,
    };
    output.push('\n');

    match cli.out {
        Some(out) => {
            std::fs::write(&out, output)
                .with_context(|| format!("failed to write report to {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        None => print!("{output}"),
    }

    Ok(())
}
