//! CAT Tracker CLI - severe-weather outlook risk for counties and markets

// Global invariants enforced:
// - Deterministic output ordering
// - Identical input yields byte-for-byte identical output
// - Results go to stdout, logs go to stderr

use anyhow::Context;
use cattrack_core::config::{self, ResolvedConfig};
use cattrack_core::confirm::Alert;
use cattrack_core::polygon::load_outlook_dir;
use cattrack_core::units::parse_boundary_file;
use cattrack_core::{
    render_json, render_text, run_pipeline, ConfirmationSignals, PipelineOptions, RunReport,
    UnitCatalog,
};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cattrack")]
#[command(about = "Map severe-weather outlooks onto counties, markets and demand windows")]
#[command(version = env!("CATTRACK_VERSION"))]
struct Cli {
    /// Log filter (CATTRACK_LOG takes precedence)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Only log errors
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Flag counties at risk for each forecast day
    Scan {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Roll flagged counties up into markets and demand windows
    Markets {
        #[command(flatten)]
        input: InputArgs,

        /// Date of the forecast run (default: today)
        #[arg(long)]
        run_date: Option<NaiveDate>,

        /// Alerts JSON: region abbreviation -> list of {event, certainty}
        #[arg(long)]
        alerts: Option<PathBuf>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args)]
struct InputArgs {
    /// Directory holding the outlook layer GeoJSON files
    #[arg(long)]
    outlooks: PathBuf,

    /// County boundary GeoJSON file
    #[arg(long)]
    counties: PathBuf,

    /// Comma-separated region abbreviations (overrides config file)
    #[arg(long, value_delimiter = ',')]
    regions: Vec<String>,

    /// Categorical minimum for this run only (1-6)
    #[arg(long)]
    categorical_min: Option<u8>,

    /// Output format
    #[arg(long, default_value = "text")]
    format: OutputFormat,

    /// Path to config file (default: auto-discover)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a config file without running the pipeline
    Validate {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show the resolved configuration (merged defaults + config file)
    Show {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn init_logging(level: &str, quiet: bool) {
    let fallback = if quiet { "error" } else { level };
    let filter =
        EnvFilter::try_from_env("CATTRACK_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.quiet);

    match cli.command {
        Commands::Scan { input } => {
            let config = load_config(&input)?;
            let run_date = chrono::Local::now().date_naive();
            let report = run(&input, &config, run_date, ConfirmationSignals::none(), false)?;
            print_report(&report, input.format)?;
        }
        Commands::Markets {
            input,
            run_date,
            alerts,
        } => {
            let config = load_config(&input)?;
            if config.markets.is_empty() {
                anyhow::bail!("no markets configured; add a \"markets\" list to the config file");
            }
            let confirmations = match alerts {
                Some(path) => load_confirmations(&path, &config)?,
                None => ConfirmationSignals::none(),
            };
            let run_date = run_date.unwrap_or_else(|| chrono::Local::now().date_naive());
            let report = run(&input, &config, run_date, confirmations, true)?;
            print_report(&report, input.format)?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Validate { path } => {
                let root = std::env::current_dir()?;
                match config::load_and_resolve(&root, path.as_deref()) {
                    Ok(config) => {
                        if let Some(ref p) = config.config_path {
                            println!("Config valid: {}", p.display());
                        } else {
                            println!("No config file found. Using defaults.");
                        }
                    }
                    Err(e) => {
                        eprintln!("Config validation failed: {:#}", e);
                        std::process::exit(1);
                    }
                }
            }
            ConfigAction::Show { path } => {
                let root = std::env::current_dir()?;
                let resolved = config::load_and_resolve(&root, path.as_deref())
                    .context("failed to load configuration")?;
                print_config(&resolved);
            }
        },
    }

    Ok(())
}

fn load_config(input: &InputArgs) -> anyhow::Result<ResolvedConfig> {
    let root = std::env::current_dir()?;
    let config = config::load_and_resolve(&root, input.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(config_path) = &config.config_path {
        info!("using config: {}", config_path.display());
    }
    Ok(config)
}

/// Load the inputs, run the pipeline and build the report
fn run(
    input: &InputArgs,
    config: &ResolvedConfig,
    run_date: NaiveDate,
    confirmations: ConfirmationSignals,
    with_markets: bool,
) -> anyhow::Result<RunReport> {
    let catalog = load_catalog(&input.counties, &input.regions, config)?;
    let loaded = load_outlook_dir(&input.outlooks)?;
    let mut warnings = loaded.warnings;

    let options = PipelineOptions {
        categorical_override: input.categorical_min,
        run_date,
        confirmations,
    };
    let output = run_pipeline(&loaded.store, &catalog, config, &options)?;
    warnings.extend(output.warnings.iter().cloned());
    if !warnings.is_empty() {
        warn!("skipped {} malformed polygon(s)", warnings.len());
    }

    let mut report = output.into_report(run_date);
    if !with_markets {
        report.markets.clear();
        report.windows.clear();
    }
    Ok(report)
}

fn load_catalog(
    path: &Path,
    cli_regions: &[String],
    config: &ResolvedConfig,
) -> anyhow::Result<UnitCatalog> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read county file: {}", path.display()))?;
    let loaded = parse_boundary_file(&content)
        .with_context(|| format!("failed to parse county file: {}", path.display()))?;
    info!(
        units = loaded.catalog.len(),
        skipped = loaded.skipped,
        "loaded county boundaries"
    );

    let regions: &[String] = if cli_regions.is_empty() {
        config.regions.as_deref().unwrap_or(&[])
    } else {
        cli_regions
    };
    Ok(loaded.catalog.restrict_to_regions(regions))
}

fn load_confirmations(
    path: &Path,
    config: &ResolvedConfig,
) -> anyhow::Result<ConfirmationSignals> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read alerts file: {}", path.display()))?;
    let alerts: BTreeMap<String, Vec<Alert>> = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse alerts file: {}", path.display()))?;
    Ok(ConfirmationSignals::from_alerts(&config.markets, &alerts))
}

fn print_report(report: &RunReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => print!("{}", render_text(report)),
        OutputFormat::Json => println!("{}", render_json(report)?),
    }
    Ok(())
}

fn print_config(resolved: &ResolvedConfig) {
    println!("Configuration:");
    if let Some(ref p) = resolved.config_path {
        println!("  Source: {}", p.display());
    } else {
        println!("  Source: defaults (no config file found)");
    }
    println!();
    println!("Thresholds:");
    println!("  categorical_min: {}", resolved.thresholds.categorical_min);
    println!("  hail_prob_min: {}", resolved.thresholds.hail_prob_min);
    println!("  tornado_prob_min: {}", resolved.thresholds.tornado_prob_min);
    println!("  wind_prob_min: {}", resolved.thresholds.wind_prob_min);
    println!();
    println!("Demand window:");
    println!("  start_days: {}", resolved.offsets.start_days);
    println!("  end_days: {}", resolved.offsets.end_days);
    println!();
    match &resolved.regions {
        Some(regions) => println!("Regions: {}", regions.join(", ")),
        None => println!("Regions: all contiguous"),
    }
    println!("Markets: {}", resolved.markets.len());
    for m in &resolved.markets {
        println!("  {} ({}): {} units", m.short_name, m.name, m.total_units());
    }
}
