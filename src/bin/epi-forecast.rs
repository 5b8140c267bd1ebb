//! epi-forecast CLI - train models and forecast daily counts for a region
//!
//! ## Example Usage
//!
//! ```bash
//! # Forecast the next 7 days of cases and deaths for France from a SQLite database
//! epi-forecast run --region France --days 7 --db pandemic.db
//!
//! # Reuse stored models, forecast only deaths from a CSV file
//! epi-forecast run --region Spain --no-train --targets new_deaths --csv counts.csv
//!
//! # List stored models
//! epi-forecast models
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use colored::Colorize;
use epi_forecast::data::{CsvSource, DataSource};
use epi_forecast::features::FeatureConfig;
use epi_forecast::model::{GradientBoostingConfig, ModelStore, DEFAULT_TEST_SIZE};
use epi_forecast::pipeline::{ForecastPipeline, RunConfig, RunSummary, TargetOutcome};
use epi_forecast::types::Target;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::time::{Duration, Instant};

/// epi-forecast: short-horizon epidemiological forecasting
#[derive(Parser)]
#[command(name = "epi-forecast")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Forecast daily cases and deaths with gradient-boosted trees", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train (or load) models and forecast the coming days
    Run {
        /// Region to forecast
        #[arg(short = 'r', long, alias = "country", default_value = "France")]
        region: String,

        /// Number of days to forecast
        #[arg(short = 'd', long, default_value = "7")]
        days: usize,

        /// Reuse stored models instead of retraining
        #[arg(long)]
        no_train: bool,

        /// Grid-search boosting parameters before training
        #[arg(long)]
        tune: bool,

        /// Targets to forecast (comma separated)
        #[arg(short = 't', long, value_delimiter = ',')]
        targets: Vec<Target>,

        /// SQLite database with a daily_counts table
        #[arg(long, conflicts_with = "csv")]
        db: Option<PathBuf>,

        /// CSV file with daily counts
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Directory for stored models
        #[arg(long)]
        model_dir: Option<PathBuf>,

        /// Directory for reports
        #[arg(short = 'o', long)]
        output_dir: Option<PathBuf>,

        /// Number of lag features
        #[arg(long)]
        look_back: Option<usize>,
    },

    /// List stored models
    Models {
        /// Directory for stored models
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
}

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Config {
    #[serde(default = "default_model_dir")]
    model_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    output_dir: PathBuf,
    #[serde(default)]
    db_path: Option<PathBuf>,
    #[serde(default)]
    csv_path: Option<PathBuf>,
    #[serde(default = "default_look_back")]
    look_back: usize,
    #[serde(default = "default_test_size")]
    test_size: f64,
    #[serde(default)]
    training: GradientBoostingConfig,
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("visualization")
}

fn default_look_back() -> usize {
    FeatureConfig::default().look_back
}

fn default_test_size() -> f64 {
    DEFAULT_TEST_SIZE
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".epi-forecast").join("config.toml"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            output_dir: default_output_dir(),
            db_path: None,
            csv_path: None,
            look_back: default_look_back(),
            test_size: default_test_size(),
            training: GradientBoostingConfig::default(),
        }
    }
}

impl Config {
    fn load(path: Option<&Path>) -> Self {
        let explicit = path.is_some();
        let Some(config_path) = path.map(Path::to_path_buf).or_else(default_config_path) else {
            return Config::default();
        };
        if !config_path.exists() {
            if explicit {
                eprintln!(
                    "{} Config file {} not found, using defaults",
                    "Warning:".yellow(),
                    config_path.display()
                );
            }
            return Config::default();
        }

        match fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => return config,
                Err(e) => {
                    eprintln!("{} Failed to parse config: {}", "Warning:".yellow(), e);
                }
            },
            Err(e) => {
                eprintln!("{} Failed to read config: {}", "Warning:".yellow(), e);
            }
        }

        Config::default()
    }
}

struct RunArgs {
    region: String,
    days: usize,
    no_train: bool,
    tune: bool,
    targets: Vec<Target>,
    db: Option<PathBuf>,
    csv: Option<PathBuf>,
    model_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    look_back: Option<usize>,
    verbose: bool,
    config: Config,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref());

    if cli.verbose {
        println!(
            "{} v{}",
            "epi-forecast".cyan().bold(),
            env!("CARGO_PKG_VERSION")
        );
        println!(
            "Model dir: {}",
            config.model_dir.display().to_string().dimmed()
        );
    }

    let result = match cli.command {
        Commands::Run {
            region,
            days,
            no_train,
            tune,
            targets,
            db,
            csv,
            model_dir,
            output_dir,
            look_back,
        } => run_forecast(RunArgs {
            region,
            days,
            no_train,
            tune,
            targets,
            db,
            csv,
            model_dir,
            output_dir,
            look_back,
            verbose: cli.verbose,
            config,
        }),

        Commands::Models { model_dir } => list_models(model_dir.unwrap_or(config.model_dir)),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

/// Where the daily counts come from
#[derive(Debug, Clone, PartialEq)]
enum SourceChoice {
    Csv(PathBuf),
    Sqlite(PathBuf),
}

/// Command-line paths win over config paths
fn choose_source(args: &RunArgs) -> Option<SourceChoice> {
    args.csv
        .clone()
        .map(SourceChoice::Csv)
        .or_else(|| args.db.clone().map(SourceChoice::Sqlite))
        .or_else(|| args.config.csv_path.clone().map(SourceChoice::Csv))
        .or_else(|| args.config.db_path.clone().map(SourceChoice::Sqlite))
}

fn open_source(args: &RunArgs) -> anyhow::Result<Box<dyn DataSource>> {
    match choose_source(args) {
        Some(SourceChoice::Csv(csv)) => Ok(Box::new(CsvSource::new(csv))),
        Some(SourceChoice::Sqlite(db)) => open_sqlite(&db),
        None => bail!(
            "no data source: pass --db or --csv, or set db_path/csv_path in the config file"
        ),
    }
}

#[cfg(feature = "rusqlite-support")]
fn open_sqlite(db: &Path) -> anyhow::Result<Box<dyn DataSource>> {
    let source = epi_forecast::data::SqliteSource::open(db)
        .with_context(|| format!("opening database {}", db.display()))?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "rusqlite-support"))]
fn open_sqlite(db: &Path) -> anyhow::Result<Box<dyn DataSource>> {
    bail!(
        "{} is a SQLite database but SQLite support is not compiled in",
        db.display()
    )
}

fn build_run_config(args: &RunArgs) -> RunConfig {
    let targets = if args.targets.is_empty() {
        Target::defaults()
    } else {
        args.targets.clone()
    };

    RunConfig {
        region: args.region.clone(),
        days_ahead: args.days,
        targets,
        features: FeatureConfig::with_look_back(args.look_back.unwrap_or(args.config.look_back)),
        retrain: !args.no_train,
        tune: args.tune,
        training: args.config.training,
        test_size: args.config.test_size,
        model_dir: args
            .model_dir
            .clone()
            .unwrap_or_else(|| args.config.model_dir.clone()),
        output_dir: args
            .output_dir
            .clone()
            .unwrap_or_else(|| args.config.output_dir.clone()),
        ..RunConfig::default()
    }
}

fn run_forecast(args: RunArgs) -> anyhow::Result<()> {
    let run_config = build_run_config(&args);

    if args.verbose {
        println!("  {} {}", "Region:".bold(), run_config.region);
        println!("  {} {}", "Days:".bold(), run_config.days_ahead);
        let targets: Vec<String> = run_config.targets.iter().map(|t| t.to_string()).collect();
        println!("  {} {}", "Targets:".bold(), targets.join(", "));
        println!("  {} {}", "Look-back:".bold(), run_config.features.look_back);
        println!(
            "  {} {}",
            "Mode:".bold(),
            if run_config.retrain { "train" } else { "reuse stored models" }
        );
        println!();
    }

    let source = open_source(&args)?;
    let pipeline = ForecastPipeline::new(run_config).context("invalid run configuration")?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(format!("Forecasting {}...", pipeline.config().region));

    let start = Instant::now();
    let summary = pipeline.run(source.as_ref());
    spinner.finish_and_clear();
    let summary = summary.context("forecast run failed")?;

    print_summary(&summary, args.verbose);
    println!(
        "{} in {:.2}s",
        "Done".green().bold(),
        start.elapsed().as_secs_f64()
    );

    if summary.succeeded() == 0 {
        bail!("no target could be forecast");
    }
    Ok(())
}

fn print_summary(summary: &RunSummary, verbose: bool) {
    println!("{} {}", "Forecast for".cyan().bold(), summary.region.cyan().bold());
    println!();

    for report in &summary.reports {
        match &report.outcome {
            TargetOutcome::Forecasted {
                forecast,
                metrics,
                files,
            } => {
                println!("  {} {}", "✓".green(), report.target.to_string().bold());
                if let Some(metrics) = metrics {
                    println!("    {}", metrics.to_string().dimmed());
                }
                for row in &forecast.rows {
                    println!("    {}  {:>12.1}", row.date, row.predicted_value);
                }
                if verbose {
                    for file in files {
                        println!("    {}", file.display().to_string().dimmed());
                    }
                }
            }
            TargetOutcome::Skipped { reason } => {
                println!(
                    "  {} {} ({})",
                    "-".yellow(),
                    report.target.to_string().bold(),
                    reason
                );
            }
            TargetOutcome::Failed { error } => {
                println!(
                    "  {} {} {}",
                    "✗".red(),
                    report.target.to_string().bold(),
                    error.red()
                );
            }
        }
        println!();
    }

    if let Some(path) = &summary.combined {
        println!("  Combined forecast: {}", path.display());
    }
}

fn list_models(model_dir: PathBuf) -> anyhow::Result<()> {
    let store = ModelStore::new(model_dir);
    let summaries = store
        .list()
        .with_context(|| format!("listing models in {}", store.dir().display()))?;

    if summaries.is_empty() {
        println!("No models in {}", store.dir().display());
        return Ok(());
    }

    println!("{}", "Stored models:".cyan().bold());
    for summary in summaries {
        let metrics = summary
            .metrics
            .map(|m| m.to_string())
            .unwrap_or_else(|| "no metrics".to_string());
        println!(
            "  {} {}  {}",
            summary.key.to_string().bold(),
            summary.trained_at.unwrap_or_default().dimmed(),
            metrics
        );
    }
    Ok(())
}
