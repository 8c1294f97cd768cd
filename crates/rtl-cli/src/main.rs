//! Real-Time Loss CLI
//!
//! Command-line interface for rapid loss assessment and operational earthquake
//! loss forecasting.

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use rtl_observability::LoggingConfig;
use std::path::PathBuf;

mod commands;
mod config;
mod engine;
mod io;
mod validator;

use commands::{run_triggers, RunContext};
use config::AppConfig;
use validator::ConfigValidator;

#[derive(Parser)]
#[command(name = "realtime-loss")]
#[command(version)]
#[command(about = "Damage and loss propagation across earthquake sequences", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", default_value = "config.yml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid output format: {}", s)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Process every trigger of triggering.csv
    Run {
        /// Replace the results of a previous run under main_path
        #[arg(long)]
        overwrite: bool,
    },

    /// Validate configuration and inputs
    Validate,

    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match AppConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            if matches!(cli.command, Commands::Run { .. }) {
                return Err(e);
            }
            if cli.verbose {
                eprintln!("Using default configuration ({e:#})");
            }
            AppConfig::default()
        }
    };

    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    rtl_observability::init_logging_with_config(
        LoggingConfig::default()
            .with_level_name(level)
            .with_json(config.logging.json || cli.format == OutputFormat::Json),
    );

    match cli.command {
        Commands::Run { overwrite } => cmd_run(config, overwrite, cli.format),
        Commands::Validate => cmd_validate(&cli.config, config),
        Commands::Config => cmd_config(config, cli.format),
    }
}

fn cmd_run(config: AppConfig, overwrite: bool, format: OutputFormat) -> Result<()> {
    println!("{}", "Validating configuration...".cyan());
    let validation_result = ConfigValidator::validate(&config);
    validation_result.print();
    if validation_result.has_errors() {
        println!();
        println!(
            "{}",
            "Run aborted due to configuration errors. Fix the errors above and try again."
                .red()
                .bold()
        );
        std::process::exit(1);
    }

    let ctx = RunContext::load(config)?;
    let span = rtl_observability::run_span!(ctx.run_id, "triggers");
    let _enter = span.enter();

    println!();
    println!(
        "{} {}",
        "Real-Time Loss run".green().bold(),
        ctx.run_id.to_string()[..8].cyan()
    );
    if !ctx.config.description.is_empty() {
        println!("  {}", ctx.config.description);
    }

    let report = run_triggers(&ctx, overwrite)?;
    let summary = ctx.metrics.summary();

    if format == OutputFormat::Json {
        let out = serde_json::json!({
            "run_id": ctx.run_id,
            "rla_events": report.rla_events,
            "forecasts": report.forecasts,
            "summary": summary,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!("{}", "Run Summary".bold());
        println!("─────────────────────");
        println!("  RLA events:        {}", report.rla_events);
        println!("  Forecasts:         {}", report.forecasts);
        println!("  Events processed:  {}", summary.events_processed);
        println!("  Events skipped:    {}", summary.events_skipped);
        println!("  Engine fallbacks:  {}", summary.engine_fallbacks);
        println!("  Rows clipped:      {}", summary.rows_clipped);
        println!("  Economic loss:     {:.0}", summary.economic_loss);
        for (severity, injuries) in ctx.config.injuries_scale.iter().zip(&summary.injuries) {
            println!("  Injuries ({}):     {:.2}", severity, injuries);
        }
    }

    Ok(())
}

fn cmd_validate(config_path: &std::path::Path, config: AppConfig) -> Result<()> {
    println!(
        "Validating configuration: {}",
        config_path.display().to_string().cyan()
    );

    if let Err(e) = AppConfig::load(config_path) {
        println!("{}: {:#}", "Configuration file error".red().bold(), e);
        std::process::exit(1);
    }

    let validation_result = ConfigValidator::validate(&config);
    validation_result.print();

    println!();
    println!("{}", "Configuration Summary".bold());
    println!("─────────────────────");
    println!("  Main path: {}", config.main_path.display());
    println!("  Damage states: {}", config.mapping_damage_states.len());
    println!("  Injury severities: {}", config.injuries_scale.len());
    println!(
        "  Fragilities: {}",
        if config.engine_settings().state_dependent {
            "state-dependent"
        } else {
            "state-independent"
        }
    );

    if validation_result.has_errors() {
        println!();
        println!(
            "{}",
            "Configuration validation failed. Fix the errors above."
                .red()
                .bold()
        );
        std::process::exit(1);
    } else if validation_result.has_warnings() {
        println!();
        println!(
            "{}",
            "Configuration is valid with warnings. Review the warnings above."
                .yellow()
                .bold()
        );
    } else {
        println!();
        println!("{}", "Configuration is valid.".green().bold());
    }

    Ok(())
}

fn cmd_config(config: AppConfig, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        println!("{}", "Current Configuration".bold());
        println!("─────────────────────────");
        print!("{}", serde_yaml::to_string(&config)?);
    }
    Ok(())
}
