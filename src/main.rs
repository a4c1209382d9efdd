//! Portfolio Risk CLI
//!
//! Commands:
//! - `run` - full pipeline: session, holdings, candles, ATR report
//! - `stage` - one pipeline stage on its own
//! - `refresh-contracts` - download the exchange contract catalog
//! - `report` - print the ATR report
//! - `clean` - delete generated files and logs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use portfolio_risk_lib::config::{AppConfig, PathsConfig, DEFAULT_CONFIG_PATH};
use portfolio_risk_lib::models::holding::{Action, Holding};
use portfolio_risk_lib::pipeline::{Pipeline, Stage};
use portfolio_risk_lib::services::SymbolService;
use portfolio_risk_lib::state::AppState;
use portfolio_risk_lib::storage::{clean_directory, ReportFile};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "portfolio-risk",
    about = "Portfolio Risk - ATR trailing-stop report for broker holdings"
)]
struct Cli {
    /// Path to the JSON config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all four stages, stopping at the first failure.
    Run {
        /// Auth code from the broker login redirect. Saved to the config when new.
        #[arg(long)]
        auth_code: Option<String>,
    },
    /// Run a single stage against the files left by earlier stages.
    Stage {
        stage: StageArg,

        /// Auth code (authenticate stage only).
        #[arg(long)]
        auth_code: Option<String>,
    },
    /// Download the contract catalog for the configured exchange.
    RefreshContracts,
    /// Print the latest ATR report.
    Report,
    /// Delete generated data files and logs.
    Clean,
}

#[derive(Clone, Copy, ValueEnum)]
enum StageArg {
    Authenticate,
    Holdings,
    Candles,
    Risk,
}

impl From<StageArg> for Stage {
    fn from(arg: StageArg) -> Self {
        match arg {
            StageArg::Authenticate => Stage::Authenticate,
            StageArg::Holdings => Stage::FetchHoldings,
            StageArg::Candles => Stage::FetchCandles,
            StageArg::Risk => Stage::ComputeRisk,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Report and clean only touch files, so they need no credentials
    let paths = PathsConfig::load(&cli.config)
        .with_context(|| format!("Failed to read paths from {}", cli.config.display()))?;

    portfolio_risk_lib::init_tracing(&paths.log_dir)?;
    tracing::info!("Starting Portfolio Risk...");

    match cli.command {
        Commands::Run { auth_code } => {
            cmd_run(load_config(&cli.config)?, auth_code.as_deref()).await
        }
        Commands::Stage { stage, auth_code } => {
            cmd_stage(load_config(&cli.config)?, stage.into(), auth_code.as_deref()).await
        }
        Commands::RefreshContracts => cmd_refresh_contracts(load_config(&cli.config)?).await,
        Commands::Report => cmd_report(&paths),
        Commands::Clean => cmd_clean(&paths),
    }
}

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

async fn cmd_run(config: AppConfig, auth_code: Option<&str>) -> Result<()> {
    let mut pipeline = Pipeline::new(AppState::new(config)?);
    let run = pipeline.run(auth_code).await;

    for outcome in &run.outcomes {
        println!("{}", outcome.feedback());
    }

    if !run.succeeded() {
        bail!("Pipeline stopped in state {:?} (run {})", run.state, run.run_id);
    }

    println!("Report: {}", pipeline.state().report_file().path().display());
    Ok(())
}

async fn cmd_stage(config: AppConfig, stage: Stage, auth_code: Option<&str>) -> Result<()> {
    let mut pipeline = Pipeline::new(AppState::new(config)?);
    let outcome = pipeline.run_stage(stage, auth_code).await;

    println!("{}", outcome.feedback());
    if !outcome.ok {
        bail!("{} stage failed", stage);
    }
    Ok(())
}

async fn cmd_refresh_contracts(config: AppConfig) -> Result<()> {
    let state = AppState::new(config)?;
    let count = SymbolService::refresh_contracts(&state).await?;
    println!("Contract catalog refreshed: {} instruments", count);
    Ok(())
}

fn cmd_report(paths: &PathsConfig) -> Result<()> {
    let report = ReportFile::new(paths.report_file());
    let holdings = report.read()?;

    println!(
        "{:<20} {:>8} {:>10} {:>10} {:>10} {:>9} {:>10}  {}",
        "Symbol", "Qty", "Avg", "Last", "High", "ATR", "Stop", "Action"
    );
    println!("{}", "-".repeat(92));

    for h in &holdings {
        print_row(h);
    }

    let sells = holdings
        .iter()
        .filter(|h| h.action == Some(Action::Sell))
        .count();
    println!("\n{} holdings, {} flagged SELL", holdings.len(), sells);
    Ok(())
}

fn print_row(h: &Holding) {
    let fmt = |v: Option<f64>| v.map(|x| format!("{:.2}", x)).unwrap_or_else(|| "-".to_string());
    println!(
        "{:<20} {:>8} {:>10.2} {:>10} {:>10} {:>9} {:>10}  {}",
        h.display_symbol(),
        h.quantity,
        h.purchase_price,
        fmt(h.last_close),
        fmt(h.highest_price_in_period),
        fmt(h.atr_value),
        fmt(h.trailing_stop_loss),
        h.action.map(|a| a.to_string()).unwrap_or_else(|| "-".to_string()),
    );
}

fn cmd_clean(paths: &PathsConfig) -> Result<()> {
    let mut removed = 0;
    for dir in [&paths.log_dir, &paths.data_dir] {
        println!("Clearing {}...", dir.display());
        removed += clean_directory(dir)?;
    }
    println!("Cleanup complete. {} files removed.", removed);
    Ok(())
}
