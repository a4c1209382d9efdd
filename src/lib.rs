//! Portfolio Risk - daily ATR trailing-stop pipeline
//!
//! Authenticates with the broker, pulls holdings and their daily candles,
//! and marks each position HOLD or SELL against an ATR trailing stop.

pub mod analysis;
pub mod brokers;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod state;
pub mod storage;

use error::Result;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber: stderr plus `<log_dir>/app.log`
pub fn init_tracing(log_dir: &Path) -> Result<()> {
    fs::create_dir_all(log_dir)?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("app.log"))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portfolio_risk=debug,portfolio_risk_lib=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(log_file)),
        )
        .try_init()
        .map_err(|e| error::AppError::Internal(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}
