//! Holdings store and ATR report files

use super::write_atomic;
use crate::error::{AppError, Result};
use crate::models::holding::Holding;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// The portfolio positions a pipeline run works on.
///
/// Persisted under a top-level `result` key, the same envelope the broker's
/// holdings endpoint uses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HoldingsStore {
    #[serde(rename = "result")]
    holdings: Vec<Holding>,
}

impl HoldingsStore {
    pub fn new(holdings: Vec<Holding>) -> Self {
        Self { holdings }
    }

    pub fn len(&self) -> usize {
        self.holdings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }

    pub fn holdings(&self) -> &[Holding] {
        &self.holdings
    }

    pub fn holdings_mut(&mut self) -> &mut [Holding] {
        &mut self.holdings
    }

    pub fn get(&self, index: usize) -> Option<&Holding> {
        self.holdings.get(index)
    }
}

/// `holding.json`
#[derive(Debug, Clone)]
pub struct HoldingsFile {
    path: PathBuf,
}

impl HoldingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<HoldingsStore> {
        let data = fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                AppError::NotFound(format!("Holdings file not found: {:?}", self.path))
            }
            _ => AppError::Io(e),
        })?;

        let store: HoldingsStore = serde_json::from_str(&data)?;
        Ok(store)
    }

    pub fn save(&self, store: &HoldingsStore) -> Result<()> {
        let data = serde_json::to_vec_pretty(store)?;
        write_atomic(&self.path, &data)?;
        info!("Saved {} holdings to {:?}", store.len(), self.path);
        Ok(())
    }
}

/// `atr.json`: the enriched holdings as a plain list
#[derive(Debug, Clone)]
pub struct ReportFile {
    path: PathBuf,
}

impl ReportFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, holdings: &[Holding]) -> Result<()> {
        let data = serde_json::to_vec_pretty(holdings)?;
        write_atomic(&self.path, &data)
    }

    pub fn read(&self) -> Result<Vec<Holding>> {
        let data = fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                AppError::NotFound(format!("ATR report not found: {:?}", self.path))
            }
            _ => AppError::Io(e),
        })?;
        Ok(serde_json::from_str(&data)?)
    }
}
