//! Symbol Service
//!
//! Handles the contract catalog and trading symbol -> instrument id lookup.

use crate::brokers::types::ContractEntry;
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::storage::write_atomic;
use std::fs;
use std::path::Path;
use tracing::{error, info};

/// Symbol service for business logic
pub struct SymbolService;

impl SymbolService {
    /// Fill the instrument cache from the contract catalog on disk.
    ///
    /// A missing or unreadable catalog leaves the cache empty; every holding
    /// then falls back to its per-row defaults. Returns the entry count.
    pub fn load_instruments(state: &AppState) -> usize {
        let (path, exchange) = {
            let config = state.config.read();
            (
                config.paths.contract_file(&config.fetch.exchange),
                config.fetch.exchange.clone(),
            )
        };

        state.instrument_cache.clear();

        let entries = match Self::read_catalog(&path) {
            Ok(entries) => entries,
            Err(e) => {
                error!("Failed to create instrument ID map: {}", e);
                return 0;
            }
        };

        for entry in entries {
            if entry.exchange.as_deref() != Some(exchange.as_str()) {
                continue;
            }
            if let (Some(symbol), Some(id)) = (entry.trading_symbol, entry.instrument_id) {
                state.instrument_cache.insert(symbol, id);
            }
        }

        let count = state.instrument_cache.len();
        info!("Created instrument ID map with {} entries", count);
        count
    }

    /// Instrument id for a trading symbol
    pub fn resolve(state: &AppState, trading_symbol: &str) -> Option<String> {
        state
            .instrument_cache
            .get(trading_symbol)
            .map(|entry| entry.value().clone())
    }

    /// Download the contract catalog from the broker, save it and reload the cache
    pub async fn refresh_contracts(state: &AppState) -> Result<usize> {
        let (path, exchange) = {
            let config = state.config.read();
            (
                config.paths.contract_file(&config.fetch.exchange),
                config.fetch.exchange.clone(),
            )
        };

        info!("SymbolService::refresh_contracts - {}", exchange);

        let entries = state.broker.download_contract_file(&exchange).await?;
        write_atomic(&path, &serde_json::to_vec_pretty(&entries)?)?;
        info!("Saved {} contracts to {:?}", entries.len(), path);

        Ok(Self::load_instruments(state))
    }

    fn read_catalog(path: &Path) -> Result<Vec<ContractEntry>> {
        let data = fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                AppError::NotFound(format!("Contract file not found at: {:?}", path))
            }
            _ => AppError::Io(e),
        })?;
        Ok(serde_json::from_str(&data)?)
    }
}
