//! Holdings Service
//!
//! Handles holdings retrieval and the persisted holdings store.

use crate::error::Result;
use crate::models::holding::Holding;
use crate::state::AppState;
use crate::storage::HoldingsStore;
use tracing::info;

/// Holdings service for business logic
pub struct HoldingsService;

impl HoldingsService {
    /// Fetch live holdings and overwrite the holdings store with them
    pub async fn fetch_holdings(state: &AppState, auth_token: &str) -> Result<HoldingsStore> {
        info!("HoldingsService::fetch_holdings");

        let raw = state.broker.get_holdings(auth_token).await?;
        let store = HoldingsStore::new(raw.into_iter().map(Holding::from_broker).collect());

        Self::save_holdings(state, &store)?;
        Ok(store)
    }

    /// Load the holdings store written by an earlier stage
    pub fn load_holdings(state: &AppState) -> Result<HoldingsStore> {
        let store = state.holdings_file().load()?;
        info!("Loaded {} holdings from disk", store.len());
        Ok(store)
    }

    pub fn save_holdings(state: &AppState, store: &HoldingsStore) -> Result<()> {
        state.holdings_file().save(store)
    }
}
