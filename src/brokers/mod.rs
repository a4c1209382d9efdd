//! Broker adapters module

pub mod types;
pub mod iifl;

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::models::candle::RawCandle;
use async_trait::async_trait;
use std::sync::Arc;
use types::*;

/// Broker trait that all broker implementations must implement
#[async_trait]
pub trait Broker: Send + Sync {
    /// Broker ID (e.g., "iifl")
    fn id(&self) -> &'static str;

    /// Exchange an auth code for a session token
    async fn authenticate(&self, credentials: BrokerCredentials) -> Result<AuthResponse>;

    /// Get holdings
    async fn get_holdings(&self, auth_token: &str) -> Result<Vec<BrokerHolding>>;

    /// Get daily candles for one instrument
    async fn get_candles(&self, auth_token: &str, request: &CandleRequest) -> Result<Vec<RawCandle>>;

    /// Download the contract catalog for an exchange
    async fn download_contract_file(&self, exchange: &str) -> Result<Vec<ContractEntry>>;
}

/// Broker credentials for authentication
#[derive(Clone, serde::Deserialize)]
pub struct BrokerCredentials {
    pub client_id: String,
    pub app_secret: String,
    pub auth_code: String,
}

impl std::fmt::Debug for BrokerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerCredentials")
            .field("client_id", &self.client_id)
            .field("app_secret", &"***")
            .field("auth_code", &"***")
            .finish()
    }
}

/// Authentication response from broker
#[derive(Debug, Clone)]
pub struct AuthResponse {
    pub auth_token: String,
}

/// Create the broker adapter named by `id`
pub fn create_broker(id: &str, config: &AppConfig) -> Result<Arc<dyn Broker>> {
    match id {
        "iifl" => Ok(Arc::new(iifl::IiflBroker::new(config)?)),
        other => Err(AppError::Broker(format!("Broker '{}' not found", other))),
    }
}
