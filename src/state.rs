//! Application state management

use crate::brokers::{create_broker, Broker};
use crate::config::AppConfig;
use crate::db::duckdb::DuckDb;
use crate::db::CandleCache;
use crate::error::Result;
use crate::storage::{HoldingsFile, ReportFile, TokenFile};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Broker session information
#[derive(Clone)]
pub struct BrokerSession {
    pub broker_id: String,
    pub auth_token: String,
    pub authenticated_at: chrono::DateTime<chrono::Utc>,
}

impl std::fmt::Debug for BrokerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerSession")
            .field("broker_id", &self.broker_id)
            .field("auth_token", &"***")
            .field("authenticated_at", &self.authenticated_at)
            .finish()
    }
}

/// State shared by every pipeline stage
pub struct AppState {
    /// Loaded configuration. Authenticate may write a new auth code into it.
    pub config: RwLock<AppConfig>,

    /// Broker adapter
    pub broker: Arc<dyn Broker>,

    /// Candle cache
    pub candle_cache: Arc<dyn CandleCache>,

    /// Current broker session
    pub broker_session: RwLock<Option<BrokerSession>>,

    /// Instrument cache (trading symbol -> instrument id)
    pub instrument_cache: DashMap<String, String>,
}

impl AppState {
    /// Build state with the IIFL adapter and the on-disk candle cache
    pub fn new(config: AppConfig) -> Result<Self> {
        let broker = create_broker("iifl", &config)?;
        let cache = Arc::new(DuckDb::new(&config.paths.candle_cache_file())?);
        Ok(Self::with_parts(config, broker, cache))
    }

    pub fn with_parts(
        config: AppConfig,
        broker: Arc<dyn Broker>,
        candle_cache: Arc<dyn CandleCache>,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            broker,
            candle_cache,
            broker_session: RwLock::new(None),
            instrument_cache: DashMap::new(),
        }
    }

    /// Get current broker session
    pub fn get_broker_session(&self) -> Option<BrokerSession> {
        self.broker_session.read().clone()
    }

    /// Set broker session
    pub fn set_broker_session(&self, session: BrokerSession) {
        *self.broker_session.write() = Some(session);
    }

    pub fn holdings_file(&self) -> HoldingsFile {
        HoldingsFile::new(self.config.read().paths.holdings_file())
    }

    pub fn report_file(&self) -> ReportFile {
        ReportFile::new(self.config.read().paths.report_file())
    }

    pub fn token_file(&self) -> TokenFile {
        TokenFile::new(self.config.read().paths.auth_token_file())
    }
}
