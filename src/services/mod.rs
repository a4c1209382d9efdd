//! Services Layer
//!
//! Business logic behind each pipeline stage. The pipeline orchestrator and
//! the CLI both call into these; services talk to the broker, the candle
//! cache and the files under the data directory.
//!
//! # Architecture
//!
//! ```text
//! CLI --> Pipeline --> Services --> Broker / Cache / Files
//! ```
//!
//! # Services
//!
//! - `SessionService` - Auth code exchange, day-scoped token reuse
//! - `HoldingsService` - Fetch and persist holdings
//! - `SymbolService` - Contract catalog and instrument lookup
//! - `HistoryService` - Daily candles with caching
//! - `RiskService` - ATR, trailing stop and the report

pub mod session_service;
pub mod holdings_service;
pub mod symbol_service;
pub mod history_service;
pub mod risk_service;

pub use session_service::SessionService;
pub use holdings_service::HoldingsService;
pub use symbol_service::SymbolService;
pub use history_service::HistoryService;
pub use risk_service::{RiskService, RiskSummary};
