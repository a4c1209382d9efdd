//! Risk calculators
//!
//! Pure functions over a [`CandleSeries`](crate::models::candle::CandleSeries).
//! None of them touch storage or the network.

pub mod atr;
pub mod pct_change;
pub mod trailing_stop;

pub use atr::{calculate_atr, true_ranges, AtrError, DEFAULT_ATR_PERIOD};
pub use pct_change::{percentage_change, percentage_changes};
pub use trailing_stop::{resolve_current_price, StopDecision, TrailingStop, DEFAULT_ATR_MULTIPLIER};
