//! Domain models shared by the pipeline stages

pub mod candle;
pub mod holding;

pub use candle::{Candle, CandleSeries, RawCandle, ValidBar};
pub use holding::{Action, Holding, Lookback, PercentageChanges};
