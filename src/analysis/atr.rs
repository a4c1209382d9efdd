//! Average True Range over a daily candle series.
//!
//! True range for bar `i > 0` is
//! `max(high - low, |high - prev_close|, |low - prev_close|)`; bar 0 has no
//! previous close and uses `high - low` alone. The ATR is the simple mean of
//! the last `period` true ranges (not Wilder smoothing).
//!
//! Rows with any missing field are dropped before the true range is taken,
//! so "previous close" always refers to the previous *valid* bar.

use crate::models::candle::{CandleSeries, ValidBar};
use thiserror::Error;

pub const DEFAULT_ATR_PERIOD: usize = 14;

/// Why no ATR could be produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AtrError {
    #[error("insufficient data: {valid} valid bars, {required} required")]
    InsufficientData { valid: usize, required: usize },

    #[error("ATR period must be positive")]
    ZeroPeriod,
}

/// True range of each bar
pub fn true_ranges(bars: &[ValidBar]) -> Vec<f64> {
    let mut ranges = Vec::with_capacity(bars.len());
    let mut prev_close: Option<f64> = None;

    for bar in bars {
        let hl = bar.high - bar.low;
        let tr = match prev_close {
            Some(pc) => hl.max((bar.high - pc).abs()).max((bar.low - pc).abs()),
            None => hl,
        };
        ranges.push(tr);
        prev_close = Some(bar.close);
    }

    ranges
}

/// ATR of the most recent `period` bars
pub fn calculate_atr(series: &CandleSeries, period: usize) -> Result<f64, AtrError> {
    if period == 0 {
        return Err(AtrError::ZeroPeriod);
    }

    let bars = series.valid_bars();
    if bars.len() < period {
        return Err(AtrError::InsufficientData {
            valid: bars.len(),
            required: period,
        });
    }

    let ranges = true_ranges(&bars);
    let window = &ranges[ranges.len() - period..];

    Ok(window.iter().sum::<f64>() / period as f64)
}
