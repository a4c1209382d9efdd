//! Trailing percentage change over fixed look-back windows

use crate::models::candle::CandleSeries;
use crate::models::holding::{Lookback, PercentageChanges};

/// Change over a window of `days` trading days, rounded to 2 decimals.
///
/// Compares the last close with the close `days` bars earlier. `None` when
/// the series is shorter than `days + 1` bars, either close is missing, or
/// the past close is zero.
pub fn percentage_change(series: &CandleSeries, days: usize) -> Option<f64> {
    if series.len() <= days {
        return None;
    }

    let current = series.last_close()?;
    let past = series.close_back(days)?;
    if past == 0.0 {
        return None;
    }

    Some(round2((current - past) / past * 100.0))
}

/// Every look-back window, in table order
pub fn percentage_changes(series: &CandleSeries) -> PercentageChanges {
    Lookback::ALL
        .iter()
        .map(|&window| (window, percentage_change(series, window.trading_days())))
        .collect()
}

/// Round to 2 decimals from the exact binary value, ties to even
fn round2(value: f64) -> f64 {
    format!("{:.2}", value).parse().unwrap_or(value)
}
