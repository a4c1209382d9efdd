//! Daily candle series

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw candle row as returned by the broker: `[timestamp, open, high, low, close, volume]`
pub type RawCandle = Vec<Value>;

const HIGH_INDEX: usize = 2;
const LOW_INDEX: usize = 3;
const CLOSE_INDEX: usize = 4;

/// One daily bar. A field is `None` when the broker sent nothing usable for it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
}

/// A bar with all three fields present
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidBar {
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    pub fn new(high: f64, low: f64, close: f64) -> Self {
        Self {
            high: Some(high),
            low: Some(low),
            close: Some(close),
        }
    }

    /// Build a bar from a raw broker row. Rows shorter than five columns are rejected.
    pub fn from_row(row: &[Value]) -> Option<Self> {
        if row.len() <= CLOSE_INDEX {
            return None;
        }

        Some(Self {
            high: coerce_f64(&row[HIGH_INDEX]),
            low: coerce_f64(&row[LOW_INDEX]),
            close: coerce_f64(&row[CLOSE_INDEX]),
        })
    }

    pub fn valid(&self) -> Option<ValidBar> {
        Some(ValidBar {
            high: self.high?,
            low: self.low?,
            close: self.close?,
        })
    }
}

/// Numbers pass through, numeric strings are parsed, anything else is missing
fn coerce_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Chronological daily bars for one instrument
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandleSeries(Vec<Candle>);

impl CandleSeries {
    pub fn new(bars: Vec<Candle>) -> Self {
        Self(bars)
    }

    pub fn from_rows(rows: &[RawCandle]) -> Self {
        Self(rows.iter().filter_map(|row| Candle::from_row(row)).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn bars(&self) -> &[Candle] {
        &self.0
    }

    /// Close of the most recent bar, if that bar has one
    pub fn last_close(&self) -> Option<f64> {
        self.0.last().and_then(|c| c.close)
    }

    /// Close `offset` bars before the most recent one (offset 0 is the last bar)
    pub fn close_back(&self, offset: usize) -> Option<f64> {
        let idx = self.0.len().checked_sub(offset + 1)?;
        self.0[idx].close
    }

    /// Highest high over the whole series, ignoring missing values
    pub fn highest_high(&self) -> Option<f64> {
        self.0
            .iter()
            .filter_map(|c| c.high)
            .fold(None, |acc, h| Some(acc.map_or(h, |a: f64| a.max(h))))
    }

    /// Bars with every field present, in order
    pub fn valid_bars(&self) -> Vec<ValidBar> {
        self.0.iter().filter_map(Candle::valid).collect()
    }
}
