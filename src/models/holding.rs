//! Portfolio holding enriched by the pipeline

use crate::brokers::types::BrokerHolding;
use crate::models::candle::CandleSeries;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Position decision produced by the trailing-stop evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Hold,
    Sell,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Hold => write!(f, "HOLD"),
            Action::Sell => write!(f, "SELL"),
        }
    }
}

/// Named look-back window, measured in trading days
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Lookback {
    #[serde(rename = "1w")]
    OneWeek,
    #[serde(rename = "14d")]
    TwoWeeks,
    #[serde(rename = "1m")]
    OneMonth,
    #[serde(rename = "3m")]
    ThreeMonths,
    #[serde(rename = "6m")]
    SixMonths,
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "3y")]
    ThreeYears,
}

impl Lookback {
    pub const ALL: [Lookback; 7] = [
        Lookback::OneWeek,
        Lookback::TwoWeeks,
        Lookback::OneMonth,
        Lookback::ThreeMonths,
        Lookback::SixMonths,
        Lookback::OneYear,
        Lookback::ThreeYears,
    ];

    pub fn trading_days(self) -> usize {
        match self {
            Lookback::OneWeek => 5,
            // two calendar weeks is ten sessions
            Lookback::TwoWeeks => 10,
            Lookback::OneMonth => 21,
            Lookback::ThreeMonths => 63,
            Lookback::SixMonths => 126,
            Lookback::OneYear => 252,
            Lookback::ThreeYears => 756,
        }
    }
}

/// Window label -> percentage change (`None` when not computable)
pub type PercentageChanges = BTreeMap<Lookback, Option<f64>>;

/// One portfolio position.
///
/// Broker fields keep the broker's camelCase names; fields written by the
/// pipeline use snake_case. Every candle-sourced or derived field is optional
/// so "not computed yet" is distinguishable from a computed zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    #[serde(rename = "nseTradingSymbol", default, skip_serializing_if = "Option::is_none")]
    pub nse_trading_symbol: Option<String>,

    #[serde(rename = "bseTradingSymbol", default, skip_serializing_if = "Option::is_none")]
    pub bse_trading_symbol: Option<String>,

    #[serde(rename = "totalQuantity", default)]
    pub quantity: f64,

    #[serde(rename = "averageTradedPrice", default)]
    pub average_traded_price: f64,

    #[serde(rename = "previousDayClose", default)]
    pub previous_day_close: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument_id: Option<String>,

    pub purchase_price: f64,

    #[serde(default)]
    pub last_close: Option<f64>,

    #[serde(default)]
    pub highest_price_in_period: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub historical_data: Option<CandleSeries>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage_changes: Option<PercentageChanges>,

    #[serde(default)]
    pub atr_value: Option<f64>,

    #[serde(default)]
    pub trailing_stop_loss: Option<f64>,

    #[serde(default)]
    pub action: Option<Action>,

    /// Remaining broker fields, passed through untouched
    #[serde(flatten)]
    pub broker_fields: Map<String, Value>,
}

impl Holding {
    pub fn from_broker(raw: BrokerHolding) -> Self {
        Self {
            nse_trading_symbol: raw.nse_trading_symbol,
            bse_trading_symbol: raw.bse_trading_symbol,
            quantity: raw.total_quantity,
            average_traded_price: raw.average_traded_price,
            previous_day_close: raw.previous_day_close,
            instrument_id: None,
            purchase_price: raw.average_traded_price,
            last_close: None,
            highest_price_in_period: None,
            historical_data: None,
            percentage_changes: None,
            atr_value: None,
            trailing_stop_loss: None,
            action: None,
            broker_fields: raw.extra,
        }
    }

    /// Best display symbol: NSE first, then BSE
    pub fn display_symbol(&self) -> &str {
        self.nse_trading_symbol
            .as_deref()
            .or(self.bse_trading_symbol.as_deref())
            .unwrap_or("Unknown")
    }

    /// Attach a freshly fetched series and the market state derived from it
    pub fn apply_candles(&mut self, series: CandleSeries, changes: PercentageChanges) {
        self.last_close = Some(series.last_close().unwrap_or(self.previous_day_close));
        self.highest_price_in_period =
            Some(series.highest_high().unwrap_or(self.previous_day_close));
        self.historical_data = Some(series);
        self.percentage_changes = Some(changes);
    }

    /// Clear candle-derived fields after a failed fetch
    pub fn clear_candles(&mut self) {
        self.historical_data = Some(CandleSeries::default());
        self.percentage_changes = Some(PercentageChanges::new());
        self.last_close = Some(self.previous_day_close);
        self.highest_price_in_period = Some(self.previous_day_close);
    }
}
