//! Common broker types

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Holding as reported by the broker's portfolio endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerHolding {
    #[serde(default)]
    pub nse_trading_symbol: Option<String>,
    #[serde(default)]
    pub bse_trading_symbol: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_quantity: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub average_traded_price: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub previous_day_close: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Historical candle request
#[derive(Debug, Clone, PartialEq)]
pub struct CandleRequest {
    pub exchange: String,
    pub instrument_id: String,
    pub interval: String,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
}

/// Contract catalog entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractEntry {
    pub trading_symbol: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub instrument_id: Option<String>,
    pub exchange: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Accept numbers, numeric strings and null
fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

/// Instrument ids arrive as either numbers or strings
fn lenient_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    })
}
