//! DuckDB data models

use crate::models::candle::Candle;

/// Cached bar row
#[derive(Debug, Clone)]
pub struct CandleBarRow {
    pub bar_index: i64,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
}

impl From<CandleBarRow> for Candle {
    fn from(row: CandleBarRow) -> Self {
        Candle {
            high: row.high,
            low: row.low,
            close: row.close,
        }
    }
}

/// Catalog entry describing one cached request
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub fetched_on: String,
    pub bar_count: i64,
}
