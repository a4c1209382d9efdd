//! History Service
//!
//! Handles daily candle retrieval from the candle cache and the broker API.

use crate::brokers::types::CandleRequest;
use crate::db::CandleCacheKey;
use crate::error::Result;
use crate::models::candle::CandleSeries;
use crate::state::AppState;
use chrono::{Duration, NaiveDate};
use tracing::{debug, warn};

/// History service for business logic
pub struct HistoryService;

impl HistoryService {
    /// Request window ending on `today`. Clamped at the earliest representable date.
    pub fn date_range(today: NaiveDate, history_days: i64) -> (NaiveDate, NaiveDate) {
        let from = Duration::try_days(history_days)
            .and_then(|span| today.checked_sub_signed(span))
            .unwrap_or(NaiveDate::MIN);
        (from, today)
    }

    /// Get the daily candle series for one instrument.
    ///
    /// Tries the candle cache first, then fetches from the broker and stores
    /// non-empty results. Cache failures are logged and otherwise ignored.
    pub async fn get_series(
        state: &AppState,
        auth_token: &str,
        symbol: &str,
        instrument_id: &str,
        today: NaiveDate,
    ) -> Result<CandleSeries> {
        let (exchange, interval, history_days) = {
            let config = state.config.read();
            (
                config.fetch.exchange.clone(),
                config.fetch.interval.clone(),
                config.fetch.history_days,
            )
        };

        let (from_date, to_date) = Self::date_range(today, history_days);
        let key = CandleCacheKey::new(symbol, from_date, to_date);

        match state.candle_cache.get(&key, today) {
            Ok(Some(series)) => {
                debug!(symbol = %symbol, "Candle cache hit ({} bars)", series.len());
                return Ok(series);
            }
            Ok(None) => {}
            Err(e) => warn!(symbol = %symbol, "Candle cache read failed: {}", e),
        }

        debug!("Fetching data for {} (ID: {})", symbol, instrument_id);

        let request = CandleRequest {
            exchange,
            instrument_id: instrument_id.to_string(),
            interval,
            from_date,
            to_date,
        };

        let rows = state.broker.get_candles(auth_token, &request).await?;
        let series = CandleSeries::from_rows(&rows);

        // Empty series are never cached
        if series.is_empty() {
            warn!(symbol = %symbol, "Broker returned no candles");
        } else if let Err(e) = state.candle_cache.put(&key, &series, today) {
            warn!(symbol = %symbol, "Candle cache write failed: {}", e);
        }

        Ok(series)
    }
}
