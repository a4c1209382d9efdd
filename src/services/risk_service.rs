//! Risk Service
//!
//! ATR, trailing stop and SELL/HOLD decision for every holding, plus the
//! persisted report.

use crate::analysis::atr::{calculate_atr, AtrError};
use crate::analysis::trailing_stop::{resolve_current_price, StopDecision, TrailingStop};
use crate::error::Result;
use crate::models::holding::Holding;
use crate::state::AppState;
use crate::storage::HoldingsStore;
use tracing::{debug, info, warn};

/// Counts reported after ComputeRisk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskSummary {
    /// Holdings whose ATR was computed
    pub processed: usize,
    pub total: usize,
}

impl std::fmt::Display for RiskSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ATR report ready. Processed {}/{} holdings.",
            self.processed, self.total
        )
    }
}

/// Risk service for business logic
pub struct RiskService;

impl RiskService {
    /// Annotate every holding and write the report
    pub fn compute_risk(state: &AppState, store: &mut HoldingsStore) -> Result<RiskSummary> {
        let (period, multiplier) = {
            let config = state.config.read();
            (config.risk.atr_period, config.risk.atr_multiplier)
        };

        info!(
            "RiskService::compute_risk - {} holdings, ATR-{} x {}",
            store.len(),
            period,
            multiplier
        );

        let summary = Self::annotate(store, period, &TrailingStop::new(multiplier));

        state.report_file().write(store.holdings())?;
        info!("{}", summary);

        Ok(summary)
    }

    /// Annotate holdings in place without touching the filesystem
    pub fn annotate(store: &mut HoldingsStore, period: usize, stop: &TrailingStop) -> RiskSummary {
        let total = store.len();
        let processed = store
            .holdings_mut()
            .iter_mut()
            .map(|holding| Self::evaluate_holding(holding, period, stop))
            .filter(|computed| *computed)
            .count();

        RiskSummary { processed, total }
    }

    /// Set ATR, stop and action on one holding. Returns whether ATR was computed.
    pub fn evaluate_holding(holding: &mut Holding, period: usize, stop: &TrailingStop) -> bool {
        let symbol = holding.display_symbol().to_string();

        let (series, highest) = match (&holding.historical_data, holding.highest_price_in_period) {
            (Some(series), Some(highest)) => (series, highest),
            _ => {
                warn!(
                    "Skipping {}: missing required data (highest_price_in_period or historical_data)",
                    symbol
                );
                Self::apply(holding, TrailingStop::fallback(holding.purchase_price));
                return false;
            }
        };

        let atr_value = match calculate_atr(series, period) {
            Ok(atr) => atr,
            Err(AtrError::InsufficientData { valid, required }) => {
                warn!(
                    "Skipping {}: not enough valid candle data ({} days) for ATR-{}",
                    symbol, valid, required
                );
                Self::apply(holding, TrailingStop::fallback(holding.purchase_price));
                return false;
            }
            Err(e) => {
                warn!("Skipping {}: {}", symbol, e);
                Self::apply(holding, TrailingStop::fallback(holding.purchase_price));
                return false;
            }
        };

        let series_close = series.valid_bars().last().map(|bar| bar.close);
        let current_price =
            resolve_current_price(series_close, holding.last_close, holding.purchase_price);

        let decision = stop.evaluate(atr_value, holding.purchase_price, highest, current_price);
        debug!(
            "{}: ATR={:.2}, TSL={:.2}, Action={}",
            symbol, decision.atr_value, decision.trailing_stop_loss, decision.action
        );

        Self::apply(holding, decision);
        true
    }

    fn apply(holding: &mut Holding, decision: StopDecision) {
        holding.atr_value = Some(decision.atr_value);
        holding.trailing_stop_loss = Some(decision.trailing_stop_loss);
        holding.action = Some(decision.action);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brokers::types::BrokerHolding;
    use crate::models::candle::{Candle, CandleSeries};
    use crate::models::holding::{Action, PercentageChanges};
    use serde_json::json;

    fn holding(purchase: f64) -> Holding {
        let raw: BrokerHolding = serde_json::from_value(json!({
            "nseTradingSymbol": "TCS-EQ",
            "totalQuantity": 5,
            "averageTradedPrice": purchase,
            "previousDayClose": 100.0
        }))
        .unwrap();
        Holding::from_broker(raw)
    }

    /// 14 bars with a true range of 2.0 each, closing at `last_close`
    fn flat_series(last_close: f64) -> CandleSeries {
        let mut bars: Vec<Candle> = (0..13).map(|_| Candle::new(101.0, 99.0, 100.0)).collect();
        bars.push(Candle::new(101.0, 99.0, last_close));
        CandleSeries::new(bars)
    }

    #[test]
    fn test_holding_with_enough_data_is_processed() {
        let mut h = holding(90.0);
        h.apply_candles(flat_series(100.0), PercentageChanges::new());

        assert!(RiskService::evaluate_holding(&mut h, 14, &TrailingStop::default()));
        assert!((h.atr_value.unwrap() - 2.0).abs() < 1e-9);
        // 101 - 2.5 * 2 = 96
        assert!((h.trailing_stop_loss.unwrap() - 96.0).abs() < 1e-9);
        assert_eq!(h.action, Some(Action::Hold));
    }

    #[test]
    fn test_close_below_stop_sells() {
        let mut h = holding(90.0);
        h.apply_candles(flat_series(95.5), PercentageChanges::new());

        assert!(RiskService::evaluate_holding(&mut h, 14, &TrailingStop::default()));
        assert_eq!(h.action, Some(Action::Sell));
    }

    #[test]
    fn test_insufficient_data_gets_fallback() {
        let mut h = holding(90.0);
        let short = CandleSeries::new(vec![Candle::new(101.0, 99.0, 100.0); 5]);
        h.apply_candles(short, PercentageChanges::new());

        assert!(!RiskService::evaluate_holding(&mut h, 14, &TrailingStop::default()));
        assert_eq!(h.atr_value, Some(0.0));
        assert_eq!(h.trailing_stop_loss, Some(90.0));
        assert_eq!(h.action, Some(Action::Hold));
    }

    #[test]
    fn test_missing_candles_gets_fallback() {
        let mut h = holding(90.0);

        assert!(!RiskService::evaluate_holding(&mut h, 14, &TrailingStop::default()));
        assert_eq!(h.trailing_stop_loss, Some(90.0));
        assert_eq!(h.action, Some(Action::Hold));
    }

    #[test]
    fn test_summary_counts_only_computed_rows() {
        let mut ok = holding(90.0);
        ok.apply_candles(flat_series(100.0), PercentageChanges::new());
        let mut failed = holding(50.0);
        failed.clear_candles();

        let mut store = HoldingsStore::new(vec![ok, failed]);
        let summary = RiskService::annotate(&mut store, 14, &TrailingStop::default());

        assert_eq!(summary, RiskSummary { processed: 1, total: 2 });
        assert_eq!(
            summary.to_string(),
            "ATR report ready. Processed 1/2 holdings."
        );
    }
}
