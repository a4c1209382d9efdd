//! ATR trailing stop and SELL/HOLD decision

use crate::models::holding::Action;

pub const DEFAULT_ATR_MULTIPLIER: f64 = 2.5;

/// Outcome of evaluating one position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopDecision {
    pub atr_value: f64,
    pub trailing_stop_loss: f64,
    pub action: Action,
}

/// Trailing-stop evaluator
#[derive(Debug, Clone, Copy)]
pub struct TrailingStop {
    multiplier: f64,
}

impl Default for TrailingStop {
    fn default() -> Self {
        Self::new(DEFAULT_ATR_MULTIPLIER)
    }
}

impl TrailingStop {
    pub fn new(multiplier: f64) -> Self {
        Self { multiplier }
    }

    /// Stop is `highest - m * atr`, floored at the purchase price.
    /// SELL when the current price is at or below the stop.
    pub fn evaluate(
        &self,
        atr_value: f64,
        purchase_price: f64,
        highest_price_in_period: f64,
        current_price: f64,
    ) -> StopDecision {
        let raw_stop = highest_price_in_period - self.multiplier * atr_value;
        let trailing_stop_loss = purchase_price.max(raw_stop);

        let action = if current_price <= trailing_stop_loss {
            Action::Sell
        } else {
            Action::Hold
        };

        StopDecision {
            atr_value,
            trailing_stop_loss,
            action,
        }
    }

    /// Decision used when no ATR is available: never forces a sell
    pub fn fallback(purchase_price: f64) -> StopDecision {
        StopDecision {
            atr_value: 0.0,
            trailing_stop_loss: purchase_price,
            action: Action::Hold,
        }
    }
}

/// Price to compare against the stop: series close, then recorded close, then cost
pub fn resolve_current_price(
    series_close: Option<f64>,
    recorded_last_close: Option<f64>,
    purchase_price: f64,
) -> f64 {
    series_close.or(recorded_last_close).unwrap_or(purchase_price)
}
