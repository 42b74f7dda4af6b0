pub mod atr;
pub mod bollinger;
pub mod ma;
pub mod macd;
pub mod obv;
pub mod rsi;

use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::model::Candle;

/// A technical analysis indicator that operates on a slice of candles.
///
/// Candles must be in ascending chronological order (oldest first). Output is
/// index-aligned with the input: one value per candle, with each indicator's
/// own warm-up policy filling the bars before its full window exists.
pub trait Indicator: Send {
    /// Unique name of this indicator (e.g., "rsi", "sma").
    fn name(&self) -> &str;

    /// Number of candles needed before values stop being warm-up placeholders.
    fn required_candles(&self) -> usize;

    /// Calculate one value per candle.
    fn calculate(&self, candles: &[Candle]) -> Result<Vec<f64>, Report<IndicatorError>>;
}

/// Extract close prices from a slice of candles.
pub fn close_prices(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

/// Extract volumes from a slice of candles.
pub fn volumes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.volume).collect()
}

/// Reject empty or non-finite input before any arithmetic runs on it.
pub fn ensure_prices(prices: &[f64]) -> Result<(), Report<IndicatorError>> {
    if prices.is_empty() {
        bail!(IndicatorError::InsufficientData {
            required: 1,
            available: 0,
        });
    }
    if let Some(index) = prices.iter().position(|p| !p.is_finite()) {
        bail!(IndicatorError::NonFinite { index });
    }
    Ok(())
}

fn check_period(period: usize) -> Result<(), Report<IndicatorError>> {
    if period == 0 {
        bail!(IndicatorError::InvalidParameter {
            name: "period must be > 0".into(),
        });
    }
    Ok(())
}
