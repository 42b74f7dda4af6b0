use error_stack::Report;

use crate::error::IndicatorError;
use crate::indicator::{Indicator, check_period, close_prices, ensure_prices};
use crate::model::Candle;

/// Simple Moving Average.
///
/// Bars before the first full window (`i < period - 1`) carry their own close
/// price, so callers never see gaps in the series.
pub struct Sma {
    period: usize,
}

impl Sma {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        check_period(period)?;
        Ok(Self { period })
    }

    /// Calculate SMA values from a price slice.
    pub fn calculate_prices(&self, prices: &[f64]) -> Result<Vec<f64>, Report<IndicatorError>> {
        ensure_prices(prices)?;
        let warmup = prices.len().min(self.period - 1);
        let mut values = Vec::with_capacity(prices.len());
        values.extend_from_slice(&prices[..warmup]);
        values.extend(
            prices
                .windows(self.period)
                .map(|w| w.iter().sum::<f64>() / self.period as f64),
        );
        Ok(values)
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        "sma"
    }

    fn required_candles(&self) -> usize {
        self.period
    }

    fn calculate(&self, candles: &[Candle]) -> Result<Vec<f64>, Report<IndicatorError>> {
        self.calculate_prices(&close_prices(candles))
    }
}

/// Exponential Moving Average over the full history.
///
/// Seeded with the first price; `k = 2 / (period + 1)` is applied from index 0.
pub struct Ema {
    period: usize,
}

impl Ema {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        check_period(period)?;
        Ok(Self { period })
    }

    /// Calculate EMA values from a price slice.
    pub fn calculate_prices(&self, prices: &[f64]) -> Result<Vec<f64>, Report<IndicatorError>> {
        ensure_prices(prices)?;

        let k = 2.0 / (self.period as f64 + 1.0);
        let mut ema = prices[0];
        let mut results = Vec::with_capacity(prices.len());
        results.push(ema);

        for &price in &prices[1..] {
            ema = price * k + ema * (1.0 - k);
            results.push(ema);
        }

        Ok(results)
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        "ema"
    }

    fn required_candles(&self) -> usize {
        self.period
    }

    fn calculate(&self, candles: &[Candle]) -> Result<Vec<f64>, Report<IndicatorError>> {
        self.calculate_prices(&close_prices(candles))
    }
}
