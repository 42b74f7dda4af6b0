use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::ma::Ema;
use crate::indicator::{Indicator, close_prices, ensure_prices};
use crate::model::Candle;

pub const MACD_FAST_PERIOD: usize = 12;
pub const MACD_SLOW_PERIOD: usize = 26;
pub const MACD_SIGNAL_PERIOD: usize = 9;

/// MACD line, signal line and histogram, each one value per input bar.
#[derive(Debug, Clone, PartialEq)]
pub struct MacdLines {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub struct Macd {
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
}

impl Macd {
    pub fn new(
        fast_period: usize,
        slow_period: usize,
        signal_period: usize,
    ) -> Result<Self, Report<IndicatorError>> {
        if fast_period == 0 || slow_period == 0 || signal_period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "all periods must be > 0".into(),
            });
        }
        if fast_period >= slow_period {
            bail!(IndicatorError::InvalidParameter {
                name: "fast_period must be < slow_period".into(),
            });
        }
        Ok(Self {
            fast_period,
            slow_period,
            signal_period,
        })
    }

    /// The standard 12/26/9 configuration.
    pub fn standard() -> Self {
        Self {
            fast_period: MACD_FAST_PERIOD,
            slow_period: MACD_SLOW_PERIOD,
            signal_period: MACD_SIGNAL_PERIOD,
        }
    }

    pub fn calculate_prices(&self, prices: &[f64]) -> Result<MacdLines, Report<IndicatorError>> {
        ensure_prices(prices)?;

        // Full-history EMAs are already index-aligned, no offset needed.
        let fast_ema = Ema::new(self.fast_period)?.calculate_prices(prices)?;
        let slow_ema = Ema::new(self.slow_period)?.calculate_prices(prices)?;

        let macd: Vec<f64> = fast_ema
            .iter()
            .zip(slow_ema.iter())
            .map(|(f, s)| f - s)
            .collect();
        let signal = Ema::new(self.signal_period)?.calculate_prices(&macd)?;
        let histogram = macd.iter().zip(signal.iter()).map(|(m, s)| m - s).collect();

        Ok(MacdLines {
            macd,
            signal,
            histogram,
        })
    }

    pub fn calculate_full(&self, candles: &[Candle]) -> Result<MacdLines, Report<IndicatorError>> {
        self.calculate_prices(&close_prices(candles))
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        "macd"
    }

    fn required_candles(&self) -> usize {
        self.slow_period + self.signal_period
    }

    /// Returns MACD line values only.
    fn calculate(&self, candles: &[Candle]) -> Result<Vec<f64>, Report<IndicatorError>> {
        Ok(self.calculate_full(candles)?.macd)
    }
}
