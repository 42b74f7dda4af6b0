use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::ma::Sma;
use crate::indicator::{Indicator, check_period, close_prices, ensure_prices};
use crate::model::Candle;

pub const BOLLINGER_PERIOD: usize = 20;
pub const BOLLINGER_MULTIPLIER: f64 = 2.0;
/// Half-width of the synthetic band used before the first full window.
/// A placeholder, not a statistically derived band.
pub const BOLLINGER_FALLBACK_BAND_PCT: f64 = 0.05;

/// Upper, middle and lower band, one value per input bar.
#[derive(Debug, Clone, PartialEq)]
pub struct BandLines {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// `(upper, lower)` of the synthetic ±5% band around `price`.
pub fn fallback_band(price: f64) -> (f64, f64) {
    (
        price * (1.0 + BOLLINGER_FALLBACK_BAND_PCT),
        price * (1.0 - BOLLINGER_FALLBACK_BAND_PCT),
    )
}

pub struct BollingerBands {
    period: usize,
    std_dev_multiplier: f64,
}

impl BollingerBands {
    pub fn new(period: usize, std_dev_multiplier: f64) -> Result<Self, Report<IndicatorError>> {
        check_period(period)?;
        if std_dev_multiplier <= 0.0 || !std_dev_multiplier.is_finite() {
            bail!(IndicatorError::InvalidParameter {
                name: "std_dev_multiplier must be > 0".into(),
            });
        }
        Ok(Self {
            period,
            std_dev_multiplier,
        })
    }

    pub fn calculate_prices(&self, prices: &[f64]) -> Result<BandLines, Report<IndicatorError>> {
        ensure_prices(prices)?;

        let sma = Sma::new(self.period)?.calculate_prices(prices)?;
        let mut bands = BandLines {
            upper: Vec::with_capacity(prices.len()),
            middle: Vec::with_capacity(prices.len()),
            lower: Vec::with_capacity(prices.len()),
        };

        for (i, (&price, &middle)) in prices.iter().zip(sma.iter()).enumerate() {
            if i + 1 < self.period {
                let (upper, lower) = fallback_band(price);
                bands.upper.push(upper);
                bands.middle.push(price);
                bands.lower.push(lower);
                continue;
            }

            let window = &prices[i + 1 - self.period..=i];
            // Population standard deviation
            let variance =
                window.iter().map(|&p| (p - middle).powi(2)).sum::<f64>() / self.period as f64;
            let width = self.std_dev_multiplier * variance.sqrt();
            bands.upper.push(middle + width);
            bands.middle.push(middle);
            bands.lower.push(middle - width);
        }

        Ok(bands)
    }

    pub fn calculate_bands(&self, candles: &[Candle]) -> Result<BandLines, Report<IndicatorError>> {
        self.calculate_prices(&close_prices(candles))
    }
}

impl Indicator for BollingerBands {
    fn name(&self) -> &str {
        "bollinger"
    }

    fn required_candles(&self) -> usize {
        self.period
    }

    /// Returns middle band (SMA) values only.
    fn calculate(&self, candles: &[Candle]) -> Result<Vec<f64>, Report<IndicatorError>> {
        Ok(self.calculate_bands(candles)?.middle)
    }
}
