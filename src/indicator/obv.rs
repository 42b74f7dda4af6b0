use std::cmp::Ordering;

use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Indicator, close_prices, ensure_prices, volumes};
use crate::model::Candle;

/// On-Balance Volume: running total of volume signed by the close-to-close
/// direction. Starts at 0; unchanged closes add nothing.
pub struct Obv;

impl Obv {
    pub fn calculate_prices(
        &self,
        closes: &[f64],
        vols: &[f64],
    ) -> Result<Vec<f64>, Report<IndicatorError>> {
        ensure_prices(closes)?;
        ensure_prices(vols)?;
        if closes.len() != vols.len() {
            bail!(IndicatorError::InvalidParameter {
                name: format!("{} closes but {} volumes", closes.len(), vols.len()),
            });
        }

        let mut total = 0.0;
        let mut values = Vec::with_capacity(closes.len());
        values.push(total);
        for (i, w) in closes.windows(2).enumerate() {
            match w[1].partial_cmp(&w[0]) {
                Some(Ordering::Greater) => total += vols[i + 1],
                Some(Ordering::Less) => total -= vols[i + 1],
                _ => {}
            }
            values.push(total);
        }
        Ok(values)
    }
}

impl Indicator for Obv {
    fn name(&self) -> &str {
        "obv"
    }

    fn required_candles(&self) -> usize {
        2
    }

    fn calculate(&self, candles: &[Candle]) -> Result<Vec<f64>, Report<IndicatorError>> {
        self.calculate_prices(&close_prices(candles), &volumes(candles))
    }
}
