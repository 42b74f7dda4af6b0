use error_stack::Report;

use crate::error::IndicatorError;
use crate::indicator::{Indicator, check_period, ensure_prices};
use crate::model::Candle;

pub const ATR_PERIOD: usize = 14;

/// Average True Range as a plain mean of the most recent true ranges.
///
/// `ATR[i]` averages the last `min(period, i)` true ranges ending at bar `i`.
/// Bar 0 has no previous close and reports `0.0`. No Wilder smoothing.
pub struct Atr {
    period: usize,
}

impl Atr {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        check_period(period)?;
        Ok(Self { period })
    }
}

/// True range of each bar against the previous close; one value per bar
/// starting at bar 1.
pub fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    candles
        .windows(2)
        .map(|w| {
            let (prev, cur) = (&w[0], &w[1]);
            let hl = cur.high - cur.low;
            let hc = (cur.high - prev.close).abs();
            let lc = (cur.low - prev.close).abs();
            hl.max(hc).max(lc)
        })
        .collect()
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        "atr"
    }

    fn required_candles(&self) -> usize {
        self.period + 1
    }

    fn calculate(&self, candles: &[Candle]) -> Result<Vec<f64>, Report<IndicatorError>> {
        let prices: Vec<f64> = candles
            .iter()
            .flat_map(|c| [c.high, c.low, c.close])
            .collect();
        ensure_prices(&prices)?;

        let ranges = true_ranges(candles);
        let mut values = Vec::with_capacity(candles.len());
        values.push(0.0);
        for end in 1..=ranges.len() {
            let window = &ranges[end.saturating_sub(self.period)..end];
            values.push(window.iter().sum::<f64>() / window.len() as f64);
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_support::candle_at;

    fn bar(minute: i64, high: f64, low: f64, close: f64) -> Candle {
        let mut c = candle_at(minute, close);
        c.high = high;
        c.low = low;
        c.open = close;
        c
    }

    #[test]
    fn atr_period_zero_invalid() {
        assert!(Atr::new(0).is_err());
    }

    #[test]
    fn atr_single_bar_is_zero() {
        let atr = Atr::new(14).unwrap();
        assert_eq!(atr.calculate(&[bar(0, 11.0, 9.0, 10.0)]).unwrap(), vec![0.0]);
    }

    #[test]
    fn true_range_uses_gap_from_previous_close() {
        let candles = vec![bar(0, 11.0, 9.0, 10.0), bar(1, 15.0, 13.0, 14.0)];
        // high - low = 2, |15 - 10| = 5, |13 - 10| = 3
        assert_eq!(true_ranges(&candles), vec![5.0]);
    }

    #[test]
    fn atr_averages_available_ranges_when_short() {
        let atr = Atr::new(14).unwrap();
        let candles = vec![
            bar(0, 11.0, 9.0, 10.0),
            bar(1, 12.0, 10.0, 11.0),
            bar(2, 15.0, 11.0, 14.0),
        ];
        // ranges: 2, 4
        let values = atr.calculate(&candles).unwrap();
        assert_eq!(values, vec![0.0, 2.0, 3.0]);
    }

    #[test]
    fn atr_uses_most_recent_window() {
        let atr = Atr::new(2).unwrap();
        let candles = vec![
            bar(0, 11.0, 9.0, 10.0),
            bar(1, 12.0, 10.0, 11.0),
            bar(2, 15.0, 11.0, 14.0),
            bar(3, 20.0, 14.0, 18.0),
        ];
        // ranges: 2, 4, 6 -> last window [4, 6]
        let values = atr.calculate(&candles).unwrap();
        assert_eq!(values[3], 5.0);
    }

    #[test]
    fn atr_empty_input_is_an_error() {
        assert!(Atr::new(14).unwrap().calculate(&[]).is_err());
    }
}
