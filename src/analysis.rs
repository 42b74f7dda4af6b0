use chrono::{Days, Utc};
use error_stack::{Report, bail};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::IndicatorError;
use crate::indicator::Indicator;
use crate::indicator::atr::{ATR_PERIOD, Atr};
use crate::indicator::bollinger::{
    BOLLINGER_MULTIPLIER, BOLLINGER_PERIOD, BandLines, BollingerBands, fallback_band,
};
use crate::indicator::ma::{Ema, Sma};
use crate::indicator::macd::{Macd, MacdLines};
use crate::indicator::obv::Obv;
use crate::indicator::rsi::{RSI_PERIOD, Rsi};
use crate::model::{Candle, CandleSeries, kst};

pub const SMA_SHORT_PERIOD: usize = 20;
pub const SMA_MEDIUM_PERIOD: usize = 50;
pub const SMA_LONG_PERIOD: usize = 200;
pub const EMA_PERIOD: usize = 20;

/// Length of a degraded report when the caller supplied no bars at all.
pub const DEGRADED_DEFAULT_LEN: usize = 30;
/// Base price of a degraded report when no valid close exists.
pub const DEGRADED_BASE_PRICE: f64 = 50_000.0;
/// Moving averages in a degraded report stay within ±1% of the base.
pub const DEGRADED_JITTER_PCT: f64 = 0.01;
pub const DEGRADED_RSI_LOW: f64 = 30.0;
pub const DEGRADED_RSI_HIGH: f64 = 70.0;
pub const DEGRADED_ATR_PCT: f64 = 0.015;

/// Which indicator vocabulary a report carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorProfile {
    #[default]
    Crypto,
    /// Adds the 50 and 200 bar simple moving averages.
    Stock,
}

impl IndicatorProfile {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "crypto" => Some(Self::Crypto),
            "stock" => Some(Self::Stock),
            _ => None,
        }
    }

    fn long_averages(self) -> bool {
        matches!(self, Self::Stock)
    }
}

/// Per-bar values of every indicator, index-aligned with the candles.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSeries {
    pub sma20: Vec<f64>,
    pub ema20: Vec<f64>,
    pub rsi14: Vec<f64>,
    pub macd: Vec<f64>,
    pub macd_signal: Vec<f64>,
    pub macd_hist: Vec<f64>,
    pub bb_upper: Vec<f64>,
    pub bb_middle: Vec<f64>,
    pub bb_lower: Vec<f64>,
    pub atr: Vec<f64>,
    pub obv: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sma50: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sma200: Option<Vec<f64>>,
}

/// Value of every indicator at the most recent bar.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSnapshot {
    pub sma20: f64,
    pub ema20: f64,
    pub rsi14: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_hist: f64,
    pub bb_upper: f64,
    pub bb_middle: f64,
    pub bb_lower: f64,
    pub atr: f64,
    pub obv: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sma50: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sma200: Option<f64>,
}

impl IndicatorSeries {
    pub fn len(&self) -> usize {
        self.sma20.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sma20.is_empty()
    }

    fn columns(&self) -> impl Iterator<Item = &Vec<f64>> {
        [
            &self.sma20,
            &self.ema20,
            &self.rsi14,
            &self.macd,
            &self.macd_signal,
            &self.macd_hist,
            &self.bb_upper,
            &self.bb_middle,
            &self.bb_lower,
            &self.atr,
            &self.obv,
        ]
        .into_iter()
        .chain(self.sma50.iter())
        .chain(self.sma200.iter())
    }

    /// Last value of each series, or `None` when the series are empty.
    pub fn snapshot(&self) -> Option<IndicatorSnapshot> {
        Some(IndicatorSnapshot {
            sma20: *self.sma20.last()?,
            ema20: *self.ema20.last()?,
            rsi14: *self.rsi14.last()?,
            macd: *self.macd.last()?,
            macd_signal: *self.macd_signal.last()?,
            macd_hist: *self.macd_hist.last()?,
            bb_upper: *self.bb_upper.last()?,
            bb_middle: *self.bb_middle.last()?,
            bb_lower: *self.bb_lower.last()?,
            atr: *self.atr.last()?,
            obv: *self.obv.last()?,
            sma50: self.sma50.as_ref().and_then(|s| s.last().copied()),
            sma200: self.sma200.as_ref().and_then(|s| s.last().copied()),
        })
    }
}

/// Result of one aggregation. Always structurally complete; `degraded`
/// tells whether the values came from the fallback policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorReport {
    pub market: String,
    pub series: IndicatorSeries,
    /// `MM/DD` labels aligned with the series, for charts only.
    pub date_labels: Vec<String>,
    pub latest: IndicatorSnapshot,
    pub degraded: bool,
    pub dropped_bar_count: usize,
}

/// Run every indicator over `series`.
///
/// Never fails: an empty series or a computation error yields a degraded
/// report of the originally requested length instead.
pub fn compute_indicators(series: &CandleSeries, profile: IndicatorProfile) -> IndicatorReport {
    match compute_series(series, profile) {
        Ok((indicators, latest)) => {
            info!(
                market = series.market(),
                bars = series.len(),
                dropped = series.dropped(),
                "indicators computed"
            );
            IndicatorReport {
                market: series.market().to_owned(),
                date_labels: series
                    .candles()
                    .iter()
                    .map(|c| c.display_time.format("%m/%d").to_string())
                    .collect(),
                series: indicators,
                latest,
                degraded: false,
                dropped_bar_count: series.dropped(),
            }
        }
        Err(e) => {
            warn!(
                market = series.market(),
                bars = series.len(),
                error = %e,
                "indicator computation failed, returning degraded result"
            );
            degraded_report(series, profile)
        }
    }
}

fn compute_series(
    series: &CandleSeries,
    profile: IndicatorProfile,
) -> Result<(IndicatorSeries, IndicatorSnapshot), Report<IndicatorError>> {
    let candles = series.candles();
    if candles.is_empty() {
        bail!(IndicatorError::InsufficientData {
            required: 1,
            available: 0,
        });
    }

    let macd_lines = Macd::standard();
    note_warm_up(series.market(), &macd_lines, candles);
    let MacdLines {
        macd,
        signal,
        histogram,
    } = macd_lines.calculate_full(candles)?;

    let bollinger = BollingerBands::new(BOLLINGER_PERIOD, BOLLINGER_MULTIPLIER)?;
    note_warm_up(series.market(), &bollinger, candles);
    let BandLines {
        upper,
        middle,
        lower,
    } = bollinger.calculate_bands(candles)?;

    let run = |indicator: &dyn Indicator| -> Result<Vec<f64>, Report<IndicatorError>> {
        note_warm_up(series.market(), indicator, candles);
        indicator.calculate(candles)
    };

    let (sma50, sma200) = if profile.long_averages() {
        (
            Some(run(&Sma::new(SMA_MEDIUM_PERIOD)?)?),
            Some(run(&Sma::new(SMA_LONG_PERIOD)?)?),
        )
    } else {
        (None, None)
    };

    let indicators = IndicatorSeries {
        sma20: run(&Sma::new(SMA_SHORT_PERIOD)?)?,
        ema20: run(&Ema::new(EMA_PERIOD)?)?,
        rsi14: run(&Rsi::new(RSI_PERIOD)?)?,
        macd,
        macd_signal: signal,
        macd_hist: histogram,
        bb_upper: upper,
        bb_middle: middle,
        bb_lower: lower,
        atr: run(&Atr::new(ATR_PERIOD)?)?,
        obv: run(&Obv)?,
        sma50,
        sma200,
    };

    for column in indicators.columns() {
        if let Some(index) = column.iter().position(|v| !v.is_finite()) {
            bail!(IndicatorError::NonFinite { index });
        }
    }

    let latest = indicators.snapshot().ok_or_else(|| {
        Report::new(IndicatorError::InsufficientData {
            required: 1,
            available: 0,
        })
    })?;
    Ok((indicators, latest))
}

/// Log indicators whose values are still warm-up placeholders.
fn note_warm_up(market: &str, indicator: &dyn Indicator, candles: &[Candle]) -> bool {
    let required = indicator.required_candles();
    let warming_up = candles.len() < required;
    if warming_up {
        debug!(
            market,
            indicator = indicator.name(),
            required,
            available = candles.len(),
            "indicator still in warm-up"
        );
    }
    warming_up
}

/// Synthetic report used when real computation is impossible.
pub fn degraded_report(series: &CandleSeries, profile: IndicatorProfile) -> IndicatorReport {
    let len = match series.requested_len() {
        0 => DEGRADED_DEFAULT_LEN,
        n => n,
    };
    let base = series
        .candles()
        .iter()
        .rev()
        .map(|c| c.close)
        .find(|close| close.is_finite() && *close > 0.0)
        .unwrap_or(DEGRADED_BASE_PRICE);

    let mut rng = rand::thread_rng();
    let jitter = base * DEGRADED_JITTER_PCT;
    let mut jittered = || -> Vec<f64> {
        (0..len)
            .map(|_| base + rng.gen_range(-jitter..=jitter))
            .collect()
    };
    let sma20 = jittered();
    let ema20 = jittered();
    let (sma50, sma200) = if profile.long_averages() {
        (Some(jittered()), Some(jittered()))
    } else {
        (None, None)
    };
    let rsi14 = (0..len)
        .map(|_| rng.gen_range(DEGRADED_RSI_LOW..=DEGRADED_RSI_HIGH))
        .collect();
    let (upper, lower) = fallback_band(base);

    let indicators = IndicatorSeries {
        sma20,
        ema20,
        rsi14,
        macd: vec![0.0; len],
        macd_signal: vec![0.0; len],
        macd_hist: vec![0.0; len],
        bb_upper: vec![upper; len],
        bb_middle: vec![base; len],
        bb_lower: vec![lower; len],
        atr: vec![base * DEGRADED_ATR_PCT; len],
        obv: vec![0.0; len],
        sma50,
        sma200,
    };
    let latest = indicators.snapshot().unwrap_or_default();

    IndicatorReport {
        market: series.market().to_owned(),
        series: indicators,
        date_labels: trailing_day_labels(len),
        latest,
        degraded: true,
        dropped_bar_count: series.dropped(),
    }
}

/// `MM/DD` labels for the `len` days ending today (KST), oldest first.
fn trailing_day_labels(len: usize) -> Vec<String> {
    let today = Utc::now().with_timezone(&kst()).date_naive();
    (0..len as u64)
        .rev()
        .map(|back| {
            today
                .checked_sub_days(Days::new(back))
                .unwrap_or(today)
                .format("%m/%d")
                .to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_support::{candle_at, candles_from_closes};

    fn series_of(closes: &[f64]) -> CandleSeries {
        CandleSeries::new("KRW-BTC", candles_from_closes(closes), 0)
    }

    fn assert_aligned(report: &IndicatorReport, len: usize) {
        assert_eq!(report.series.len(), len);
        assert_eq!(report.date_labels.len(), len);
        for column in report.series.columns() {
            assert_eq!(column.len(), len);
        }
    }

    #[test]
    fn full_report_is_index_aligned() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + (i % 5) as f64).collect();
        let report = compute_indicators(&series_of(&closes), IndicatorProfile::Crypto);
        assert!(!report.degraded);
        assert_aligned(&report, 40);
        assert!(report.series.sma50.is_none());
        assert!(report.latest.sma50.is_none());
    }

    #[test]
    fn latest_snapshot_matches_last_values() {
        let closes: Vec<f64> = (1..=30).map(f64::from).collect();
        let report = compute_indicators(&series_of(&closes), IndicatorProfile::Crypto);
        let s = &report.series;
        assert_eq!(report.latest.sma20, *s.sma20.last().unwrap());
        assert_eq!(report.latest.rsi14, *s.rsi14.last().unwrap());
        assert_eq!(report.latest.macd_hist, *s.macd_hist.last().unwrap());
        assert_eq!(report.latest.obv, *s.obv.last().unwrap());
        assert_eq!(report.latest.rsi14, 100.0);
    }

    #[test]
    fn stock_profile_adds_long_averages() {
        let closes: Vec<f64> = (1..=60).map(f64::from).collect();
        let report = compute_indicators(&series_of(&closes), IndicatorProfile::Stock);
        assert!(!report.degraded);
        assert_eq!(report.series.sma50.as_ref().map(Vec::len), Some(60));
        // 200 bars not available: flat start echoes the close
        assert_eq!(report.latest.sma200, Some(60.0));
        assert!(report.latest.sma50.is_some());
    }

    #[test]
    fn single_bar_is_not_degraded() {
        let report = compute_indicators(&series_of(&[42.0]), IndicatorProfile::Crypto);
        assert!(!report.degraded);
        assert_eq!(report.latest.obv, 0.0);
        assert_eq!(report.latest.atr, 0.0);
        assert_eq!(report.latest.rsi14, 50.0);
    }

    #[test]
    fn empty_series_degrades_to_default_length() {
        let series = CandleSeries::new("KRW-BTC", vec![], 0);
        let first = compute_indicators(&series, IndicatorProfile::Crypto);
        let second = compute_indicators(&series, IndicatorProfile::Crypto);
        for report in [&first, &second] {
            assert!(report.degraded);
            assert_aligned(report, DEGRADED_DEFAULT_LEN);
        }
    }

    #[test]
    fn degraded_report_keeps_requested_length_and_bounds() {
        let series = CandleSeries::empty("KRW-ETH", 12);
        let report = compute_indicators(&series, IndicatorProfile::Stock);
        assert!(report.degraded);
        assert_eq!(report.dropped_bar_count, 12);
        assert_aligned(&report, 12);

        let jitter = DEGRADED_BASE_PRICE * DEGRADED_JITTER_PCT;
        for v in report.series.sma20.iter().chain(report.series.sma200.as_ref().unwrap()) {
            assert!((v - DEGRADED_BASE_PRICE).abs() <= jitter + 1e-9);
        }
        for v in &report.series.rsi14 {
            assert!((DEGRADED_RSI_LOW..=DEGRADED_RSI_HIGH).contains(v));
        }
        assert_eq!(report.latest.bb_middle, DEGRADED_BASE_PRICE);
    }

    #[test]
    fn non_finite_candle_degrades_around_last_valid_close() {
        let mut candles = candles_from_closes(&[10.0, 11.0]);
        let mut bad = candle_at(5, 12.0);
        bad.high = f64::NAN;
        candles.insert(0, bad);
        let series = CandleSeries::new("KRW-BTC", candles, 0);
        let report = compute_indicators(&series, IndicatorProfile::Crypto);
        assert!(report.degraded);
        assert_aligned(&report, 3);
        // the NaN bar sorts last and its close is still a usable base
        assert_eq!(report.latest.bb_middle, 12.0);
    }

    #[test]
    fn degraded_base_skips_trailing_invalid_closes() {
        let mut candles = candles_from_closes(&[10.0, 11.0]);
        candles.push(candle_at(2, f64::NAN));
        candles.push(candle_at(3, 0.0));
        let series = CandleSeries::new("KRW-BTC", candles, 0);
        let report = compute_indicators(&series, IndicatorProfile::Crypto);
        assert!(report.degraded);
        assert_eq!(report.latest.bb_middle, 11.0);
        assert_eq!(report.latest.atr, 11.0 * DEGRADED_ATR_PCT);
    }

    #[test]
    fn warm_up_follows_required_candles() {
        let candles = candles_from_closes(&[1.0; 20]);
        let sma = Sma::new(SMA_SHORT_PERIOD).unwrap();
        let rsi = Rsi::new(RSI_PERIOD).unwrap();
        assert!(!note_warm_up("KRW-BTC", &sma, &candles));
        assert!(!note_warm_up("KRW-BTC", &rsi, &candles));
        assert!(note_warm_up("KRW-BTC", &Macd::standard(), &candles));
        assert!(note_warm_up("KRW-BTC", &sma, &candles[..19]));
    }

    #[test]
    fn degraded_labels_end_today() {
        let labels = trailing_day_labels(3);
        let today = Utc::now().with_timezone(&kst()).format("%m/%d").to_string();
        assert_eq!(labels.len(), 3);
        assert_eq!(labels[2], today);
    }

    #[test]
    fn report_serializes_with_fixed_vocabulary() {
        let report = compute_indicators(&series_of(&[1.0, 2.0, 3.0]), IndicatorProfile::Crypto);
        let json = serde_json::to_value(&report).unwrap();
        for key in [
            "sma20", "ema20", "rsi14", "macd", "macdSignal", "macdHist", "bbUpper", "bbMiddle",
            "bbLower", "atr", "obv",
        ] {
            assert!(json["series"].get(key).is_some(), "missing series {key}");
            assert!(json["latest"].get(key).is_some(), "missing latest {key}");
        }
        assert!(json["series"].get("sma50").is_none());
        assert_eq!(json["dateLabels"].as_array().unwrap().len(), 3);
        assert_eq!(json["degraded"], false);
        assert_eq!(json["droppedBarCount"], 0);
    }
}
