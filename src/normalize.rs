pub mod daily;
pub mod kline;
pub mod upbit;

use chrono::{DateTime, FixedOffset, Utc};
use error_stack::{Report, ResultExt, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::NormalizeError;
use crate::model::{Candle, CandleSeries, SourceKind};

/// Raw bars as delivered by one market-data source.
///
/// Serialized as `{"source": "<tag>", "bars": ...}`. Bars stay untyped JSON
/// until normalization so that one malformed bar only drops itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "bars", rename_all = "snake_case")]
pub enum RawBars {
    /// Positional arrays `[openTime, open, high, low, close, volume, ...]`.
    BinanceKlines(Vec<Value>),
    /// Candle objects with `candle_date_time_utc`, `opening_price`, ...
    UpbitCandles(Vec<Value>),
    /// `"YYYY-MM-DD" -> {open, high, low, close, volume}`.
    DailySeries(serde_json::Map<String, Value>),
}

impl RawBars {
    pub fn source(&self) -> SourceKind {
        match self {
            Self::BinanceKlines(_) => SourceKind::Binance,
            Self::UpbitCandles(_) => SourceKind::Upbit,
            Self::DailySeries(_) => SourceKind::DailySeries,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::BinanceKlines(rows) | Self::UpbitCandles(rows) => rows.len(),
            Self::DailySeries(days) => days.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wrap an untagged payload exactly as the source returned it.
    ///
    /// A daily payload may still carry its `"Time Series (Daily)"` envelope.
    pub fn from_payload(source: SourceKind, payload: Value) -> Result<Self, serde_json::Error> {
        Ok(match source {
            SourceKind::Binance => Self::BinanceKlines(serde_json::from_value(payload)?),
            SourceKind::Upbit => Self::UpbitCandles(serde_json::from_value(payload)?),
            SourceKind::DailySeries => {
                let payload = match payload {
                    Value::Object(mut outer) if outer.contains_key(DAILY_SERIES_ENVELOPE) => outer
                        .remove(DAILY_SERIES_ENVELOPE)
                        .unwrap_or(Value::Object(outer)),
                    other => other,
                };
                Self::DailySeries(serde_json::from_value(payload)?)
            }
        })
    }
}

const DAILY_SERIES_ENVELOPE: &str = "Time Series (Daily)";

/// Convert raw source bars into an ordered [`CandleSeries`].
///
/// Never fails: bars that cannot be parsed, or that violate the candle
/// invariant, are dropped and counted in [`CandleSeries::dropped`].
pub fn normalize(market: &str, raw: RawBars) -> CandleSeries {
    let source = raw.source();
    let parsed: Vec<Result<Candle, Report<NormalizeError>>> = match raw {
        RawBars::BinanceKlines(rows) => rows
            .into_iter()
            .map(|row| kline::parse_bar(market, row))
            .collect(),
        RawBars::UpbitCandles(rows) => rows
            .into_iter()
            .map(|row| upbit::parse_bar(market, row))
            .collect(),
        RawBars::DailySeries(days) => days
            .into_iter()
            .map(|(date, row)| daily::parse_bar(market, &date, row))
            .collect(),
    };

    let mut candles = Vec::with_capacity(parsed.len());
    let mut dropped = 0;
    for (index, result) in parsed.into_iter().enumerate() {
        match result {
            Ok(candle) => candles.push(candle),
            Err(e) => {
                dropped += 1;
                debug!(market, source = %source, index, error = %e, "dropping malformed bar");
            }
        }
    }

    let series = CandleSeries::new(market, candles, dropped);
    if series.dropped() > 0 {
        warn!(
            market,
            source = %source,
            dropped = series.dropped(),
            kept = series.len(),
            "bars dropped during normalization"
        );
    }
    series
}

/// A JSON number or a numeric string such as `"42000.50"`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "NumberRepr")]
pub(crate) struct Decimal(pub f64);

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberRepr {
    Number(f64),
    Text(String),
}

impl TryFrom<NumberRepr> for Decimal {
    type Error = String;

    fn try_from(repr: NumberRepr) -> Result<Self, Self::Error> {
        match repr {
            NumberRepr::Number(n) => Ok(Self(n)),
            NumberRepr::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(Self)
                .map_err(|e| format!("invalid number {s:?}: {e}")),
        }
    }
}

/// Source-independent fields of one bar, before validation.
pub(crate) struct BarFields {
    pub open_time: DateTime<Utc>,
    pub display_offset: FixedOffset,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Option<Decimal>,
    pub volume: Option<Decimal>,
    /// Optional, so kept untyped: a bad value is estimated, never fatal.
    pub notional: Option<Value>,
}

pub(crate) fn build_candle(
    market: &str,
    source: SourceKind,
    bar: BarFields,
) -> Result<Candle, Report<NormalizeError>> {
    let open = require("open", bar.open)?;
    let high = require("high", bar.high)?;
    let low = require("low", bar.low)?;
    let close = require("close", bar.close)?;
    let volume = require("volume", bar.volume)?;

    let (notional, notional_estimated) = match bar.notional.and_then(reported_notional) {
        Some(reported) => (reported, false),
        // Approximation only; not a trade-weighted value.
        None => (check_number("notional", volume * close)?, true),
    };

    if !(low <= open && open <= high && low <= close && close <= high) {
        bail!(NormalizeError::PriceRange {
            open,
            high,
            low,
            close,
        });
    }

    Ok(Candle {
        market: market.to_owned(),
        source,
        open_time: bar.open_time,
        display_time: bar.open_time.with_timezone(&bar.display_offset),
        open,
        high,
        low,
        close,
        volume,
        notional,
        notional_estimated,
    })
}

/// The source's notional if it is a usable number, else `None`.
fn reported_notional(raw: Value) -> Option<f64> {
    let parsed = serde_json::from_value::<Decimal>(raw.clone())
        .change_context(NormalizeError::InvalidNumber {
            field: "notional".into(),
        })
        .and_then(|Decimal(v)| check_number("notional", v));
    match parsed {
        Ok(v) => Some(v),
        Err(e) => {
            debug!(value = %raw, error = %e, "unusable notional, estimating instead");
            None
        }
    }
}

fn require(field: &str, value: Option<Decimal>) -> Result<f64, Report<NormalizeError>> {
    match value {
        Some(Decimal(v)) => check_number(field, v),
        None => Err(Report::new(NormalizeError::MissingField {
            field: field.to_owned(),
        })),
    }
}

fn check_number(field: &str, value: f64) -> Result<f64, Report<NormalizeError>> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(Report::new(NormalizeError::InvalidNumber {
            field: field.to_owned(),
        })
        .attach(format!("value: {value}")))
    }
}
