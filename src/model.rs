use std::fmt;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

/// Offset used for display timestamps when a source does not carry its own.
pub const KST_OFFSET_SECS: i32 = 9 * 60 * 60;

/// Returns the default display offset (KST, UTC+09:00).
pub fn kst() -> FixedOffset {
    FixedOffset::east_opt(KST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Origin of a raw bar list. Selects the parser used by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Binance,
    Upbit,
    /// Date-keyed daily time series (`"YYYY-MM-DD" -> {open, high, ...}`).
    DailySeries,
}

impl SourceKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "binance" => Some(Self::Binance),
            "upbit" => Some(Self::Upbit),
            "daily_series" => Some(Self::DailySeries),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Binance => "binance",
            Self::Upbit => "upbit",
            Self::DailySeries => "daily_series",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candle timeframe supported by the fetch layer.
///
/// String representations match the config file format (e.g. `"1m"`, `"1h"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeFrame {
    Min1,
    Min3,
    Min5,
    Min15,
    Min30,
    Hour1,
    Hour4,
    Day1,
}

impl TimeFrame {
    /// Parse a config-format string into a `TimeFrame`.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(Self::Min1),
            "3m" => Some(Self::Min3),
            "5m" => Some(Self::Min5),
            "15m" => Some(Self::Min15),
            "30m" => Some(Self::Min30),
            "1h" => Some(Self::Hour1),
            "4h" => Some(Self::Hour4),
            "1d" => Some(Self::Day1),
            _ => None,
        }
    }

    /// Return the config-format string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Min1 => "1m",
            Self::Min3 => "3m",
            Self::Min5 => "5m",
            Self::Min15 => "15m",
            Self::Min30 => "30m",
            Self::Hour1 => "1h",
            Self::Hour4 => "4h",
            Self::Day1 => "1d",
        }
    }

    /// Return the Upbit REST endpoint path segment for this timeframe.
    pub fn upbit_endpoint(self) -> &'static str {
        match self {
            Self::Min1 => "/v1/candles/minutes/1",
            Self::Min3 => "/v1/candles/minutes/3",
            Self::Min5 => "/v1/candles/minutes/5",
            Self::Min15 => "/v1/candles/minutes/15",
            Self::Min30 => "/v1/candles/minutes/30",
            Self::Hour1 => "/v1/candles/minutes/60",
            Self::Hour4 => "/v1/candles/minutes/240",
            Self::Day1 => "/v1/candles/days",
        }
    }

    /// Return the Binance kline interval string for this timeframe.
    pub fn binance_interval(self) -> &'static str {
        // Binance uses the config spelling for every supported frame.
        self.as_str()
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One canonical OHLCV bar.
///
/// Invariant (checked by the normalizer): every price and volume is finite and
/// non-negative, and `low <= open, close <= high`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candle {
    pub market: String,
    pub source: SourceKind,
    pub open_time: DateTime<Utc>,
    /// Same instant as `open_time`, carried in the zone used for reports.
    /// Never used in calculations.
    pub display_time: DateTime<FixedOffset>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Traded notional value. `volume * close` when the source omits it,
    /// see `notional_estimated`.
    pub notional: f64,
    pub notional_estimated: bool,
}

/// Candles of one market, strictly ascending by `open_time`.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleSeries {
    market: String,
    candles: Vec<Candle>,
    dropped: usize,
    requested: usize,
}

impl CandleSeries {
    /// Build a series from candles in any order.
    ///
    /// Candles are sorted by open time; for duplicate timestamps the candle
    /// that came later in `candles` is kept and the others count as dropped.
    pub fn new(market: impl Into<String>, mut candles: Vec<Candle>, dropped: usize) -> Self {
        let requested = candles.len() + dropped;
        // Stable sort keeps input order among equal timestamps.
        candles.sort_by_key(|c| c.open_time);

        let mut ordered: Vec<Candle> = Vec::with_capacity(candles.len());
        let mut collapsed = 0;
        for candle in candles {
            match ordered.last_mut() {
                Some(last) if last.open_time == candle.open_time => {
                    *last = candle;
                    collapsed += 1;
                }
                _ => ordered.push(candle),
            }
        }

        Self {
            market: market.into(),
            candles: ordered,
            dropped: dropped + collapsed,
            requested,
        }
    }

    /// A series with no usable candles out of `requested` raw bars.
    pub fn empty(market: impl Into<String>, requested: usize) -> Self {
        Self {
            market: market.into(),
            candles: Vec::new(),
            dropped: requested,
            requested,
        }
    }

    pub fn market(&self) -> &str {
        &self.market
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Raw bars that did not make it into the series.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Number of raw bars the series was built from, dropped ones included.
    pub fn requested_len(&self) -> usize {
        self.requested
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }
}
