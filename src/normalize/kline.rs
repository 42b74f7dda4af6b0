use std::fmt;

use chrono::DateTime;
use error_stack::{Report, ResultExt};
use serde::de::{self, Deserializer, IgnoredAny, SeqAccess, Visitor};
use serde::Deserialize;

use crate::error::NormalizeError;
use crate::model::{Candle, SourceKind, kst};
use crate::normalize::{BarFields, Decimal, build_candle};

/// Binance kline row:
/// `[open_time, open, high, low, close, volume, close_time, quote_volume, ...]`.
///
/// Only the leading fields are read; trailing elements are ignored so that
/// rows of any length above six are accepted.
#[derive(Debug)]
struct KlineRow {
    open_time: i64,
    open: Option<Decimal>,
    high: Option<Decimal>,
    low: Option<Decimal>,
    close: Option<Decimal>,
    volume: Option<Decimal>,
    quote_volume: Option<serde_json::Value>,
}

impl<'de> Deserialize<'de> for KlineRow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(KlineRowVisitor)
    }
}

struct KlineRowVisitor;

impl<'de> Visitor<'de> for KlineRowVisitor {
    type Value = KlineRow;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a kline array [open_time, open, high, low, close, volume, ...]")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<KlineRow, A::Error> {
        let open_time: i64 = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let mut next = || -> Result<Option<Decimal>, A::Error> {
            Ok(seq.next_element::<Option<Decimal>>()?.flatten())
        };
        let open = next()?;
        let high = next()?;
        let low = next()?;
        let close = next()?;
        let volume = next()?;
        // 6: close_time
        let _ = seq.next_element::<IgnoredAny>()?;
        let quote_volume = seq.next_element::<Option<serde_json::Value>>()?.flatten();
        while seq.next_element::<IgnoredAny>()?.is_some() {}

        Ok(KlineRow {
            open_time,
            open,
            high,
            low,
            close,
            volume,
            quote_volume,
        })
    }
}

pub(crate) fn parse_bar(
    market: &str,
    value: serde_json::Value,
) -> Result<Candle, Report<NormalizeError>> {
    let row: KlineRow = serde_json::from_value(value).change_context(NormalizeError::Malformed {
        shape: "binance kline".into(),
    })?;

    let open_time = DateTime::from_timestamp_millis(row.open_time).ok_or_else(|| {
        Report::new(NormalizeError::Timestamp {
            value: row.open_time.to_string(),
        })
    })?;

    build_candle(
        market,
        SourceKind::Binance,
        BarFields {
            open_time,
            display_offset: kst(),
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            notional: row.quote_volume,
        },
    )
}
