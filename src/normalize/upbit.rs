use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::error::NormalizeError;
use crate::model::{Candle, SourceKind, kst};
use crate::normalize::{BarFields, Decimal, build_candle};

/// Upbit REST candle object. Every numeric field is optional here so that a
/// missing value is reported by name instead of as a shape mismatch.
#[derive(Debug, Deserialize)]
struct UpbitBar {
    candle_date_time_utc: String,
    candle_date_time_kst: Option<String>,
    opening_price: Option<Decimal>,
    high_price: Option<Decimal>,
    low_price: Option<Decimal>,
    trade_price: Option<Decimal>,
    candle_acc_trade_volume: Option<Decimal>,
    candle_acc_trade_price: Option<serde_json::Value>,
}

pub(crate) fn parse_bar(
    market: &str,
    value: serde_json::Value,
) -> Result<Candle, Report<NormalizeError>> {
    let bar: UpbitBar = serde_json::from_value(value).change_context(NormalizeError::Malformed {
        shape: "upbit candle".into(),
    })?;

    let utc = parse_timestamp(&bar.candle_date_time_utc)?;
    let open_time = utc.and_utc();
    let display_offset = bar
        .candle_date_time_kst
        .as_deref()
        .and_then(|kst_str| parse_timestamp(kst_str).ok())
        .and_then(|local| display_offset(local, utc))
        .unwrap_or_else(kst);

    build_candle(
        market,
        SourceKind::Upbit,
        BarFields {
            open_time,
            display_offset,
            open: bar.opening_price,
            high: bar.high_price,
            low: bar.low_price,
            close: bar.trade_price,
            volume: bar.candle_acc_trade_volume,
            notional: bar.candle_acc_trade_price,
        },
    )
}

/// Parse `YYYY-MM-DDTHH:MM:SS[.fff][Z]` as a zone-less timestamp.
pub(crate) fn parse_timestamp(value: &str) -> Result<NaiveDateTime, Report<NormalizeError>> {
    let trimmed = value.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f").change_context(
        NormalizeError::Timestamp {
            value: value.to_owned(),
        },
    )
}

fn display_offset(local: NaiveDateTime, utc: NaiveDateTime) -> Option<FixedOffset> {
    let secs = i32::try_from((local - utc).num_seconds()).ok()?;
    FixedOffset::east_opt(secs)
}

/// Exclusive upper bound for the next (older) Upbit page.
pub(crate) fn page_cursor(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    #[derive(Deserialize)]
    struct Cursor {
        candle_date_time_utc: String,
    }

    let cursor = Cursor::deserialize(value).ok()?;
    parse_timestamp(&cursor.candle_date_time_utc)
        .ok()
        .map(|naive| naive.and_utc())
}
