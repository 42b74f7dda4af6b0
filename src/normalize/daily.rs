use chrono::NaiveDate;
use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::error::NormalizeError;
use crate::model::{Candle, SourceKind, kst};
use crate::normalize::{BarFields, Decimal, build_candle};

/// One day of a date-keyed series. Accepts both plain names and the
/// numbered Alpha Vantage names (`"1. open"`, ...).
#[derive(Debug, Deserialize)]
struct DailyBar {
    #[serde(alias = "1. open")]
    open: Option<Decimal>,
    #[serde(alias = "2. high")]
    high: Option<Decimal>,
    #[serde(alias = "3. low")]
    low: Option<Decimal>,
    #[serde(alias = "4. close")]
    close: Option<Decimal>,
    #[serde(alias = "5. volume")]
    volume: Option<Decimal>,
}

/// Parse one `"YYYY-MM-DD" -> {...}` entry. The bar opens at UTC midnight.
pub(crate) fn parse_bar(
    market: &str,
    date: &str,
    value: serde_json::Value,
) -> Result<Candle, Report<NormalizeError>> {
    let bar: DailyBar = serde_json::from_value(value).change_context(NormalizeError::Malformed {
        shape: "daily series".into(),
    })?;

    let timestamp_error = || NormalizeError::Timestamp {
        value: date.to_owned(),
    };
    let day = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").change_context_lazy(timestamp_error)?;
    let open_time = day
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| Report::new(timestamp_error()))?
        .and_utc();

    build_candle(
        market,
        SourceKind::DailySeries,
        BarFields {
            open_time,
            display_offset: kst(),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            notional: None,
        },
    )
}
