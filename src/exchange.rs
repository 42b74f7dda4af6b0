pub mod binance;
pub mod upbit;

use std::sync::Arc;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::ExchangeError;
use crate::model::{SourceKind, TimeFrame};
use crate::normalize::RawBars;

/// A REST source of raw candle payloads.
///
/// Uses `BoxFuture` (from `futures` crate) instead of `async fn` in trait
/// to keep the trait object-safe (`dyn Exchange`).
pub trait Exchange: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Fetch up to `limit` of the most recent bars, untouched.
    ///
    /// Shape problems inside individual bars are left to the normalizer.
    fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        limit: usize,
    ) -> BoxFuture<'_, Result<RawBars, Report<ExchangeError>>>;
}

/// Client for `source`, or `None` for file-only sources.
pub fn for_source(source: SourceKind) -> Option<Arc<dyn Exchange>> {
    match source {
        SourceKind::Upbit => Some(Arc::new(upbit::UpbitExchange::new())),
        SourceKind::Binance => Some(Arc::new(binance::BinanceExchange::new())),
        SourceKind::DailySeries => None,
    }
}
