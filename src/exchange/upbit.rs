use std::sync::Arc;

use chrono::{DateTime, Utc};
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::ExchangeError;
use crate::exchange::Exchange;
use crate::model::{SourceKind, TimeFrame};
use crate::normalize::RawBars;
use crate::normalize::upbit::page_cursor;

const UPBIT_BASE_URL: &str = "https://api.upbit.com";
const MAX_CANDLES_PER_REQUEST: usize = 200;

pub struct UpbitExchange {
    client: reqwest::Client,
    base_url: String,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl UpbitExchange {
    pub fn new() -> Self {
        Self::with_base_url(UPBIT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        // Upbit allows 10 req/s; use 8 for safety margin
        let quota = Quota::per_second(nonzero!(8u32));
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    async fn fetch_page(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        count: usize,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Value>, Report<ExchangeError>> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, timeframe.upbit_endpoint());
        let params = page_params(symbol, count, to);

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .change_context(ExchangeError::Request {
                exchange: "upbit".into(),
            })?;

        if !response.status().is_success() {
            return Err(Report::new(ExchangeError::Request {
                exchange: "upbit".into(),
            })
            .attach(format!("HTTP status: {}", response.status())));
        }

        // Bars stay untyped so one bad bar cannot sink the whole page.
        response
            .json::<Vec<Value>>()
            .await
            .change_context(ExchangeError::ResponseParse {
                exchange: "upbit".into(),
            })
    }
}

impl Default for UpbitExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl Exchange for UpbitExchange {
    fn kind(&self) -> SourceKind {
        SourceKind::Upbit
    }

    fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        limit: usize,
    ) -> BoxFuture<'_, Result<RawBars, Report<ExchangeError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            let mut bars: Vec<Value> = Vec::with_capacity(limit);
            let mut to: Option<DateTime<Utc>> = None;

            while bars.len() < limit {
                let count = (limit - bars.len()).min(MAX_CANDLES_PER_REQUEST);
                let page = self.fetch_page(&symbol, timeframe, count, to).await?;
                let fetched = page.len();

                // Pages are newest-first, so the last bar is the oldest.
                let cursor = page.last().and_then(page_cursor);
                bars.extend(page);

                debug!(
                    symbol = %symbol,
                    timeframe = %timeframe,
                    fetched = bars.len(),
                    total = limit,
                    "upbit page fetched"
                );

                match cursor {
                    Some(oldest) if fetched == count => to = Some(oldest),
                    _ => break,
                }
            }

            info!(
                symbol = %symbol,
                timeframe = %timeframe,
                fetched = bars.len(),
                "upbit bar fetch complete"
            );
            Ok(RawBars::UpbitCandles(bars))
        })
    }
}

fn page_params(
    symbol: &str,
    count: usize,
    to: Option<DateTime<Utc>>,
) -> Vec<(&'static str, String)> {
    let mut params = vec![("market", symbol.to_owned()), ("count", count.to_string())];
    if let Some(to) = to {
        params.push(("to", to.format("%Y-%m-%dT%H:%M:%SZ").to_string()));
    }
    params
}
