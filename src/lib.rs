pub mod analysis;
pub mod config;
pub mod error;
pub mod exchange;
pub mod indicator;
pub mod model;
pub mod normalize;

pub use analysis::{IndicatorProfile, IndicatorReport, compute_indicators};
pub use model::{Candle, CandleSeries, SourceKind, TimeFrame};
pub use normalize::{RawBars, normalize};

/// Normalize `raw` and compute the full indicator report for `market`.
pub fn analyze(market: &str, raw: RawBars, profile: IndicatorProfile) -> IndicatorReport {
    let series = normalize(market, raw);
    compute_indicators(&series, profile)
}
