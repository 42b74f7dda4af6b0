use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
}

#[derive(Debug, Display, Error)]
pub enum ExchangeError {
    #[display("request to {exchange} failed")]
    Request { exchange: String },
    #[display("failed to parse response from {exchange}")]
    ResponseParse { exchange: String },
    #[display("{exchange} cannot serve {what}")]
    Unsupported { exchange: String, what: String },
}

/// A single raw bar that could not be turned into a [`Candle`](crate::model::Candle).
///
/// Always recovered inside the normalizer by dropping the bar.
#[derive(Debug, Display, Error)]
pub enum NormalizeError {
    #[display("bar does not match the {shape} shape")]
    Malformed { shape: String },
    #[display("missing field `{field}`")]
    MissingField { field: String },
    #[display("invalid timestamp: {value}")]
    Timestamp { value: String },
    #[display("field `{field}` is not a finite non-negative number")]
    InvalidNumber { field: String },
    #[display("price range violated: low={low} open={open} close={close} high={high}")]
    PriceRange {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

#[derive(Debug, Display, Error)]
pub enum IndicatorError {
    #[display("insufficient data: need {required}, got {available}")]
    InsufficientData { required: usize, available: usize },
    #[display("invalid parameter: {name}")]
    InvalidParameter { name: String },
    #[display("non-finite input at index {index}")]
    NonFinite { index: usize },
}
