use std::collections::HashSet;
use std::path::Path;

use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::analysis::IndicatorProfile;
use crate::error::ConfigError;
use crate::model::{SourceKind, TimeFrame};

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_candle_count() -> usize {
    200
}

fn default_timeframe() -> String {
    "1d".into()
}

fn default_profile() -> String {
    "crypto".into()
}

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub markets: Vec<MarketConfig>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    /// Bars requested per market when fetching from an exchange.
    #[serde(default = "default_candle_count")]
    pub default_candle_count: usize,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            default_candle_count: default_candle_count(),
            timeframe: default_timeframe(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MarketConfig {
    pub source: String,
    pub symbol: String,
    #[serde(default = "default_profile")]
    pub profile: String,
    /// Raw bar payload on disk. Required for `daily_series`; for exchange
    /// sources it replaces the network fetch.
    pub file: Option<String>,
    /// Overrides `analysis.default_candle_count` for this market.
    pub candle_count: Option<usize>,
}

impl MarketConfig {
    /// Parsed source. Only meaningful after `validate`.
    pub fn source_kind(&self) -> Option<SourceKind> {
        SourceKind::from_str(&self.source)
    }

    pub fn indicator_profile(&self) -> IndicatorProfile {
        IndicatorProfile::from_str(&self.profile).unwrap_or_default()
    }
}

impl AppConfig {
    pub fn timeframe(&self) -> TimeFrame {
        TimeFrame::from_str(&self.analysis.timeframe).unwrap_or(TimeFrame::Day1)
    }

    pub fn candle_count(&self, market: &MarketConfig) -> usize {
        market
            .candle_count
            .unwrap_or(self.analysis.default_candle_count)
    }
}

/// Load and validate an `AppConfig` from a TOML file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    let config: AppConfig = toml::from_str(&content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })?;

    validate(&config)?;

    Ok(config)
}

pub fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_analysis(config)?;
    validate_markets(config)?;
    validate_markets_unique(config)?;
    Ok(())
}

fn validate_analysis(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if TimeFrame::from_str(&config.analysis.timeframe).is_none() {
        return Err(Report::new(ConfigError::Validation {
            field: format!(
                "analysis.timeframe: unknown timeframe \"{}\"",
                config.analysis.timeframe
            ),
        }));
    }
    if config.analysis.default_candle_count == 0 {
        return Err(Report::new(ConfigError::Validation {
            field: "analysis.default_candle_count must be > 0".into(),
        }));
    }
    Ok(())
}

fn validate_markets(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    for market in &config.markets {
        let Some(source) = market.source_kind() else {
            return Err(Report::new(ConfigError::Validation {
                field: format!(
                    "markets[symbol={}].source: unknown source \"{}\"",
                    market.symbol, market.source
                ),
            }));
        };

        if IndicatorProfile::from_str(&market.profile).is_none() {
            return Err(Report::new(ConfigError::Validation {
                field: format!(
                    "markets[symbol={}].profile: unknown profile \"{}\"",
                    market.symbol, market.profile
                ),
            }));
        }

        if source == SourceKind::DailySeries && market.file.is_none() {
            return Err(Report::new(ConfigError::Validation {
                field: format!(
                    "markets[symbol={}].file is required for source \"daily_series\"",
                    market.symbol
                ),
            }));
        }

        if market.candle_count == Some(0) {
            return Err(Report::new(ConfigError::Validation {
                field: format!("markets[symbol={}].candle_count must be > 0", market.symbol),
            }));
        }
    }
    Ok(())
}

fn validate_markets_unique(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let mut seen = HashSet::new();
    for market in &config.markets {
        if !seen.insert((market.source.as_str(), market.symbol.as_str())) {
            return Err(Report::new(ConfigError::Validation {
                field: format!(
                    "markets: duplicate entry ({}, {})",
                    market.source, market.symbol
                ),
            }));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> AppConfig {
        toml::from_str(toml).expect("parse failed")
    }

    #[test]
    fn valid_full_config_parses() {
        let toml = r#"
[general]
log_level = "debug"
log_format = "json"

[analysis]
default_candle_count = 120
timeframe = "4h"

[[markets]]
source = "upbit"
symbol = "KRW-BTC"

[[markets]]
source = "daily_series"
symbol = "AAPL"
profile = "stock"
file = "fixtures/aapl.json"
candle_count = 60
"#;
        let config = parse(toml);
        assert!(validate(&config).is_ok());
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.timeframe(), TimeFrame::Hour4);
        assert_eq!(config.markets.len(), 2);
        assert_eq!(config.candle_count(&config.markets[0]), 120);
        assert_eq!(config.candle_count(&config.markets[1]), 60);
        assert_eq!(
            config.markets[1].indicator_profile(),
            IndicatorProfile::Stock
        );
        assert_eq!(
            config.markets[1].source_kind(),
            Some(SourceKind::DailySeries)
        );
    }

    #[test]
    fn defaults_applied_when_fields_omitted() {
        let config = parse("");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "text");
        assert_eq!(config.analysis.default_candle_count, 200);
        assert_eq!(config.timeframe(), TimeFrame::Day1);
        assert!(config.markets.is_empty());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn market_profile_defaults_to_crypto() {
        let config = parse(
            r#"
[[markets]]
source = "binance"
symbol = "BTCUSDT"
"#,
        );
        assert_eq!(
            config.markets[0].indicator_profile(),
            IndicatorProfile::Crypto
        );
    }

    #[test]
    fn invalid_timeframe_string_rejected() {
        let config = parse(
            r#"
[analysis]
timeframe = "2m"
"#,
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn unknown_source_rejected() {
        let config = parse(
            r#"
[[markets]]
source = "kraken"
symbol = "XBTUSD"
"#,
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn unknown_profile_rejected() {
        let config = parse(
            r#"
[[markets]]
source = "upbit"
symbol = "KRW-BTC"
profile = "forex"
"#,
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn daily_series_requires_file() {
        let config = parse(
            r#"
[[markets]]
source = "daily_series"
symbol = "AAPL"
"#,
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn duplicate_markets_rejected() {
        let config = parse(
            r#"
[[markets]]
source = "upbit"
symbol = "KRW-BTC"

[[markets]]
source = "upbit"
symbol = "KRW-BTC"
profile = "stock"
"#,
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn same_symbol_on_different_sources_allowed() {
        let config = parse(
            r#"
[[markets]]
source = "upbit"
symbol = "BTC"

[[markets]]
source = "binance"
symbol = "BTC"
"#,
        );
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = load(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err.current_context(), ConfigError::ReadFile));
    }
}
