use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use candle_indicators::config::{self, AppConfig, MarketConfig};
use candle_indicators::model::{CandleSeries, TimeFrame};
use candle_indicators::{
    IndicatorProfile, IndicatorReport, RawBars, SourceKind, analyze, compute_indicators, exchange,
};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("input error")]
    Input,
    #[display("output error")]
    Output,
    #[display("runtime error")]
    Runtime,
}

#[derive(Parser)]
#[command(
    name = "candle-indicators",
    about = "Normalize market candles and compute technical indicators"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze every market in the configuration (default)
    Run,
    /// Analyze one source-tagged raw bar file
    Analyze {
        /// JSON file shaped `{"source": ..., "bars": ...}`
        #[arg(short, long)]
        file: PathBuf,
        #[arg(short, long)]
        market: String,
        #[arg(short, long, default_value = "crypto", value_parser = ["crypto", "stock"])]
        profile: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    init_tracing(&config);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_markets(&config).await,
        Command::Analyze {
            file,
            market,
            profile,
        } => {
            let raw: RawBars = serde_json::from_value(read_json(&file)?)
                .change_context(AppError::Input)
                .attach_with(|| format!("file: {}", file.display()))?;
            let profile = IndicatorProfile::from_str(&profile).unwrap_or_default();
            print_report(&analyze(&market, raw, profile))
        }
    }
}

/// An absent file at the default location means "all defaults". A path
/// given explicitly must exist.
fn load_config(path: &Path) -> Result<AppConfig, Report<AppError>> {
    if path == Path::new(DEFAULT_CONFIG_PATH) && !path.exists() {
        return Ok(AppConfig::default());
    }
    config::load(path).change_context(AppError::Config)
}

fn init_tracing(config: &AppConfig) {
    // stdout carries the reports
    let filter = EnvFilter::new(&config.general.log_level);
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

async fn run_markets(config: &AppConfig) -> Result<(), Report<AppError>> {
    if config.markets.is_empty() {
        warn!("no markets configured; nothing to do");
        return Ok(());
    }

    let timeframe = config.timeframe();
    let mut handles = Vec::with_capacity(config.markets.len());
    for market in &config.markets {
        let job = MarketJob {
            source: market.source_kind().unwrap_or(SourceKind::DailySeries),
            symbol: market.symbol.clone(),
            profile: market.indicator_profile(),
            file: market.file.as_ref().map(PathBuf::from),
            count: config.candle_count(market),
        };
        handles.push(tokio::spawn(job.run(timeframe)));
    }

    // Reports print in configuration order.
    for (handle, market) in handles.into_iter().zip(&config.markets) {
        let report = handle
            .await
            .change_context(AppError::Runtime)
            .attach_with(|| describe(market))?;
        print_report(&report)?;
    }

    info!(markets = config.markets.len(), "analysis complete");
    Ok(())
}

struct MarketJob {
    source: SourceKind,
    symbol: String,
    profile: IndicatorProfile,
    file: Option<PathBuf>,
    count: usize,
}

impl MarketJob {
    /// Always yields a report. Unreadable input becomes a degraded one sized
    /// to the requested bar count.
    async fn run(self, timeframe: TimeFrame) -> IndicatorReport {
        match self.load(timeframe).await {
            Ok(raw) => analyze(&self.symbol, raw, self.profile),
            Err(e) => {
                warn!(
                    source = %self.source,
                    symbol = %self.symbol,
                    error = ?e,
                    "raw bars unavailable, reporting degraded result"
                );
                let series = CandleSeries::empty(&self.symbol, self.count);
                compute_indicators(&series, self.profile)
            }
        }
    }

    async fn load(&self, timeframe: TimeFrame) -> Result<RawBars, Report<AppError>> {
        if let Some(path) = &self.file {
            let payload = read_json(path)?;
            // Tagged files carry their own source; bare payloads use the configured one.
            if payload.get("source").is_some_and(Value::is_string) {
                return serde_json::from_value(payload)
                    .change_context(AppError::Input)
                    .attach_with(|| format!("file: {}", path.display()));
            }
            return RawBars::from_payload(self.source, payload)
                .change_context(AppError::Input)
                .attach_with(|| format!("file: {}", path.display()));
        }

        let client = exchange::for_source(self.source).ok_or_else(|| {
            Report::new(AppError::Input).attach(format!("{} requires a file", self.source))
        })?;
        info!(
            source = %client.kind(),
            symbol = %self.symbol,
            timeframe = %timeframe,
            count = self.count,
            "fetching raw bars"
        );
        client
            .fetch_bars(&self.symbol, timeframe, self.count)
            .await
            .change_context(AppError::Input)
    }
}

fn read_json(path: &Path) -> Result<Value, Report<AppError>> {
    let content = std::fs::read_to_string(path)
        .change_context(AppError::Input)
        .attach_with(|| format!("path: {}", path.display()))?;
    serde_json::from_str(&content)
        .change_context(AppError::Input)
        .attach_with(|| format!("path: {}", path.display()))
}

fn print_report(report: &IndicatorReport) -> Result<(), Report<AppError>> {
    let line = serde_json::to_string(report).change_context(AppError::Output)?;
    println!("{line}");
    Ok(())
}

fn describe(market: &MarketConfig) -> String {
    format!("market: {} ({})", market.symbol, market.source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_missing_config_is_an_error() {
        let err = load_config(Path::new("/nonexistent/candle-indicators.toml")).unwrap_err();
        assert!(matches!(err.current_context(), AppError::Config));
    }

    #[test]
    fn cli_defaults_to_run_with_default_config() {
        let cli = Cli::parse_from(["candle-indicators"]);
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(cli.command.is_none());
    }

    #[test]
    fn analyze_rejects_unknown_profile() {
        let parsed = Cli::try_parse_from([
            "candle-indicators",
            "analyze",
            "--file",
            "bars.json",
            "--market",
            "KRW-BTC",
            "--profile",
            "forex",
        ]);
        assert!(parsed.is_err());
    }
}
