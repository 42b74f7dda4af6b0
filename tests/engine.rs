use candle_indicators::analysis::DEGRADED_DEFAULT_LEN;
use candle_indicators::{IndicatorProfile, RawBars, SourceKind, analyze, normalize};
use serde_json::{Value, json};

/// Upbit-style bars, newest first, one per day starting 2024-01-01.
fn upbit_bars(count: usize) -> Vec<Value> {
    (0..count)
        .rev()
        .map(|day| {
            let close = 100.0 + day as f64;
            json!({
                "market": "KRW-BTC",
                "candle_date_time_utc": format!("2024-01-{:02}T00:00:00", day + 1),
                "candle_date_time_kst": format!("2024-01-{:02}T09:00:00", day + 1),
                "opening_price": close - 1.0,
                "high_price": close + 2.0,
                "low_price": close - 2.0,
                "trade_price": close,
                "candle_acc_trade_volume": 10.0,
                "candle_acc_trade_price": close * 10.0
            })
        })
        .collect()
}

#[test]
fn upbit_bars_come_out_ascending() {
    let series = normalize("KRW-BTC", RawBars::UpbitCandles(upbit_bars(5)));
    assert_eq!(series.len(), 5);
    assert!(
        series
            .candles()
            .windows(2)
            .all(|w| w[0].open_time < w[1].open_time)
    );
    assert_eq!(series.candles()[0].close, 100.0);
    assert_eq!(series.candles()[0].source, SourceKind::Upbit);
}

#[test]
fn bars_missing_a_close_are_dropped_and_counted() {
    let mut bars = upbit_bars(10);
    for index in [2, 7] {
        if let Some(bar) = bars[index].as_object_mut() {
            bar.remove("trade_price");
        }
    }

    let report = analyze(
        "KRW-BTC",
        RawBars::UpbitCandles(bars),
        IndicatorProfile::Crypto,
    );
    assert!(!report.degraded);
    assert_eq!(report.dropped_bar_count, 2);
    assert_eq!(report.series.len(), 8);
    assert_eq!(report.date_labels.len(), 8);
    assert_eq!(report.date_labels[0], "01/01");
}

#[test]
fn binance_and_upbit_shapes_agree() {
    let klines: Vec<Value> = (0..5)
        .map(|day: i64| {
            let close = 100.0 + day as f64;
            json!([
                1_704_067_200_000_i64 + day * 86_400_000,
                (close - 1.0).to_string(),
                (close + 2.0).to_string(),
                (close - 2.0).to_string(),
                close.to_string(),
                "10"
            ])
        })
        .collect();

    let from_binance = analyze("BTC", RawBars::BinanceKlines(klines), IndicatorProfile::Crypto);
    let from_upbit = analyze("BTC", RawBars::UpbitCandles(upbit_bars(5)), IndicatorProfile::Crypto);
    assert_eq!(from_binance.series, from_upbit.series);
    assert_eq!(from_binance.date_labels, from_upbit.date_labels);
}

#[test]
fn daily_series_with_stock_profile() {
    let mut days = serde_json::Map::new();
    for day in 1..=25 {
        let close = 50.0 + day as f64;
        days.insert(
            format!("2024-02-{day:02}"),
            json!({
                "1. open": close.to_string(),
                "2. high": (close + 1.0).to_string(),
                "3. low": (close - 1.0).to_string(),
                "4. close": close.to_string(),
                "5. volume": "1000"
            }),
        );
    }

    let report = analyze("AAPL", RawBars::DailySeries(days), IndicatorProfile::Stock);
    assert!(!report.degraded);
    assert_eq!(report.series.len(), 25);
    assert_eq!(report.series.sma200.as_ref().map(Vec::len), Some(25));
    assert_eq!(report.latest.sma200, Some(75.0));
    assert_eq!(report.date_labels.last().map(String::as_str), Some("02/25"));
}

#[test]
fn unusable_input_degrades_to_requested_length() {
    let bars = vec![json!({"nonsense": true}); 7];
    let report = analyze("KRW-XRP", RawBars::UpbitCandles(bars), IndicatorProfile::Crypto);
    assert!(report.degraded);
    assert_eq!(report.dropped_bar_count, 7);
    assert_eq!(report.series.len(), 7);
    assert_eq!(report.date_labels.len(), 7);
}

#[test]
fn empty_input_degrades_to_default_length() {
    let report = analyze("KRW-XRP", RawBars::UpbitCandles(vec![]), IndicatorProfile::Crypto);
    assert!(report.degraded);
    assert_eq!(report.series.len(), DEGRADED_DEFAULT_LEN);
    assert_eq!(report.dropped_bar_count, 0);
}

#[test]
fn tagged_file_shape_deserializes() {
    let raw: RawBars = serde_json::from_value(json!({
        "source": "upbit_candles",
        "bars": upbit_bars(3)
    }))
    .unwrap();
    let report = analyze("KRW-BTC", raw, IndicatorProfile::Crypto);
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["market"], "KRW-BTC");
    assert_eq!(json["series"]["obv"].as_array().map(Vec::len), Some(3));
}
