// tests/analysis_pipeline.rs
//
// End-to-end analysis properties on synthetic market regimes: the full
// indicator suite, fusion and trend classification behave sanely on
// trending and ranging data.
use chrono::{Duration, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use trend_trader::analysis::trend::{IndicatorParams, TrendAnalyzer};
use trend_trader::domain::models::{Candle, PriceHistory, TrendDirection};

fn history(closes: &[f64], volume: f64) -> PriceHistory {
    let start = Utc::now() - Duration::hours(closes.len() as i64);
    let candles = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let price = Decimal::from_f64(c).unwrap();
            Candle {
                start: start + Duration::hours(i as i64),
                open: price,
                high: price * Decimal::from_f64(1.005).unwrap(),
                low: price * Decimal::from_f64(0.995).unwrap(),
                close: price,
                volume: Decimal::from_f64(volume).unwrap(),
            }
        })
        .collect();
    PriceHistory::new("BTC-USD", candles)
}

fn analyzer() -> TrendAnalyzer {
    TrendAnalyzer::new(IndicatorParams::default())
}

#[test]
fn uptrend_analysis_is_internally_consistent() {
    let closes: Vec<f64> = (0..120).map(|i| 100.0 + i as f64 * 0.8).collect();
    let analysis = analyzer().analyze(&history(&closes, 5_000_000.0)).unwrap();

    // A steady uptrend never yields a sell consensus.
    assert!(!analysis.signal.is_sell(), "uptrend fused to {:?}", analysis.signal);
    assert!((0.0..=1.0).contains(&analysis.confidence));
    assert!((0.0..=1.0).contains(&analysis.strength));
    assert!((0.0..=1.0).contains(&analysis.signal_strength));

    // MA relation matches the regime.
    let ma = &analysis.indicators["moving_averages"];
    assert!(ma.value.field("short_ma").unwrap() > ma.value.field("long_ma").unwrap());
    assert!(ma.value.field("divergence").unwrap() > 0.0);

    // Indicator outputs stay inside their documented ranges.
    let rsi = analysis.indicators["rsi"].value.scalar().unwrap();
    assert!((0.0..=100.0).contains(&rsi));
    let wr = analysis.indicators["williams_r"].value.scalar().unwrap();
    assert!((-100.0..=0.0).contains(&wr));
    let bb = analysis.indicators["bollinger"].value.field("position").unwrap();
    assert!(bb.is_finite());
}

#[test]
fn downtrend_analysis_never_buys() {
    let closes: Vec<f64> = (0..120).map(|i| 300.0 - i as f64).collect();
    let analysis = analyzer().analyze(&history(&closes, 5_000_000.0)).unwrap();
    assert!(!analysis.signal.is_buy(), "downtrend fused to {:?}", analysis.signal);
}

#[test]
fn flat_market_holds() {
    let closes: Vec<f64> = (0..120)
        .map(|i| 100.0 + (i as f64 * 0.7).sin() * 0.2)
        .collect();
    let analysis = analyzer().analyze(&history(&closes, 5_000_000.0)).unwrap();
    assert!(!analysis.signal.is_strong(), "flat market fused to {:?}", analysis.signal);
    assert_eq!(analysis.trend, TrendDirection::Sideways);
}

#[test]
fn zero_volume_history_skips_oscillators() {
    let closes: Vec<f64> = (0..120).map(|i| 100.0 + i as f64 * 0.5).collect();
    let analysis = analyzer().analyze(&history(&closes, 0.0)).unwrap();
    assert!(!analysis.indicators.contains_key("stochastic"));
    assert!(!analysis.indicators.contains_key("williams_r"));
    assert!(analysis.indicators.contains_key("macd"));
}

#[test]
fn dissonant_consensus_damps_the_trend_call() {
    // Long decline with a late oversold bounce: any buy-flavored
    // consensus against the bearish backdrop must not report Bearish.
    let mut closes: Vec<f64> = (0..110).map(|i| 300.0 - i as f64 * 1.5).collect();
    let last = *closes.last().unwrap();
    closes.extend((1..=10).map(|i| last + i as f64 * 0.1));
    let analysis = analyzer().analyze(&history(&closes, 5_000_000.0)).unwrap();

    if analysis.signal.is_buy() {
        assert_eq!(analysis.trend, TrendDirection::Sideways);
        assert_eq!(analysis.strength, 0.5);
    }
}
