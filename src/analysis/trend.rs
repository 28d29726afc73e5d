// src/analysis/trend.rs
//
// Turns a price history into a TrendAnalysis: runs the indicator suite,
// fuses the readings, classifies the market trend and scores confidence.
use crate::analysis::indicators;
use crate::domain::errors::AnalysisResult;
use crate::domain::models::{
    IndicatorReading, PriceHistory, SignalKind, TrendAnalysis, TrendDirection,
};
use chrono::Utc;
use std::collections::HashMap;

const ROC_PERIOD: usize = 10;
const ROC_TREND_THRESHOLD_PCT: f64 = 1.0;
const OSCILLATOR_MIN_CANDLES: usize = 14;

/// Indicator parameters, overridable from configuration.
#[derive(Debug, Clone)]
pub struct IndicatorParams {
    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bollinger_period: usize,
    pub bollinger_std_dev: f64,
    pub ma_short: usize,
    pub ma_long: usize,
    pub stochastic_k: usize,
    pub stochastic_d: usize,
    pub williams_period: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bollinger_period: 20,
            bollinger_std_dev: 2.0,
            ma_short: 10,
            ma_long: 50,
            stochastic_k: 14,
            stochastic_d: 3,
            williams_period: 14,
        }
    }
}

/// Fusion weights per indicator name.
fn fusion_weight(name: &str) -> f64 {
    match name {
        "rsi" => 1.0,
        "macd" => 1.5,
        "bollinger" => 1.0,
        "moving_averages" => 2.0,
        "stochastic" => 0.8,
        "williams_r" => 0.7,
        _ => 1.0,
    }
}

pub struct TrendAnalyzer {
    params: IndicatorParams,
}

impl TrendAnalyzer {
    pub fn new(params: IndicatorParams) -> Self {
        Self { params }
    }

    /// Full analysis pass over one symbol's history.
    pub fn analyze(&self, history: &PriceHistory) -> AnalysisResult<TrendAnalysis> {
        let close = history.close_prices();
        let high = history.high_prices();
        let low = history.low_prices();
        let volumes = history.volumes();

        let mut readings: HashMap<String, IndicatorReading> = HashMap::new();
        readings.insert(
            "rsi".to_string(),
            indicators::rsi(
                &close,
                self.params.rsi_period,
                self.params.rsi_overbought,
                self.params.rsi_oversold,
            )?,
        );
        readings.insert(
            "macd".to_string(),
            indicators::macd(
                &close,
                self.params.macd_fast,
                self.params.macd_slow,
                self.params.macd_signal,
            )?,
        );
        readings.insert(
            "bollinger".to_string(),
            indicators::bollinger_bands(
                &close,
                self.params.bollinger_period,
                self.params.bollinger_std_dev,
            )?,
        );
        readings.insert(
            "moving_averages".to_string(),
            indicators::moving_average_cross(&close, self.params.ma_short, self.params.ma_long)?,
        );

        // Oscillators need real high/low ranges; skip them on thin or
        // volume-less histories rather than feeding them garbage.
        let has_volume = volumes.iter().any(|v| *v > 0.0);
        if has_volume && close.len() >= OSCILLATOR_MIN_CANDLES {
            readings.insert(
                "stochastic".to_string(),
                indicators::stochastic(
                    &high,
                    &low,
                    &close,
                    self.params.stochastic_k,
                    self.params.stochastic_d,
                    80.0,
                    20.0,
                )?,
            );
            readings.insert(
                "williams_r".to_string(),
                indicators::williams_r(&high, &low, &close, self.params.williams_period, -20.0, -80.0)?,
            );
        }

        let mut weighted = Vec::with_capacity(readings.len());
        let mut weights = Vec::with_capacity(readings.len());
        for (name, reading) in &readings {
            weighted.push(reading.clone());
            weights.push(fusion_weight(name));
        }
        let fused = indicators::combine(&weighted, &weights)?;

        let (mut trend, mut trend_strength) = self.classify_trend(&close)?;

        // Dissonance damping: a fused signal fighting the trend direction
        // downgrades the trend call to Sideways.
        let dissonant = (fused.signal.is_buy() && trend == TrendDirection::Bearish)
            || (fused.signal.is_sell() && trend == TrendDirection::Bullish);
        if dissonant {
            trend = TrendDirection::Sideways;
            trend_strength = 0.5;
        }

        let agreement = agreement_ratio(&readings, fused.signal);
        let confidence =
            (0.4 * agreement + 0.4 * fused.strength + 0.2 * trend_strength).min(1.0);

        Ok(TrendAnalysis {
            trend,
            strength: trend_strength,
            signal: fused.signal,
            signal_strength: fused.strength,
            confidence,
            indicators: readings,
            timestamp: Utc::now(),
        })
    }

    /// Two-vote trend classifier: moving-average relation plus rate of
    /// change. Matching votes average their strengths; a split decision
    /// goes to the stronger vote at a weighted-down strength.
    fn classify_trend(&self, close: &[f64]) -> AnalysisResult<(TrendDirection, f64)> {
        let ma_reading =
            indicators::moving_average_cross(close, self.params.ma_short, self.params.ma_long)?;
        let short_ma = ma_reading.value.field("short_ma").unwrap_or(0.0);
        let long_ma = ma_reading.value.field("long_ma").unwrap_or(0.0);
        let divergence = ma_reading.value.field("divergence").unwrap_or(0.0);

        let (ma_direction, ma_strength) = if short_ma > long_ma {
            (TrendDirection::Bullish, (divergence / 5.0).min(1.0))
        } else {
            (TrendDirection::Bearish, (divergence / 5.0).min(1.0))
        };

        let roc = if close.len() > ROC_PERIOD {
            let past = close[close.len() - 1 - ROC_PERIOD];
            if past.abs() > f64::EPSILON {
                (close[close.len() - 1] - past) / past * 100.0
            } else {
                0.0
            }
        } else {
            0.0
        };

        let (roc_direction, roc_strength) = if roc > ROC_TREND_THRESHOLD_PCT {
            (TrendDirection::Bullish, (roc.abs() / 5.0).min(1.0))
        } else if roc < -ROC_TREND_THRESHOLD_PCT {
            (TrendDirection::Bearish, (roc.abs() / 5.0).min(1.0))
        } else {
            (TrendDirection::Sideways, 0.5)
        };

        if ma_direction == roc_direction {
            return Ok((ma_direction, (ma_strength + roc_strength) / 2.0));
        }

        let (winner, stronger, weaker) = if ma_strength >= roc_strength {
            (ma_direction, ma_strength, roc_strength)
        } else {
            (roc_direction, roc_strength, ma_strength)
        };
        Ok((winner, 0.7 * stronger + 0.3 * weaker))
    }
}

fn agreement_ratio(readings: &HashMap<String, IndicatorReading>, fused: SignalKind) -> f64 {
    if readings.is_empty() {
        return 0.0;
    }
    let agreeing = readings
        .values()
        .filter(|r| {
            (fused.is_buy() && r.signal.is_buy())
                || (fused.is_sell() && r.signal.is_sell())
                || (fused == SignalKind::Hold && r.signal == SignalKind::Hold)
        })
        .count();
    agreeing as f64 / readings.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Candle;
    use chrono::{Duration, Utc};
    use rust_decimal::prelude::FromPrimitive;
    use rust_decimal::Decimal;

    fn history_from_closes(closes: &[f64]) -> PriceHistory {
        let start = Utc::now() - Duration::hours(closes.len() as i64);
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let price = Decimal::from_f64(c).unwrap();
                Candle {
                    start: start + Duration::hours(i as i64),
                    open: price,
                    high: price * Decimal::from_f64(1.01).unwrap(),
                    low: price * Decimal::from_f64(0.99).unwrap(),
                    close: price,
                    volume: Decimal::from_f64(2_000_000.0).unwrap(),
                }
            })
            .collect();
        PriceHistory {
            symbol: "BTC-USD".to_string(),
            candles,
        }
    }

    #[test]
    fn uptrend_classifies_bullish() {
        let closes: Vec<f64> = (0..100).map(|i| 100.0 + i as f64).collect();
        let history = history_from_closes(&closes);
        let analysis = TrendAnalyzer::new(IndicatorParams::default())
            .analyze(&history)
            .unwrap();

        assert!(
            matches!(
                analysis.trend,
                TrendDirection::Bullish | TrendDirection::Sideways
            ),
            "uptrend classified {:?}",
            analysis.trend
        );
        assert!(!analysis.signal.is_sell());
        assert!((0.0..=1.0).contains(&analysis.confidence));
    }

    #[test]
    fn downtrend_classifies_bearish() {
        let closes: Vec<f64> = (0..100).map(|i| 300.0 - i as f64 * 2.0).collect();
        let history = history_from_closes(&closes);
        let analysis = TrendAnalyzer::new(IndicatorParams::default())
            .analyze(&history)
            .unwrap();

        assert!(
            matches!(
                analysis.trend,
                TrendDirection::Bearish | TrendDirection::Sideways
            ),
            "downtrend classified {:?}",
            analysis.trend
        );
        assert!(!analysis.signal.is_buy());
    }

    #[test]
    fn oscillators_included_with_volume_data() {
        let closes: Vec<f64> = (0..100).map(|i| 100.0 + (i as f64 * 0.4).sin() * 5.0).collect();
        let history = history_from_closes(&closes);
        let analysis = TrendAnalyzer::new(IndicatorParams::default())
            .analyze(&history)
            .unwrap();

        assert!(analysis.indicators.contains_key("stochastic"));
        assert!(analysis.indicators.contains_key("williams_r"));
        assert!(analysis.indicators.contains_key("rsi"));
    }

    #[test]
    fn thin_history_is_rejected() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let history = history_from_closes(&closes);
        let result = TrendAnalyzer::new(IndicatorParams::default()).analyze(&history);
        assert!(result.is_err());
    }
}
