// src/analysis/indicators.rs
//
// Indicator engine: pure functions from a price series to an
// IndicatorReading (value, directional signal, strength), plus the
// weighted fusion of several readings into one consensus signal.
use crate::domain::errors::{AnalysisError, AnalysisResult};
use crate::domain::models::{IndicatorReading, IndicatorValue, SignalKind};
use std::collections::HashMap;

const EPS: f64 = 1e-12;

/// Validate the series length and forward-fill non-finite entries.
///
/// A leading gap is filled with the first finite value; an entirely
/// non-finite series is rejected.
pub fn prepare_series(data: &[f64], min_periods: usize) -> AnalysisResult<Vec<f64>> {
    if data.len() < min_periods {
        return Err(AnalysisError::InsufficientData {
            required: min_periods,
            available: data.len(),
        });
    }

    if data.iter().all(|v| v.is_finite()) {
        return Ok(data.to_vec());
    }

    log::warn!("series contains non-finite values, forward filling");
    let first_finite = data
        .iter()
        .copied()
        .find(|v| v.is_finite())
        .ok_or_else(|| AnalysisError::invalid("series", "no finite values"))?;

    let mut filled = Vec::with_capacity(data.len());
    let mut last = first_finite;
    for &v in data {
        if v.is_finite() {
            last = v;
        }
        filled.push(last);
    }
    Ok(filled)
}

/// Simple moving average over a sliding window.
pub fn sma(prices: &[f64], period: usize) -> Vec<f64> {
    if prices.len() < period || period == 0 {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(prices.len() - period + 1);
    let mut sum: f64 = prices.iter().take(period).sum();
    result.push(sum / period as f64);

    for i in period..prices.len() {
        sum += prices[i] - prices[i - period];
        result.push(sum / period as f64);
    }
    result
}

/// Exponential moving average seeded with the first value,
/// alpha = 2 / (period + 1). Output has the same length as the input.
pub fn ema(prices: &[f64], period: usize) -> Vec<f64> {
    if prices.is_empty() || period == 0 {
        return Vec::new();
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut result = Vec::with_capacity(prices.len());
    let mut current = prices[0];
    result.push(current);

    for &price in &prices[1..] {
        current = (price - current) * alpha + current;
        result.push(current);
    }
    result
}

/// Rolling sample standard deviation, aligned with `sma`.
fn rolling_std(prices: &[f64], period: usize) -> Vec<f64> {
    if prices.len() < period || period < 2 {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(prices.len() - period + 1);
    for window in prices.windows(period) {
        let mean = window.iter().sum::<f64>() / period as f64;
        let variance =
            window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (period as f64 - 1.0);
        result.push(variance.sqrt());
    }
    result
}

fn last_value(indicator: &str, series: &[f64]) -> AnalysisResult<f64> {
    series
        .last()
        .copied()
        .ok_or_else(|| AnalysisError::invalid(indicator, "empty derived series"))
}

fn check_finite(indicator: &str, value: f64) -> AnalysisResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(AnalysisError::invalid(indicator, "computed value is not finite"))
    }
}

/// Relative Strength Index with exponentially weighted gain/loss averages.
///
/// Signal policy: Sell at/above `overbought`, Buy at/below `oversold`,
/// otherwise Hold with strength falling off with distance from the nearer
/// extreme. A flat series yields a neutral RSI of 50 rather than a
/// division by zero.
pub fn rsi(
    prices: &[f64],
    period: usize,
    overbought: f64,
    oversold: f64,
) -> AnalysisResult<IndicatorReading> {
    if period == 0 || overbought <= oversold {
        return Err(AnalysisError::invalid(
            "rsi",
            format!("bad parameters: period={period}, overbought={overbought}, oversold={oversold}"),
        ));
    }
    let prices = prepare_series(prices, period + 1)?;

    let mut gains = Vec::with_capacity(prices.len() - 1);
    let mut losses = Vec::with_capacity(prices.len() - 1);
    for pair in prices.windows(2) {
        let change = pair[1] - pair[0];
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }

    let avg_gain = *ema(&gains, period).last().unwrap_or(&0.0);
    let avg_loss = *ema(&losses, period).last().unwrap_or(&0.0);

    // RS falls back to 1 (RSI 50) when both sides are flat.
    let value = if avg_loss.abs() < EPS {
        if avg_gain.abs() < EPS {
            50.0
        } else {
            100.0
        }
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - (100.0 / (1.0 + rs))
    };
    let value = check_finite("rsi", value)?;

    let (signal, strength) = if value >= overbought {
        (
            SignalKind::Sell,
            ((value - overbought) / (100.0 - overbought)).min(1.0),
        )
    } else if value <= oversold {
        (SignalKind::Buy, ((oversold - value) / oversold).min(1.0))
    } else {
        let distance_to_extreme = (value - overbought).abs().min((value - oversold).abs());
        (
            SignalKind::Hold,
            (1.0 - distance_to_extreme / 50.0).clamp(0.0, 1.0),
        )
    };

    let mut metadata = HashMap::new();
    metadata.insert("period".to_string(), period as f64);
    metadata.insert("overbought".to_string(), overbought);
    metadata.insert("oversold".to_string(), oversold);

    Ok(IndicatorReading {
        value: IndicatorValue::Scalar(value),
        signal,
        strength,
        metadata,
    })
}

/// MACD: fast EMA minus slow EMA, its own EMA as the signal line, and the
/// difference as histogram. Buy when the histogram is positive and rising,
/// Sell when negative and falling, otherwise a weak Hold.
pub fn macd(
    prices: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> AnalysisResult<IndicatorReading> {
    if fast_period >= slow_period || fast_period == 0 || signal_period == 0 {
        return Err(AnalysisError::invalid(
            "macd",
            format!("bad periods: fast={fast_period}, slow={slow_period}, signal={signal_period}"),
        ));
    }
    let prices = prepare_series(prices, slow_period + signal_period)?;

    let ema_fast = ema(&prices, fast_period);
    let ema_slow = ema(&prices, slow_period);

    let macd_line: Vec<f64> = ema_fast
        .iter()
        .zip(ema_slow.iter())
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema(&macd_line, signal_period);
    let histogram: Vec<f64> = macd_line
        .iter()
        .zip(signal_line.iter())
        .map(|(m, s)| m - s)
        .collect();

    let current_macd = check_finite("macd", last_value("macd", &macd_line)?)?;
    let current_signal = last_value("macd", &signal_line)?;
    let current_hist = last_value("macd", &histogram)?;
    let previous_hist = if histogram.len() > 1 {
        histogram[histogram.len() - 2]
    } else {
        0.0
    };

    let momentum_strength = if current_macd.abs() > EPS {
        (current_hist.abs() / current_macd.abs()).min(1.0)
    } else {
        1.0
    };

    let (signal, strength) = if current_macd > current_signal && current_hist > 0.0 {
        if current_hist > previous_hist {
            (SignalKind::Buy, momentum_strength)
        } else {
            (SignalKind::Hold, 0.3)
        }
    } else if current_macd < current_signal && current_hist < 0.0 {
        if current_hist < previous_hist {
            (SignalKind::Sell, momentum_strength)
        } else {
            (SignalKind::Hold, 0.3)
        }
    } else {
        (SignalKind::Hold, 0.1)
    };

    let mut fields = HashMap::new();
    fields.insert("macd".to_string(), current_macd);
    fields.insert("signal".to_string(), current_signal);
    fields.insert("histogram".to_string(), current_hist);

    let mut metadata = HashMap::new();
    metadata.insert("fast_period".to_string(), fast_period as f64);
    metadata.insert("slow_period".to_string(), slow_period as f64);
    metadata.insert("signal_period".to_string(), signal_period as f64);

    Ok(IndicatorReading {
        value: IndicatorValue::Fields(fields),
        signal,
        strength,
        metadata,
    })
}

/// Bollinger bands: SMA plus/minus `std_dev_mult` rolling standard
/// deviations. The price position inside the band drives the signal:
/// Sell above 0.9, Buy below 0.1, Hold scaled by distance from the middle.
pub fn bollinger_bands(
    prices: &[f64],
    period: usize,
    std_dev_mult: f64,
) -> AnalysisResult<IndicatorReading> {
    if period < 2 || std_dev_mult <= 0.0 {
        return Err(AnalysisError::invalid(
            "bollinger",
            format!("bad parameters: period={period}, std_dev={std_dev_mult}"),
        ));
    }
    let prices = prepare_series(prices, period)?;

    let middle_series = sma(&prices, period);
    let std_series = rolling_std(&prices, period);

    let middle = last_value("bollinger", &middle_series)?;
    let std_dev = last_value("bollinger", &std_series)?;
    let upper = middle + std_dev * std_dev_mult;
    let lower = middle - std_dev * std_dev_mult;
    let price = last_value("bollinger", &prices)?;

    let band_width = upper - lower;
    // Degenerate (flat) band: neutral position instead of dividing by zero.
    let position = if band_width > EPS {
        (price - lower) / band_width
    } else {
        0.5
    };
    let position = check_finite("bollinger", position)?;

    let (signal, strength) = if position >= 0.9 {
        (SignalKind::Sell, ((position - 0.9) / 0.1).min(1.0))
    } else if position <= 0.1 {
        (SignalKind::Buy, ((0.1 - position) / 0.1).min(1.0))
    } else {
        (SignalKind::Hold, ((position - 0.5).abs() * 2.0).min(1.0))
    };

    let mut fields = HashMap::new();
    fields.insert("upper".to_string(), upper);
    fields.insert("middle".to_string(), middle);
    fields.insert("lower".to_string(), lower);
    fields.insert("position".to_string(), position);

    let mut metadata = HashMap::new();
    metadata.insert("period".to_string(), period as f64);
    metadata.insert("std_dev".to_string(), std_dev_mult);
    metadata.insert("band_width".to_string(), band_width);

    Ok(IndicatorReading {
        value: IndicatorValue::Fields(fields),
        signal,
        strength,
        metadata,
    })
}

/// Moving-average crossover. Buy on a golden cross, Sell on a death cross,
/// strength from the percentage divergence capped at 5%; without a fresh
/// cross the reading holds with a lower strength cap.
pub fn moving_average_cross(
    prices: &[f64],
    short_period: usize,
    long_period: usize,
) -> AnalysisResult<IndicatorReading> {
    if short_period == 0 || short_period >= long_period {
        return Err(AnalysisError::invalid(
            "moving_averages",
            format!("bad periods: short={short_period}, long={long_period}"),
        ));
    }
    let prices = prepare_series(prices, long_period)?;

    let short_series = sma(&prices, short_period);
    let long_series = sma(&prices, long_period);

    let current_short = last_value("moving_averages", &short_series)?;
    let current_long = last_value("moving_averages", &long_series)?;
    let previous_short = if short_series.len() > 1 {
        short_series[short_series.len() - 2]
    } else {
        current_short
    };
    let previous_long = if long_series.len() > 1 {
        long_series[long_series.len() - 2]
    } else {
        current_long
    };

    if current_long.abs() < EPS {
        return Err(AnalysisError::invalid("moving_averages", "zero long average"));
    }

    let currently_above = current_short > current_long;
    let previously_above = previous_short > previous_long;
    let divergence = (current_short - current_long).abs() / current_long * 100.0;
    let divergence = check_finite("moving_averages", divergence)?;

    let (signal, strength) = if currently_above && !previously_above {
        // Golden cross
        (SignalKind::Buy, (divergence / 5.0).min(1.0))
    } else if !currently_above && previously_above {
        // Death cross
        (SignalKind::Sell, (divergence / 5.0).min(1.0))
    } else {
        (SignalKind::Hold, (divergence / 10.0).min(0.7))
    };

    let mut fields = HashMap::new();
    fields.insert("short_ma".to_string(), current_short);
    fields.insert("long_ma".to_string(), current_long);
    fields.insert("divergence".to_string(), divergence);

    let mut metadata = HashMap::new();
    metadata.insert("short_period".to_string(), short_period as f64);
    metadata.insert("long_period".to_string(), long_period as f64);
    metadata.insert(
        "crossover".to_string(),
        if currently_above != previously_above { 1.0 } else { 0.0 },
    );

    Ok(IndicatorReading {
        value: IndicatorValue::Fields(fields),
        signal,
        strength,
        metadata,
    })
}

/// Stochastic oscillator: %K over the rolling high/low range with a %D
/// smoothing line, extremes-based Buy/Sell policy like RSI scaled to
/// [0, 100].
pub fn stochastic(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    k_period: usize,
    d_period: usize,
    overbought: f64,
    oversold: f64,
) -> AnalysisResult<IndicatorReading> {
    if k_period == 0 || d_period == 0 || overbought <= oversold {
        return Err(AnalysisError::invalid(
            "stochastic",
            format!("bad parameters: k={k_period}, d={d_period}"),
        ));
    }
    let high = prepare_series(high, k_period)?;
    let low = prepare_series(low, k_period)?;
    let close = prepare_series(close, k_period)?;

    let mut k_series = Vec::new();
    for i in (k_period - 1)..close.len() {
        let window_high = high[i + 1 - k_period..=i]
            .iter()
            .cloned()
            .fold(f64::MIN, f64::max);
        let window_low = low[i + 1 - k_period..=i]
            .iter()
            .cloned()
            .fold(f64::MAX, f64::min);
        let range = window_high - window_low;
        // Flat range: neutral midpoint.
        let k = if range > EPS {
            100.0 * (close[i] - window_low) / range
        } else {
            50.0
        };
        k_series.push(k);
    }

    let current_k = check_finite("stochastic", last_value("stochastic", &k_series)?)?;
    let d_series = sma(&k_series, d_period.min(k_series.len()));
    let current_d = d_series.last().copied().unwrap_or(current_k);

    let (signal, strength) = if current_k >= overbought && current_d >= overbought {
        (
            SignalKind::Sell,
            ((current_k - overbought) / (100.0 - overbought)).min(1.0),
        )
    } else if current_k <= oversold && current_d <= oversold {
        (
            SignalKind::Buy,
            ((oversold - current_k) / oversold).min(1.0),
        )
    } else if current_k > current_d {
        (SignalKind::Hold, 0.3)
    } else {
        (SignalKind::Hold, 0.1)
    };

    let mut fields = HashMap::new();
    fields.insert("k_percent".to_string(), current_k);
    fields.insert("d_percent".to_string(), current_d);

    let mut metadata = HashMap::new();
    metadata.insert("k_period".to_string(), k_period as f64);
    metadata.insert("d_period".to_string(), d_period as f64);
    metadata.insert("overbought".to_string(), overbought);
    metadata.insert("oversold".to_string(), oversold);

    Ok(IndicatorReading {
        value: IndicatorValue::Fields(fields),
        signal,
        strength,
        metadata,
    })
}

/// Williams %R over [-100, 0]; same extremes policy as RSI scaled to the
/// Williams range (overbought near 0, oversold near -100).
pub fn williams_r(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    period: usize,
    overbought: f64,
    oversold: f64,
) -> AnalysisResult<IndicatorReading> {
    if period == 0 || overbought <= oversold {
        return Err(AnalysisError::invalid(
            "williams_r",
            format!("bad parameters: period={period}"),
        ));
    }
    let high = prepare_series(high, period)?;
    let low = prepare_series(low, period)?;
    let close = prepare_series(close, period)?;

    let n = close.len();
    let window_high = high[n - period..].iter().cloned().fold(f64::MIN, f64::max);
    let window_low = low[n - period..].iter().cloned().fold(f64::MAX, f64::min);
    let current_close = close[n - 1];

    let range = window_high - window_low;
    let value = if range > EPS {
        -100.0 * (window_high - current_close) / range
    } else {
        -50.0
    };
    let value = check_finite("williams_r", value)?;

    let (signal, strength) = if value >= overbought {
        (
            SignalKind::Sell,
            ((value - overbought) / (0.0 - overbought)).min(1.0),
        )
    } else if value <= oversold {
        (
            SignalKind::Buy,
            ((oversold - value) / (oversold + 100.0)).min(1.0),
        )
    } else {
        let distance_to_extreme = (value - overbought).abs().min((value - oversold).abs());
        (
            SignalKind::Hold,
            (1.0 - distance_to_extreme / 40.0).clamp(0.0, 1.0),
        )
    };

    let mut metadata = HashMap::new();
    metadata.insert("period".to_string(), period as f64);
    metadata.insert("overbought".to_string(), overbought);
    metadata.insert("oversold".to_string(), oversold);

    Ok(IndicatorReading {
        value: IndicatorValue::Scalar(value),
        signal,
        strength,
        metadata,
    })
}

/// Fuse several weighted readings into one consensus reading.
///
/// The buy/sell/hold scores are normalized to sum to 1; the winning group
/// decides the signal, escalating to Strong* above 0.8 and plain Buy/Sell
/// above 0.6. Fused strength is the winning score.
pub fn combine(
    readings: &[IndicatorReading],
    weights: &[f64],
) -> AnalysisResult<IndicatorReading> {
    if readings.is_empty() {
        return Err(AnalysisError::invalid("combine", "no readings provided"));
    }
    if weights.len() != readings.len() {
        return Err(AnalysisError::invalid(
            "combine",
            format!(
                "weights length {} does not match readings length {}",
                weights.len(),
                readings.len()
            ),
        ));
    }

    let total_weight: f64 = weights.iter().sum();
    if total_weight <= 0.0 {
        return Err(AnalysisError::invalid("combine", "weights sum to zero"));
    }

    let mut buy_score = 0.0;
    let mut sell_score = 0.0;
    let mut hold_score = 0.0;

    for (reading, weight) in readings.iter().zip(weights.iter()) {
        let weighted = reading.strength * (weight / total_weight);
        if reading.signal.is_buy() {
            buy_score += weighted;
        } else if reading.signal.is_sell() {
            sell_score += weighted;
        } else {
            hold_score += weighted;
        }
    }

    // Normalize so the three scores always sum to 1; preserves the argmax.
    let score_total = buy_score + sell_score + hold_score;
    if score_total > EPS {
        buy_score /= score_total;
        sell_score /= score_total;
        hold_score /= score_total;
    } else {
        hold_score = 1.0;
    }

    let max_score = buy_score.max(sell_score).max(hold_score);
    let signal = if (max_score - buy_score).abs() < EPS && buy_score > 0.6 {
        if buy_score > 0.8 {
            SignalKind::StrongBuy
        } else {
            SignalKind::Buy
        }
    } else if (max_score - sell_score).abs() < EPS && sell_score > 0.6 {
        if sell_score > 0.8 {
            SignalKind::StrongSell
        } else {
            SignalKind::Sell
        }
    } else {
        SignalKind::Hold
    };

    let mut fields = HashMap::new();
    fields.insert("buy_score".to_string(), buy_score);
    fields.insert("sell_score".to_string(), sell_score);
    fields.insert("hold_score".to_string(), hold_score);

    Ok(IndicatorReading {
        value: IndicatorValue::Fields(fields),
        signal,
        strength: max_score,
        metadata: HashMap::new(),
    })
}

/// Average True Range, used by the ATR stop-loss calculator.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> AnalysisResult<f64> {
    if period == 0 {
        return Err(AnalysisError::invalid("atr", "zero period"));
    }
    let high = prepare_series(high, period + 1)?;
    let low = prepare_series(low, period + 1)?;
    let close = prepare_series(close, period + 1)?;

    let mut true_ranges = Vec::with_capacity(high.len() - 1);
    for i in 1..high.len() {
        let tr = (high[i] - low[i])
            .max((high[i] - close[i - 1]).abs())
            .max((low[i] - close[i - 1]).abs());
        true_ranges.push(tr);
    }

    let mut value = true_ranges.iter().take(period).sum::<f64>() / period as f64;
    for tr in &true_ranges[period..] {
        value = (value * (period as f64 - 1.0) + tr) / period as f64;
    }
    check_finite("atr", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uptrend(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64).collect()
    }

    fn downtrend(n: usize) -> Vec<f64> {
        (0..n).map(|i| 200.0 - i as f64).collect()
    }

    #[test]
    fn rsi_stays_in_bounds() {
        for series in [uptrend(50), downtrend(50)] {
            let reading = rsi(&series, 14, 70.0, 30.0).unwrap();
            let value = reading.value.scalar().unwrap();
            assert!((0.0..=100.0).contains(&value), "rsi out of bounds: {value}");
            assert!((0.0..=1.0).contains(&reading.strength));
        }
    }

    #[test]
    fn rsi_flat_series_is_neutral() {
        let flat = vec![42.0; 30];
        let reading = rsi(&flat, 14, 70.0, 30.0).unwrap();
        assert_eq!(reading.value.scalar().unwrap(), 50.0);
        assert_eq!(reading.signal, SignalKind::Hold);
    }

    #[test]
    fn rsi_pure_uptrend_is_overbought() {
        let reading = rsi(&uptrend(50), 14, 70.0, 30.0).unwrap();
        assert_eq!(reading.signal, SignalKind::Sell);
        assert!(reading.value.scalar().unwrap() > 70.0);
    }

    #[test]
    fn rsi_rejects_short_series() {
        let err = rsi(&[1.0, 2.0, 3.0], 14, 70.0, 30.0).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::InsufficientData { required: 15, available: 3 }
        ));
    }

    #[test]
    fn forward_fill_patches_gaps() {
        let series = vec![1.0, f64::NAN, f64::NAN, 4.0, 5.0];
        let filled = prepare_series(&series, 3).unwrap();
        assert_eq!(filled, vec![1.0, 1.0, 1.0, 4.0, 5.0]);
    }

    #[test]
    fn bollinger_position_in_unit_interval() {
        let mut series = uptrend(30);
        series.extend(downtrend(10));
        let reading = bollinger_bands(&series, 20, 2.0).unwrap();
        let position = reading.value.field("position").unwrap();
        assert!((-0.5..=1.5).contains(&position));
        let upper = reading.value.field("upper").unwrap();
        let lower = reading.value.field("lower").unwrap();
        assert!(upper > lower);
    }

    #[test]
    fn bollinger_flat_series_is_neutral() {
        let flat = vec![100.0; 30];
        let reading = bollinger_bands(&flat, 20, 2.0).unwrap();
        assert_eq!(reading.value.field("position").unwrap(), 0.5);
        assert_eq!(reading.signal, SignalKind::Hold);
    }

    #[test]
    fn williams_r_in_bounds() {
        for series in [uptrend(30), downtrend(30)] {
            let reading = williams_r(&series, &series, &series, 14, -20.0, -80.0).unwrap();
            let value = reading.value.scalar().unwrap();
            assert!((-100.0..=0.0).contains(&value), "williams out of bounds: {value}");
        }
    }

    #[test]
    fn stochastic_flat_range_is_neutral() {
        let flat = vec![10.0; 20];
        let reading = stochastic(&flat, &flat, &flat, 14, 3, 80.0, 20.0).unwrap();
        assert_eq!(reading.value.field("k_percent").unwrap(), 50.0);
    }

    #[test]
    fn ma_cross_uptrend_never_sells() {
        // Synthetic 100-period uptrend: short MA must sit above long MA
        // with positive divergence and a non-sell signal.
        let series = uptrend(100);
        let reading = moving_average_cross(&series, 10, 50).unwrap();
        let short_ma = reading.value.field("short_ma").unwrap();
        let long_ma = reading.value.field("long_ma").unwrap();
        let divergence = reading.value.field("divergence").unwrap();
        assert!(short_ma > long_ma);
        assert!(divergence > 0.0);
        assert!(
            matches!(reading.signal, SignalKind::Buy | SignalKind::StrongBuy | SignalKind::Hold),
            "unexpected signal {:?}",
            reading.signal
        );
    }

    #[test]
    fn ma_cross_detects_golden_cross() {
        // Long decline then a sharp rally pushes the short MA through the
        // long MA from below.
        let mut series = downtrend(60);
        series.extend((0..25).map(|i| 140.0 + i as f64 * 4.0));
        let reading = moving_average_cross(&series, 5, 20).unwrap();
        assert!(reading.value.field("short_ma").unwrap() > reading.value.field("long_ma").unwrap());
        assert!(!reading.signal.is_sell());
    }

    #[test]
    fn macd_uptrend_is_not_bearish() {
        let series = uptrend(60);
        let reading = macd(&series, 12, 26, 9).unwrap();
        assert!(!reading.signal.is_sell());
        assert!(reading.value.field("macd").unwrap() > 0.0);
    }

    #[test]
    fn combine_scores_sum_to_one() {
        let series = uptrend(60);
        let readings = vec![
            rsi(&series, 14, 70.0, 30.0).unwrap(),
            macd(&series, 12, 26, 9).unwrap(),
            bollinger_bands(&series, 20, 2.0).unwrap(),
            moving_average_cross(&series, 10, 50).unwrap(),
        ];
        let weights = vec![1.0, 1.5, 1.0, 2.0];
        let fused = combine(&readings, &weights).unwrap();

        let sum = fused.value.field("buy_score").unwrap()
            + fused.value.field("sell_score").unwrap()
            + fused.value.field("hold_score").unwrap();
        assert!((sum - 1.0).abs() < 1e-9, "scores sum to {sum}");
        assert!((0.0..=1.0).contains(&fused.strength));
    }

    #[test]
    fn combine_rejects_empty_and_mismatched_inputs() {
        assert!(matches!(
            combine(&[], &[]),
            Err(AnalysisError::InvalidIndicator { .. })
        ));

        let series = uptrend(30);
        let readings = vec![rsi(&series, 14, 70.0, 30.0).unwrap()];
        assert!(matches!(
            combine(&readings, &[1.0, 2.0]),
            Err(AnalysisError::InvalidIndicator { .. })
        ));
    }

    #[test]
    fn combine_unanimous_strong_buy_escalates() {
        let reading = |strength| IndicatorReading {
            value: IndicatorValue::Scalar(0.0),
            signal: SignalKind::Buy,
            strength,
            metadata: HashMap::new(),
        };
        let readings = vec![reading(0.9), reading(0.8), reading(0.95)];
        let fused = combine(&readings, &[1.0, 1.0, 1.0]).unwrap();
        assert_eq!(fused.signal, SignalKind::StrongBuy);
    }

    #[test]
    fn atr_positive_on_moving_series() {
        let high: Vec<f64> = (0..30).map(|i| 102.0 + i as f64).collect();
        let low: Vec<f64> = (0..30).map(|i| 98.0 + i as f64).collect();
        let close: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let value = atr(&high, &low, &close, 14).unwrap();
        assert!(value > 0.0);
    }
}
