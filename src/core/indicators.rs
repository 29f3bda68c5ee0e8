//! Indicator engine: candle window in, [`IndicatorSnapshot`] out.
//!
//! ATR is the simple average of the last `atr_period` true ranges, each taken
//! against the previous close, so a window needs `atr_period + 1` candles.
//! Trend compares a fast and slow EMA of closes (both seeded with the first
//! close of the window) and is flat while their relative spread stays inside
//! `trend_epsilon`.

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::error::IndicatorError;
use crate::models::{Candle, CandleSeries, IndicatorSnapshot, Trend};

#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    pub atr_period: usize,
    pub fast_period: usize,
    pub slow_period: usize,
    pub trend_epsilon: f64,
}

impl IndicatorEngine {
    pub fn new(cfg: &Config) -> Self {
        Self::with_params(
            cfg.atr_period,
            cfg.trend_fast_period,
            cfg.trend_slow_period,
            cfg.trend_epsilon,
        )
    }

    pub fn with_params(atr_period: usize, fast_period: usize, slow_period: usize, trend_epsilon: f64) -> Self {
        Self {
            atr_period: atr_period.max(1),
            fast_period: fast_period.max(1),
            slow_period: slow_period.max(1),
            trend_epsilon,
        }
    }

    pub fn min_candles(&self) -> usize {
        self.atr_period + 1
    }

    fn check_len(&self, series: &CandleSeries) -> Result<(), IndicatorError> {
        if series.len() < self.min_candles() {
            return Err(IndicatorError::InsufficientData {
                needed: self.min_candles(),
                got: series.len(),
            });
        }
        Ok(())
    }

    pub fn compute(
        &self,
        symbol: &str,
        series: &CandleSeries,
        now: DateTime<Utc>,
    ) -> Result<IndicatorSnapshot, IndicatorError> {
        self.check_len(series)?;
        let candles = series.as_slice();
        let close = candles[candles.len() - 1].close;

        let atr = calc_atr(candles, self.atr_period);
        let volume_ratio = volume_ratio(candles, self.atr_period);
        let volatility = safe_div(atr, close) * 100.0;
        let (trend, spread) = self.trend_of(candles);
        let trend_strength = if trend == Trend::Flat {
            0.0
        } else {
            safe_div(spread, atr).min(1.0)
        };

        Ok(IndicatorSnapshot {
            symbol: symbol.to_string(),
            timeframe: series.timeframe(),
            computed_at: now,
            close,
            atr,
            volume_ratio,
            volatility,
            trend,
            trend_strength,
        })
    }

    /// Trend only; used for higher-timeframe confirmation.
    pub fn trend(&self, series: &CandleSeries) -> Result<Trend, IndicatorError> {
        self.check_len(series)?;
        Ok(self.trend_of(series.as_slice()).0)
    }

    fn trend_of(&self, candles: &[Candle]) -> (Trend, f64) {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let fast = ema(&closes, self.fast_period);
        let slow = ema(&closes, self.slow_period);
        let spread = (fast - slow).abs();

        if !spread.is_finite() || safe_div(spread, slow.abs()) < self.trend_epsilon {
            return (Trend::Flat, 0.0);
        }
        if fast > slow {
            (Trend::Up, spread)
        } else {
            (Trend::Down, spread)
        }
    }
}

/// SMA of the last `period` true ranges. Callers guarantee `period + 1` candles.
pub fn calc_atr(candles: &[Candle], period: usize) -> f64 {
    if candles.len() < 2 || period == 0 {
        return 0.0;
    }
    let start = candles.len().saturating_sub(period).max(1);
    let trs: Vec<f64> = (start..candles.len())
        .map(|i| candles[i].true_range(candles[i - 1].close))
        .collect();
    let atr = trs.iter().sum::<f64>() / trs.len() as f64;
    if atr.is_finite() {
        atr.max(0.0)
    } else {
        0.0
    }
}

/// Latest volume over the SMA of the last `period` volumes (latest included).
pub fn volume_ratio(candles: &[Candle], period: usize) -> f64 {
    let Some(latest) = candles.last() else {
        return 0.0;
    };
    let start = candles.len().saturating_sub(period.max(1));
    let window = &candles[start..];
    let avg = window.iter().map(|c| c.volume).sum::<f64>() / window.len() as f64;
    safe_div(latest.volume, avg).max(0.0)
}

/// Exponential moving average seeded with the first value.
pub fn ema(values: &[f64], period: usize) -> f64 {
    let Some(&first) = values.first() else {
        return 0.0;
    };
    let alpha = 2.0 / (period as f64 + 1.0);
    values[1..]
        .iter()
        .fold(first, |acc, &v| alpha * v + (1.0 - alpha) * acc)
}

/// Division that yields zero instead of inf/NaN.
fn safe_div(num: f64, den: f64) -> f64 {
    if den == 0.0 || !den.is_finite() || !num.is_finite() {
        return 0.0;
    }
    num / den
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{make_bearish_trend, make_bullish_trend, make_candles, make_flat};

    fn engine() -> IndicatorEngine {
        IndicatorEngine::with_params(14, 9, 21, 0.0005)
    }

    #[test]
    fn insufficient_data_below_lookback_plus_one() {
        let series = make_bullish_trend(14, 100.0);
        let err = engine().compute("BTCUSDT", &series, Utc::now()).unwrap_err();
        assert_eq!(err, IndicatorError::InsufficientData { needed: 15, got: 14 });
        assert!(engine().compute("BTCUSDT", &make_bullish_trend(15, 100.0), Utc::now()).is_ok());
    }

    #[test]
    fn atr_of_constant_range_bars() {
        // each bar: range 10, no gaps -> TR = 10
        let data: Vec<(f64, f64, f64, f64)> = (0..20).map(|_| (100.0, 105.0, 95.0, 100.0)).collect();
        let candles = make_candles(&data);
        assert!((calc_atr(candles.as_slice(), 14) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn atr_counts_gaps() {
        let candles = make_candles(&[
            (100.0, 101.0, 99.0, 100.0),
            (110.0, 111.0, 109.0, 110.0), // TR = 111 - 100 = 11
        ]);
        assert!((calc_atr(candles.as_slice(), 14) - 11.0).abs() < 1e-9);
    }

    #[test]
    fn uptrend_and_downtrend_detected() {
        let up = engine().compute("X", &make_bullish_trend(40, 100.0), Utc::now()).unwrap();
        assert_eq!(up.trend, Trend::Up);
        assert!(up.trend_strength > 0.0 && up.trend_strength <= 1.0);

        let down = engine().compute("X", &make_bearish_trend(40, 1000.0), Utc::now()).unwrap();
        assert_eq!(down.trend, Trend::Down);
    }

    #[test]
    fn flat_series_is_flat_with_zero_strength() {
        let snap = engine().compute("X", &make_flat(40, 100.0), Utc::now()).unwrap();
        assert_eq!(snap.trend, Trend::Flat);
        assert_eq!(snap.trend_strength, 0.0);
    }

    #[test]
    fn volume_ratio_of_spike() {
        let mut series = make_flat(20, 100.0);
        let mut spike = series.last().unwrap().clone();
        spike.open_time = spike.open_time + chrono::Duration::minutes(3);
        spike.volume = 1500.0;
        series.push(spike);
        let ratio = volume_ratio(series.as_slice(), 14);
        // 13 bars of 100 + 1500 -> avg 200
        assert!((ratio - 7.5).abs() < 1e-9);
    }

    #[test]
    fn zero_volume_and_zero_price_do_not_error() {
        let data: Vec<(f64, f64, f64, f64)> = (0..20).map(|_| (0.0, 0.0, 0.0, 0.0)).collect();
        let mut series = make_candles(&data);
        let zeroed: Vec<Candle> = series
            .iter()
            .map(|c| Candle { volume: 0.0, ..c.clone() })
            .collect();
        series = CandleSeries::new(series.timeframe(), zeroed);
        let snap = engine().compute("X", &series, Utc::now()).unwrap();
        assert_eq!(snap.atr, 0.0);
        assert_eq!(snap.volume_ratio, 0.0);
        assert_eq!(snap.volatility, 0.0);
        assert_eq!(snap.trend, Trend::Flat);
    }

    #[test]
    fn atr_and_volume_ratio_never_negative() {
        for n in [15usize, 30, 80] {
            for series in [make_bullish_trend(n, 50.0), make_bearish_trend(n, 5000.0), make_flat(n, 1.0)] {
                let snap = engine().compute("X", &series, Utc::now()).unwrap();
                assert!(snap.atr >= 0.0);
                assert!(snap.volume_ratio >= 0.0);
                assert!(snap.volatility >= 0.0);
            }
        }
    }

    #[test]
    fn volatility_is_percent_of_close() {
        let data: Vec<(f64, f64, f64, f64)> = (0..20).map(|_| (100.0, 101.0, 99.0, 100.0)).collect();
        let snap = engine().compute("X", &make_candles(&data), Utc::now()).unwrap();
        assert!((snap.volatility - 2.0).abs() < 1e-9);
    }

    #[test]
    fn ema_seeded_with_first_value() {
        assert_eq!(ema(&[], 5), 0.0);
        assert_eq!(ema(&[42.0], 5), 42.0);
        let v = ema(&[10.0, 20.0], 3); // alpha = 0.5
        assert!((v - 15.0).abs() < 1e-9);
    }
}
