use tracing::debug;

use crate::config::{Config, SymbolConfig};
use crate::models::{fingerprint, Candle, Direction, IndicatorSnapshot, Signal};

const BASE_CONFIDENCE: f64 = 0.4;
const TREND_WEIGHT: f64 = 0.35;
const VOLUME_WEIGHT: f64 = 0.25;
const HIGH_VOLATILITY_PENALTY: f64 = 0.8;
/// Absorbs float noise so a ratio equal to the minimum still passes.
const RR_TOLERANCE: f64 = 1e-9;

/// Turns an indicator snapshot into a candidate [`Signal`] using ATR-based
/// stop/target placement and the symbol's minimum risk:reward.
#[derive(Debug, Clone)]
pub struct RiskFilter {
    pub volume_threshold: f64,
    pub volatility_threshold: f64,
}

impl RiskFilter {
    pub fn new(cfg: &Config) -> Self {
        Self::with_thresholds(cfg.volume_threshold, cfg.volatility_threshold)
    }

    pub fn with_thresholds(volume_threshold: f64, volatility_threshold: f64) -> Self {
        Self {
            volume_threshold,
            volatility_threshold,
        }
    }

    /// `None` means "no setup", which is a normal outcome.
    pub fn evaluate(
        &self,
        latest: &Candle,
        snapshot: &IndicatorSnapshot,
        sym: &SymbolConfig,
    ) -> Option<Signal> {
        let direction = snapshot.trend.to_direction()?;
        let entry = latest.close;
        let atr = snapshot.atr;
        if !(atr.is_finite() && atr > 0.0 && entry.is_finite() && entry > 0.0) {
            return None;
        }

        let (stop, target) = atr_levels(direction, entry, atr, sym.atr_sl_mult, sym.atr_tp_mult);
        if stop <= 0.0 || target <= 0.0 {
            debug!("{}: ATR levels cross zero, skipping", sym.symbol);
            return None;
        }

        let rr = risk_reward(entry, stop, target);
        if rr + RR_TOLERANCE < sym.min_rr {
            debug!(
                "{}: {} setup rejected, R:R {:.2} < min {:.2}",
                sym.symbol, direction, rr, sym.min_rr
            );
            return None;
        }

        let high_volatility = snapshot.volatility >= self.volatility_threshold;
        let signal = Signal {
            symbol: sym.symbol.clone(),
            timeframe: snapshot.timeframe,
            direction,
            entry_price: entry,
            stop_loss: stop,
            take_profit: target,
            risk_reward: rr,
            confidence: self.confidence(snapshot),
            risk_percent: sym.risk_percent,
            atr,
            volume_ratio: snapshot.volume_ratio,
            high_volatility,
            mtf_confirmed: false,
            generated_at: snapshot.computed_at,
            fingerprint: fingerprint(&sym.symbol, direction, entry, stop, target),
        };

        signal.levels_valid().then_some(signal)
    }

    /// Advisory score in [0, 1]; never used as a gate.
    pub fn confidence(&self, snapshot: &IndicatorSnapshot) -> f64 {
        let volume_boost = if snapshot.volume_ratio >= self.volume_threshold {
            1.0
        } else if self.volume_threshold > 0.0 {
            snapshot.volume_ratio / self.volume_threshold
        } else {
            0.0
        };
        let mut score = BASE_CONFIDENCE
            + TREND_WEIGHT * snapshot.trend_strength
            + VOLUME_WEIGHT * volume_boost;
        if snapshot.volatility >= self.volatility_threshold {
            score *= HIGH_VOLATILITY_PENALTY;
        }
        if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Stop on the adverse side, target on the favorable side.
pub fn atr_levels(direction: Direction, entry: f64, atr: f64, sl_mult: f64, tp_mult: f64) -> (f64, f64) {
    let sign = direction.sign();
    (entry - sign * atr * sl_mult, entry + sign * atr * tp_mult)
}

/// |target - entry| / |entry - stop|; zero when the stop sits on entry.
pub fn risk_reward(entry: f64, stop: f64, target: f64) -> f64 {
    let risk = (entry - stop).abs();
    if risk == 0.0 {
        return 0.0;
    }
    (target - entry).abs() / risk
}
