use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Direction, SignalStatus, Timeframe, Trend};

/// Derived every cycle from a candle window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub computed_at: DateTime<Utc>,
    pub close: f64,
    pub atr: f64,
    pub volume_ratio: f64,
    /// ATR / close, in percent.
    pub volatility: f64,
    pub trend: Trend,
    /// 0..=1, EMA spread measured in ATRs.
    pub trend_strength: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk_reward: f64,
    pub confidence: f64,
    /// Position-sizing hint for consumers, copied from the symbol config.
    pub risk_percent: f64,
    pub atr: f64,
    pub volume_ratio: f64,
    pub high_volatility: bool,
    pub mtf_confirmed: bool,
    pub generated_at: DateTime<Utc>,
    pub fingerprint: String,
}

impl Signal {
    /// long: stop < entry < target; short: target < entry < stop
    pub fn levels_valid(&self) -> bool {
        match self.direction {
            Direction::Long => self.stop_loss < self.entry_price && self.entry_price < self.take_profit,
            Direction::Short => self.take_profit < self.entry_price && self.entry_price < self.stop_loss,
        }
    }
}

/// Dedup key: symbol, direction and the three price levels rounded to
/// five significant digits.
pub fn fingerprint(symbol: &str, direction: Direction, entry: f64, stop: f64, target: f64) -> String {
    format!(
        "{}:{}:{}:{}:{}",
        symbol,
        direction,
        round_sig(entry, 5),
        round_sig(stop, 5),
        round_sig(target, 5)
    )
}

pub fn round_sig(x: f64, digits: i32) -> f64 {
    if x == 0.0 || !x.is_finite() {
        return 0.0;
    }
    let magnitude = x.abs().log10().floor() as i32;
    let factor = 10f64.powi(digits - 1 - magnitude);
    (x * factor).round() / factor
}

/// A persisted signal plus its resolution state. `id` stays stable while the
/// signal is active, so a re-emission upserts the same document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub id: String,
    pub signal: Signal,
    pub status: SignalStatus,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_price: Option<f64>,
}

impl SignalRecord {
    pub fn active(signal: Signal) -> Self {
        Self {
            id: format!("{}@{}", signal.fingerprint, signal.generated_at.timestamp_millis()),
            signal,
            status: SignalStatus::Active,
            resolved_at: None,
            exit_price: None,
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.signal.fingerprint
    }

    pub fn apply(&mut self, outcome: &OutcomeUpdate) {
        self.status = outcome.status;
        self.resolved_at = Some(outcome.resolved_at);
        self.exit_price = outcome.exit_price;
    }

    /// +RR when the target was hit, -1R on the stop, `None` otherwise.
    pub fn realized_r(&self) -> Option<f64> {
        match self.status {
            SignalStatus::HitTarget => Some(self.signal.risk_reward),
            SignalStatus::HitStop => Some(-1.0),
            _ => None,
        }
    }
}

/// Resolution written to the results collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeUpdate {
    pub record_id: String,
    pub fingerprint: String,
    pub symbol: String,
    pub status: SignalStatus,
    pub resolved_at: DateTime<Utc>,
    #[serde(default)]
    pub exit_price: Option<f64>,
}
