use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{SignalRecord, SignalStatus};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolPerformance {
    pub emitted: usize,
    pub hit_target: usize,
    pub hit_stop: usize,
    pub expired: usize,
    pub open: usize,
    /// hit_target / (hit_target + hit_stop); open and expired excluded.
    pub win_rate: f64,
    /// Mean realized R per decided signal: +RR on target, -1 on stop.
    pub realized_rr: f64,
    #[serde(skip)]
    r_sum: f64,
}

impl SymbolPerformance {
    fn add(&mut self, record: &SignalRecord) {
        self.emitted += 1;
        match record.status {
            SignalStatus::HitTarget => self.hit_target += 1,
            SignalStatus::HitStop => self.hit_stop += 1,
            SignalStatus::Expired => self.expired += 1,
            SignalStatus::Active => self.open += 1,
        }
        if let Some(r) = record.realized_r() {
            self.r_sum += r;
        }
    }

    fn finish(&mut self) {
        let decided = self.hit_target + self.hit_stop;
        if decided > 0 {
            self.win_rate = round4(self.hit_target as f64 / decided as f64);
            self.realized_rr = round4(self.r_sum / decided as f64);
        }
    }

    pub fn decided(&self) -> usize {
        self.hit_target + self.hit_stop
    }
}

/// Signal outcomes over a trailing window, per symbol and in aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub by_symbol: BTreeMap<String, SymbolPerformance>,
    pub total: SymbolPerformance,
}

impl PerformanceReport {
    /// Counts signals generated inside `[start, end]`.
    pub fn build(records: &[SignalRecord], start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let mut by_symbol: BTreeMap<String, SymbolPerformance> = BTreeMap::new();
        let mut total = SymbolPerformance::default();

        for r in records
            .iter()
            .filter(|r| r.signal.generated_at >= start && r.signal.generated_at <= end)
        {
            by_symbol.entry(r.signal.symbol.clone()).or_default().add(r);
            total.add(r);
        }

        by_symbol.values_mut().for_each(SymbolPerformance::finish);
        total.finish();

        Self {
            period_start: start,
            period_end: end,
            by_symbol,
            total,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total.emitted == 0
    }
}

fn round4(x: f64) -> f64 {
    (x * 10000.0).round() / 10000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;
    use crate::test_helpers::sample_signal;

    fn record(symbol: &str, status: SignalStatus, age_days: i64, now: DateTime<Utc>) -> SignalRecord {
        let mut s = sample_signal(symbol, Direction::Long, 50000.0 + age_days as f64 * 10.0);
        s.generated_at = now - chrono::Duration::days(age_days);
        let mut r = SignalRecord::active(s);
        r.status = status;
        r
    }

    #[test]
    fn partitions_outcomes_and_excludes_open_from_win_rate() {
        let now = Utc::now();
        let records = vec![
            record("BTCUSDT", SignalStatus::HitTarget, 1, now),
            record("BTCUSDT", SignalStatus::HitTarget, 2, now),
            record("BTCUSDT", SignalStatus::HitStop, 3, now),
            record("BTCUSDT", SignalStatus::Active, 0, now),
            record("ETHUSDT", SignalStatus::HitStop, 4, now),
            record("ETHUSDT", SignalStatus::Expired, 5, now),
            // outside the 7-day window
            record("ETHUSDT", SignalStatus::HitTarget, 9, now),
        ];
        let report = PerformanceReport::build(&records, now - chrono::Duration::days(7), now);

        let btc = &report.by_symbol["BTCUSDT"];
        assert_eq!((btc.emitted, btc.hit_target, btc.hit_stop, btc.open), (4, 2, 1, 1));
        assert!((btc.win_rate - 0.6667).abs() < 1e-9);

        let eth = &report.by_symbol["ETHUSDT"];
        assert_eq!((eth.emitted, eth.hit_stop, eth.expired), (2, 1, 1));
        assert_eq!(eth.win_rate, 0.0);
        assert_eq!(eth.realized_rr, -1.0);

        assert_eq!(report.total.emitted, 6);
        assert_eq!(report.total.decided(), 4);
        assert_eq!(report.total.win_rate, 0.5);
    }

    #[test]
    fn realized_rr_averages_r_multiples() {
        let now = Utc::now();
        let records = vec![
            record("BTCUSDT", SignalStatus::HitTarget, 1, now),
            record("BTCUSDT", SignalStatus::HitStop, 1, now),
        ];
        let rr = records[0].signal.risk_reward;
        let report = PerformanceReport::build(&records, now - chrono::Duration::days(7), now);
        assert!((report.total.realized_rr - round4((rr - 1.0) / 2.0)).abs() < 1e-9);
    }

    #[test]
    fn empty_window_has_zero_rates() {
        let now = Utc::now();
        let report = PerformanceReport::build(&[], now - chrono::Duration::days(7), now);
        assert!(report.is_empty());
        assert_eq!(report.total.win_rate, 0.0);
        assert!(report.by_symbol.is_empty());
    }
}
