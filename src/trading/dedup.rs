use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

use crate::models::{Signal, SignalRecord, SignalStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupDecision {
    Emit,
    Suppress,
}

#[derive(Debug, Clone)]
struct ActiveSlot {
    fingerprint: String,
    emitted_at: DateTime<Utc>,
}

/// Tracks the last emitted fingerprint per symbol. A repeat of that
/// fingerprint inside the cooldown is suppressed; anything else is new.
#[derive(Debug)]
pub struct SignalDeduplicator {
    cooldown: chrono::Duration,
    active: HashMap<String, ActiveSlot>,
    suppressed: usize,
}

impl SignalDeduplicator {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown: chrono::Duration::from_std(cooldown).unwrap_or(chrono::Duration::MAX),
            active: HashMap::new(),
            suppressed: 0,
        }
    }

    /// Check-and-set in one step: an `Emit` decision already records the
    /// signal as the symbol's active fingerprint.
    pub fn check_and_record(&mut self, signal: &Signal, now: DateTime<Utc>) -> DedupDecision {
        if let Some(slot) = self.active.get(&signal.symbol) {
            if slot.fingerprint == signal.fingerprint && now - slot.emitted_at < self.cooldown {
                self.suppressed += 1;
                return DedupDecision::Suppress;
            }
        }
        self.active.insert(
            signal.symbol.clone(),
            ActiveSlot {
                fingerprint: signal.fingerprint.clone(),
                emitted_at: now,
            },
        );
        DedupDecision::Emit
    }

    /// Frees the slot once its signal is resolved.
    pub fn release(&mut self, symbol: &str, fingerprint: &str) {
        if self
            .active
            .get(symbol)
            .is_some_and(|slot| slot.fingerprint == fingerprint)
        {
            self.active.remove(symbol);
        }
    }

    /// Restore slots from persisted active signals, newest per symbol.
    pub fn seed(&mut self, records: &[SignalRecord]) {
        for r in records.iter().filter(|r| r.status == SignalStatus::Active) {
            let newer = self
                .active
                .get(&r.signal.symbol)
                .map_or(true, |slot| slot.emitted_at < r.signal.generated_at);
            if newer {
                self.active.insert(
                    r.signal.symbol.clone(),
                    ActiveSlot {
                        fingerprint: r.signal.fingerprint.clone(),
                        emitted_at: r.signal.generated_at,
                    },
                );
            }
        }
    }

    pub fn suppressed(&self) -> usize {
        self.suppressed
    }

    pub fn active_fingerprint(&self, symbol: &str) -> Option<&str> {
        self.active.get(symbol).map(|s| s.fingerprint.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::sample_signal;
    use crate::models::Direction;

    fn dedup() -> SignalDeduplicator {
        SignalDeduplicator::new(Duration::from_secs(180))
    }

    #[test]
    fn repeat_within_cooldown_is_suppressed() {
        let mut d = dedup();
        let s = sample_signal("BTCUSDT", Direction::Long, 50000.0);
        let t0 = s.generated_at;
        assert_eq!(d.check_and_record(&s, t0), DedupDecision::Emit);
        assert_eq!(
            d.check_and_record(&s, t0 + chrono::Duration::seconds(60)),
            DedupDecision::Suppress
        );
        assert_eq!(d.suppressed(), 1);
    }

    #[test]
    fn repeat_after_cooldown_is_new() {
        let mut d = dedup();
        let s = sample_signal("BTCUSDT", Direction::Long, 50000.0);
        let t0 = s.generated_at;
        d.check_and_record(&s, t0);
        assert_eq!(
            d.check_and_record(&s, t0 + chrono::Duration::seconds(180)),
            DedupDecision::Emit
        );
    }

    #[test]
    fn different_fingerprint_is_new() {
        let mut d = dedup();
        let a = sample_signal("BTCUSDT", Direction::Long, 50000.0);
        let b = sample_signal("BTCUSDT", Direction::Long, 50100.0);
        let t0 = a.generated_at;
        d.check_and_record(&a, t0);
        assert_eq!(d.check_and_record(&b, t0), DedupDecision::Emit);
        assert_eq!(d.active_fingerprint("BTCUSDT"), Some(b.fingerprint.as_str()));
    }

    #[test]
    fn symbols_do_not_interfere() {
        let mut d = dedup();
        let btc = sample_signal("BTCUSDT", Direction::Long, 50000.0);
        let eth = sample_signal("ETHUSDT", Direction::Long, 50000.0);
        let t0 = btc.generated_at;
        assert_eq!(d.check_and_record(&btc, t0), DedupDecision::Emit);
        assert_eq!(d.check_and_record(&eth, t0), DedupDecision::Emit);
    }

    #[test]
    fn release_and_seed() {
        let mut d = dedup();
        let s = sample_signal("BTCUSDT", Direction::Short, 50000.0);
        let t0 = s.generated_at;
        d.seed(&[SignalRecord::active(s.clone())]);
        assert_eq!(d.check_and_record(&s, t0), DedupDecision::Suppress);

        d.release("BTCUSDT", &s.fingerprint);
        assert_eq!(d.active_fingerprint("BTCUSDT"), None);
        assert_eq!(d.check_and_record(&s, t0), DedupDecision::Emit);
    }
}
