use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::models::{CandleSeries, Direction, OutcomeUpdate, SignalRecord, SignalStatus};

/// Walks candles opened at or after the signal's generation time. The stop is
/// checked before the target inside a candle, since intrabar order is unknown.
/// An untouched signal older than `expiry` resolves as expired.
pub fn resolve(
    record: &SignalRecord,
    candles: &CandleSeries,
    now: DateTime<Utc>,
    expiry: Duration,
) -> Option<OutcomeUpdate> {
    if record.status.is_resolved() {
        return None;
    }
    let s = &record.signal;

    for c in candles.since(s.generated_at) {
        let (stop_hit, target_hit) = match s.direction {
            Direction::Long => (c.low <= s.stop_loss, c.high >= s.take_profit),
            Direction::Short => (c.high >= s.stop_loss, c.low <= s.take_profit),
        };
        let hit = if stop_hit {
            Some((SignalStatus::HitStop, s.stop_loss))
        } else if target_hit {
            Some((SignalStatus::HitTarget, s.take_profit))
        } else {
            None
        };
        if let Some((status, price)) = hit {
            return Some(OutcomeUpdate {
                record_id: record.id.clone(),
                fingerprint: s.fingerprint.clone(),
                symbol: s.symbol.clone(),
                status,
                resolved_at: c.close_time.min(now),
                exit_price: Some(price),
            });
        }
    }

    let expiry = chrono::Duration::from_std(expiry).unwrap_or(chrono::Duration::MAX);
    if now - s.generated_at >= expiry {
        return Some(OutcomeUpdate {
            record_id: record.id.clone(),
            fingerprint: s.fingerprint.clone(),
            symbol: s.symbol.clone(),
            status: SignalStatus::Expired,
            resolved_at: now,
            exit_price: candles.last().map(|c| c.close),
        });
    }
    None
}
