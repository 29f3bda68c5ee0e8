use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::FetchError;
use crate::exchange::Exchange;
use crate::models::{Candle, CandleSeries, Timeframe};

type Key = (String, Timeframe);

#[derive(Default)]
struct State {
    data: HashMap<Key, Vec<Candle>>,
    now: Option<DateTime<Utc>>,
    failing: HashSet<Key>,
    calls: usize,
}

/// An Exchange that replays pre-loaded candles. A cursor (`now`) controls
/// which candles are visible: only candles opened at or before it are
/// returned, simulating a forward walk. Clones share state, so a handle can
/// keep steering the replay after the exchange has been handed to the bot.
#[derive(Clone, Default)]
pub struct HistoricalExchange {
    state: Arc<Mutex<State>>,
}

impl HistoricalExchange {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // a poisoned lock only means a test panicked mid-update
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Candles must be sorted oldest-first.
    pub fn load(&self, symbol: &str, candles: CandleSeries) {
        let key = (symbol.to_string(), candles.timeframe());
        self.state().data.insert(key, candles.as_slice().to_vec());
    }

    /// Advance the replay clock; `None` exposes everything.
    pub fn set_time(&self, t: Option<DateTime<Utc>>) {
        self.state().now = t;
    }

    /// Make every fetch of `symbol`/`tf` time out until cleared.
    pub fn set_failing(&self, symbol: &str, tf: Timeframe, failing: bool) {
        let key = (symbol.to_string(), tf);
        let mut state = self.state();
        if failing {
            state.failing.insert(key);
        } else {
            state.failing.remove(&key);
        }
    }

    pub fn calls(&self) -> usize {
        self.state().calls
    }

    fn visible_candles(state: &State, key: &Key, limit: usize) -> Vec<Candle> {
        let Some(all) = state.data.get(key) else {
            return Vec::new();
        };
        let end = match state.now {
            Some(now) => all.partition_point(|c| c.open_time <= now),
            None => all.len(),
        };
        let start = end.saturating_sub(limit);
        all[start..end].to_vec()
    }
}

#[async_trait]
impl Exchange for HistoricalExchange {
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        tf: Timeframe,
        limit: usize,
    ) -> Result<CandleSeries, FetchError> {
        let mut state = self.state();
        state.calls += 1;
        let key = (symbol.to_string(), tf);
        if state.failing.contains(&key) {
            return Err(FetchError::Timeout(Duration::from_secs(0)));
        }
        if !state.data.contains_key(&key) {
            return Err(FetchError::Provider(format!("no data for {} {}", symbol, tf)));
        }
        Ok(CandleSeries::new(tf, Self::visible_candles(&state, &key, limit)))
    }
}
