use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::config::{default_symbol_rr, Config, StoreCollections};
use crate::core::risk::atr_levels;
use crate::error::StoreError;
use crate::models::{
    fingerprint, Candle, CandleSeries, Direction, IndicatorSnapshot, OutcomeUpdate, Signal,
    SignalRecord, Timeframe, Trend,
};
use crate::storage::{MemoryStore, SignalStore};

pub fn base_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-15T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn bar(i: usize, open: f64, high: f64, low: f64, close: f64) -> Candle {
    let open_time = base_time() + Duration::minutes(3 * i as i64);
    Candle {
        open_time,
        close_time: open_time + Duration::minutes(3) - Duration::milliseconds(1),
        open,
        high,
        low,
        close,
        volume: 100.0,
    }
}

/// Create 3m candles from (open, high, low, close) tuples.
pub fn make_candles(data: &[(f64, f64, f64, f64)]) -> CandleSeries {
    let candles = data
        .iter()
        .enumerate()
        .map(|(i, &(o, h, l, c))| bar(i, o, h, l, c))
        .collect();
    CandleSeries::new(Timeframe::M3, candles)
}

/// Create n rising candles starting from `start` price.
pub fn make_bullish_trend(n: usize, start: f64) -> CandleSeries {
    let candles = (0..n)
        .map(|i| {
            let open = start + i as f64 * 10.0;
            let close = open + 8.0;
            bar(i, open, close + 2.0, open - 1.0, close)
        })
        .collect();
    CandleSeries::new(Timeframe::M3, candles)
}

/// Create n falling candles starting from `start` price.
pub fn make_bearish_trend(n: usize, start: f64) -> CandleSeries {
    let candles = (0..n)
        .map(|i| {
            let open = start - i as f64 * 10.0;
            let close = open - 8.0;
            bar(i, open, open + 1.0, close - 2.0, close)
        })
        .collect();
    CandleSeries::new(Timeframe::M3, candles)
}

/// n unchanged closes with a 0.2% range.
pub fn make_flat(n: usize, price: f64) -> CandleSeries {
    let candles = (0..n)
        .map(|i| bar(i, price, price * 1.001, price * 0.999, price))
        .collect();
    CandleSeries::new(Timeframe::M3, candles)
}

/// A qualifying signal with ATR 100 and the BTC multipliers (1.2 / 2.5).
pub fn sample_signal(symbol: &str, direction: Direction, entry: f64) -> Signal {
    let atr = 100.0;
    let (stop, target) = atr_levels(direction, entry, atr, 1.2, 2.5);
    Signal {
        symbol: symbol.to_string(),
        timeframe: Timeframe::M3,
        direction,
        entry_price: entry,
        stop_loss: stop,
        take_profit: target,
        risk_reward: 2.5 / 1.2,
        confidence: 0.7,
        risk_percent: 1.0,
        atr,
        volume_ratio: 1.5,
        high_volatility: false,
        mtf_confirmed: true,
        generated_at: base_time(),
        fingerprint: fingerprint(symbol, direction, entry, stop, target),
    }
}

pub fn sample_snapshot(symbol: &str) -> IndicatorSnapshot {
    IndicatorSnapshot {
        symbol: symbol.to_string(),
        timeframe: Timeframe::M3,
        computed_at: base_time(),
        close: 50000.0,
        atr: 100.0,
        volume_ratio: 1.5,
        volatility: 0.2,
        trend: Trend::Up,
        trend_strength: 0.8,
    }
}

/// In-memory backend whose writes can be made to fail on demand.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
    writes: Mutex<Vec<String>>,
}

impl FlakyStore {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    fn check(&self, kind: &str) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::PersistenceUnavailable("backend down".into()));
        }
        self.writes.lock().unwrap().push(kind.to_string());
        Ok(())
    }
}

#[async_trait]
impl SignalStore for FlakyStore {
    async fn upsert_signal(&self, record: &SignalRecord) -> Result<(), StoreError> {
        self.check("signal")?;
        self.inner.upsert_signal(record).await
    }

    async fn upsert_outcome(&self, outcome: &OutcomeUpdate) -> Result<(), StoreError> {
        self.check("outcome")?;
        self.inner.upsert_outcome(outcome).await
    }

    async fn record_snapshot(&self, snapshot: &IndicatorSnapshot) -> Result<(), StoreError> {
        self.check("snapshot")?;
        self.inner.record_snapshot(snapshot).await
    }

    async fn query(
        &self,
        symbol: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SignalRecord>, StoreError> {
        self.inner.query(symbol, from, to).await
    }
}

/// Creates a valid Config with defaults for tests, without reading the env.
pub fn default_test_config() -> Config {
    let symbol_rr: HashMap<_, _> = default_symbol_rr();
    Config {
        telegram_bot_token: "test-token".to_string(),
        telegram_chat_id: "12345".to_string(),
        enable_persistence: false,
        store_uri: std::env::temp_dir()
            .join("signal_detector_test")
            .to_string_lossy()
            .to_string(),
        store_database: "crypto_trading".to_string(),
        store_collections: StoreCollections {
            signals: "trading_signals".to_string(),
            results: "signal_results".to_string(),
            market_data: "market_analysis".to_string(),
        },
        symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
        symbol_rr,
        market_data_url: "http://127.0.0.1:9".to_string(),
        interval: Timeframe::M3,
        mtf_interval: Timeframe::M15,
        candle_limit: 120,
        loop_sleep: std::time::Duration::from_secs(15),
        mtf_confirm: true,
        send_images: false,
        volume_threshold: 1.2,
        volatility_threshold: 2.0,
        atr_period: 14,
        trend_fast_period: 9,
        trend_slow_period: 21,
        trend_epsilon: 0.0005,
        api_timeout: std::time::Duration::from_secs(20),
        telegram_timeout: std::time::Duration::from_secs(10),
        retry_delay: std::time::Duration::ZERO,
        fetch_max_attempts: 2,
        symbol_delay: std::time::Duration::ZERO,
        dedup_cooldown: std::time::Duration::from_secs(180),
        signal_expiry: std::time::Duration::from_secs(24 * 3600),
        performance_report_interval: std::time::Duration::from_secs(6 * 3600),
        performance_report_days: 7,
        log_level: "error".to_string(),
    }
}
