#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

use crypto_signal_detector::config::{default_symbol_rr, Config, StoreCollections};
use crypto_signal_detector::error::{NotifyError, StoreError};
use crypto_signal_detector::models::{
    Candle, CandleSeries, IndicatorSnapshot, OutcomeUpdate, Signal, SignalRecord, Timeframe,
};
use crypto_signal_detector::notify::{ChartRenderer, Notifier, OutgoingMessage};
use crypto_signal_detector::storage::SignalStore;

pub fn base_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-15T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn candle(tf: Timeframe, open_time: DateTime<Utc>, o: f64, h: f64, l: f64, c: f64) -> Candle {
    Candle {
        open_time,
        close_time: open_time + Duration::seconds(tf.as_seconds() as i64) - Duration::milliseconds(1),
        open: o,
        high: h,
        low: l,
        close: c,
        volume: 100.0,
    }
}

/// n candles stepping by `step` per bar, ending before `end`.
pub fn trend_series(tf: Timeframe, n: usize, start: f64, step: f64, end: DateTime<Utc>) -> CandleSeries {
    let bar = Duration::seconds(tf.as_seconds() as i64);
    let first = end - bar * n as i32;
    let candles = (0..n)
        .map(|i| {
            let open = start + i as f64 * step;
            let close = open + step * 0.8;
            let high = open.max(close) + step.abs() * 0.2;
            let low = open.min(close) - step.abs() * 0.1;
            candle(tf, first + bar * i as i32, open, high, low, close)
        })
        .collect();
    CandleSeries::new(tf, candles)
}

pub fn bullish(tf: Timeframe, n: usize, end: DateTime<Utc>) -> CandleSeries {
    trend_series(tf, n, 100.0, 10.0, end)
}

pub fn bearish(tf: Timeframe, n: usize, end: DateTime<Utc>) -> CandleSeries {
    trend_series(tf, n, 1000.0, -10.0, end)
}

pub fn test_config(symbols: &[&str]) -> Config {
    Config {
        telegram_bot_token: "test-token".to_string(),
        telegram_chat_id: "12345".to_string(),
        enable_persistence: false,
        store_uri: std::env::temp_dir()
            .join("signal_detector_it")
            .to_string_lossy()
            .to_string(),
        store_database: "crypto_trading".to_string(),
        store_collections: StoreCollections {
            signals: "trading_signals".to_string(),
            results: "signal_results".to_string(),
            market_data: "market_analysis".to_string(),
        },
        symbols: symbols.iter().map(|s| s.to_string()).collect(),
        symbol_rr: default_symbol_rr(),
        market_data_url: "http://127.0.0.1:9".to_string(),
        interval: Timeframe::M3,
        mtf_interval: Timeframe::M15,
        candle_limit: 120,
        loop_sleep: std::time::Duration::from_millis(10),
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

/// Records every message; clones share the log.
#[derive(Clone, Default)]
pub struct MockNotifier {
    sent: Arc<Mutex<Vec<OutgoingMessage>>>,
    failing: Arc<Mutex<bool>>,
}

impl MockNotifier {
    pub fn messages(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.messages().into_iter().map(|m| m.text).collect()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, msg: &OutgoingMessage) -> Result<(), NotifyError> {
        if *self.failing.lock().unwrap() {
            return Err(NotifyError::Timeout(std::time::Duration::from_secs(10)));
        }
        self.sent.lock().unwrap().push(msg.clone());
        Ok(())
    }
}

/// Returns a fixed fake PNG and counts how often it was asked.
#[derive(Clone, Default)]
pub struct StubRenderer {
    calls: Arc<Mutex<usize>>,
}

pub const STUB_PNG: &[u8] = &[0x89, b'P', b'N', b'G'];

impl StubRenderer {
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl ChartRenderer for StubRenderer {
    fn render(&self, _signal: &Signal, candles: &CandleSeries) -> Option<Vec<u8>> {
        *self.calls.lock().unwrap() += 1;
        (!candles.is_empty()).then(|| STUB_PNG.to_vec())
    }
}

/// A backend that is never reachable.
pub struct DownStore;

fn down() -> StoreError {
    StoreError::PersistenceUnavailable("connection refused".to_string())
}

#[async_trait]
impl SignalStore for DownStore {
    async fn upsert_signal(&self, _record: &SignalRecord) -> Result<(), StoreError> {
        Err(down())
    }

    async fn upsert_outcome(&self, _outcome: &OutcomeUpdate) -> Result<(), StoreError> {
        Err(down())
    }

    async fn record_snapshot(&self, _snapshot: &IndicatorSnapshot) -> Result<(), StoreError> {
        Err(down())
    }

    async fn query(
        &self,
        _symbol: Option<&str>,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<SignalRecord>, StoreError> {
        Err(down())
    }
}
