use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::Config;
use crate::error::FetchError;
use crate::exchange::Exchange;
use crate::models::{Candle, CandleSeries, Timeframe};

/// Binance spot REST klines.
pub struct BinanceClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl BinanceClient {
    pub fn new(cfg: &Config) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent("crypto-signal-detector/0.1")
            .timeout(cfg.api_timeout)
            .build()
            .map_err(|e| FetchError::Provider(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: cfg.market_data_url.trim_end_matches('/').to_string(),
            timeout: cfg.api_timeout,
        })
    }

    fn map_err(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else if e.is_decode() {
            FetchError::Malformed(e.to_string())
        } else {
            FetchError::Provider(e.to_string())
        }
    }

    pub async fn fetch_ohlcv(
        &self,
        symbol: &str,
        tf: Timeframe,
        limit: usize,
    ) -> Result<CandleSeries, FetchError> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("symbol", symbol.to_string()),
                ("interval", tf.as_str().to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await
            .map_err(|e| self.map_err(e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.map_err(e))?;
        if !status.is_success() {
            return Err(FetchError::Provider(format!("Binance API error {}: {}", status, body)));
        }

        let series = parse_klines(tf, &body)?;
        debug!("{} {}: fetched {} candles", symbol, tf, series.len());
        Ok(series)
    }
}

#[async_trait]
impl Exchange for BinanceClient {
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        tf: Timeframe,
        limit: usize,
    ) -> Result<CandleSeries, FetchError> {
        BinanceClient::fetch_ohlcv(self, symbol, tf, limit).await
    }
}

/// Parses the kline array payload:
/// `[[openTime, "open", "high", "low", "close", "volume", closeTime, ...], ...]`
pub fn parse_klines(tf: Timeframe, body: &str) -> Result<CandleSeries, FetchError> {
    let rows: Vec<Vec<Value>> =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;

    let mut candles = rows
        .iter()
        .enumerate()
        .map(|(i, row)| parse_row(row).ok_or_else(|| FetchError::Malformed(format!("kline row {i}"))))
        .collect::<Result<Vec<Candle>, FetchError>>()?;

    candles.sort_by_key(|c| c.open_time);
    Ok(CandleSeries::new(tf, candles))
}

fn parse_row(row: &[Value]) -> Option<Candle> {
    if row.len() < 7 {
        return None;
    }
    let open_time = millis(&row[0])?;
    let close_time = millis(&row[6])?;
    Some(Candle {
        open_time,
        close_time,
        open: price(&row[1])?,
        high: price(&row[2])?,
        low: price(&row[3])?,
        close: price(&row[4])?,
        volume: price(&row[5])?,
    })
}

fn millis(v: &Value) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(v.as_i64()?)
}

fn price(v: &Value) -> Option<f64> {
    let x = match v {
        Value::String(s) => s.parse::<f64>().ok()?,
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    x.is_finite().then_some(x)
}
