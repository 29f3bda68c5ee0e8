pub mod binance;
pub mod historical;

pub use binance::BinanceClient;
pub use historical::HistoricalExchange;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::models::{CandleSeries, Timeframe};

/// Market data provider. Returns the most recent `limit` candles, oldest
/// first. Implementations enforce their own per-call timeout and never retry.
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        tf: Timeframe,
        limit: usize,
    ) -> Result<CandleSeries, FetchError>;
}
