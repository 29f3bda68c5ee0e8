use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Timeframe;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }
}

/// Ordered (oldest first) candles of a single timeframe. Also serves as the
/// rolling window retained per symbol/timeframe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleSeries {
    timeframe: Timeframe,
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(timeframe: Timeframe, candles: Vec<Candle>) -> Self {
        Self { timeframe, candles }
    }

    pub fn empty(timeframe: Timeframe) -> Self {
        Self::new(timeframe, Vec::new())
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.candles.get(index)
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn first(&self) -> Option<&Candle> {
        self.candles.first()
    }

    pub fn tail(&self, n: usize) -> CandleSeries {
        let start = self.candles.len().saturating_sub(n);
        CandleSeries::new(self.timeframe, self.candles[start..].to_vec())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candle> {
        self.candles.iter()
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    /// Candles opened at or after `ts`.
    pub fn since(&self, ts: DateTime<Utc>) -> impl Iterator<Item = &Candle> {
        self.candles.iter().filter(move |c| c.open_time >= ts)
    }

    pub fn push(&mut self, candle: Candle) {
        self.candles.push(candle);
    }

    /// Append newer candles, replacing the last one when the provider resends
    /// the still-forming bar, then trim the front down to `capacity`.
    pub fn merge(&mut self, fresh: &CandleSeries, capacity: usize) {
        for candle in fresh.iter() {
            match self.candles.last().map(|c| c.open_time) {
                Some(t) if t == candle.open_time => {
                    if let Some(last) = self.candles.last_mut() {
                        *last = candle.clone();
                    }
                }
                Some(t) if t > candle.open_time => {}
                _ => self.candles.push(candle.clone()),
            }
        }
        if self.candles.len() > capacity {
            let excess = self.candles.len() - capacity;
            self.candles.drain(..excess);
        }
    }
}

impl std::ops::Index<usize> for CandleSeries {
    type Output = Candle;
    fn index(&self, index: usize) -> &Self::Output {
        &self.candles[index]
    }
}

impl<'a> IntoIterator for &'a CandleSeries {
    type Item = &'a Candle;
    type IntoIter = std::slice::Iter<'a, Candle>;
    fn into_iter(self) -> Self::IntoIter {
        self.candles.iter()
    }
}
