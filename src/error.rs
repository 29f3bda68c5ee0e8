use std::time::Duration;

use thiserror::Error;

/// Market-data provider failures. Retrying is the caller's job.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("provider did not respond within {0:?}")]
    Timeout(Duration),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("malformed provider payload: {0}")]
    Malformed(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndicatorError {
    #[error("insufficient data: need {needed} candles, got {got}")]
    InsufficientData { needed: usize, got: usize },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::PersistenceUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::PersistenceUnavailable(format!("encode: {e}"))
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification not delivered within {0:?}")]
    Timeout(Duration),
    #[error("notification rejected: {0}")]
    Delivery(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// A stage failure that skips one symbol for the current pass.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Indicator(#[from] IndicatorError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no symbol configuration for {0}")]
    UnknownSymbol(String),
}
