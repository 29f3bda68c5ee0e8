use crate::error::ConfigError;
use crate::models::Timeframe;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub type SharedConfig = Arc<Config>;

/// Longest horizon accepted for expiry, report interval and report window.
pub const MAX_HORIZON_DAYS: i64 = 3650;
const MAX_HORIZON: Duration = Duration::from_secs(MAX_HORIZON_DAYS as u64 * 24 * 3600);

/// Per-symbol risk parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolConfig {
    #[serde(default)]
    pub symbol: String,
    pub min_rr: f64,
    pub risk_percent: f64,
    pub atr_sl_mult: f64,
    pub atr_tp_mult: f64,
}

impl SymbolConfig {
    pub fn new(symbol: &str, min_rr: f64, risk_percent: f64, atr_sl_mult: f64, atr_tp_mult: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            min_rr,
            risk_percent,
            atr_sl_mult,
            atr_tp_mult,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("min_rr", self.min_rr),
            ("risk_percent", self.risk_percent),
            ("atr_sl_mult", self.atr_sl_mult),
            ("atr_tp_mult", self.atr_tp_mult),
        ];
        for (name, value) in fields {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid {
                    key: format!("SYMBOL_SPECIFIC_RR.{}.{}", self.symbol, name),
                    reason: format!("must be a positive number, got {value}"),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreCollections {
    pub signals: String,
    pub results: String,
    pub market_data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,

    // Persistence
    pub enable_persistence: bool,
    pub store_uri: String,
    pub store_database: String,
    pub store_collections: StoreCollections,

    // Symbols
    pub symbols: Vec<String>,
    pub symbol_rr: HashMap<String, SymbolConfig>,

    // Market data
    pub market_data_url: String,

    // Polling
    pub interval: Timeframe,
    pub mtf_interval: Timeframe,
    pub candle_limit: usize,
    pub loop_sleep: Duration,

    // Filtering
    pub mtf_confirm: bool,
    pub send_images: bool,
    pub volume_threshold: f64,
    pub volatility_threshold: f64,

    // Indicators
    pub atr_period: usize,
    pub trend_fast_period: usize,
    pub trend_slow_period: usize,
    pub trend_epsilon: f64,

    // Timeouts & delays
    pub api_timeout: Duration,
    pub telegram_timeout: Duration,
    pub retry_delay: Duration,
    pub fetch_max_attempts: u32,
    pub symbol_delay: Duration,

    // Signal lifecycle
    pub dedup_cooldown: Duration,
    pub signal_expiry: Duration,

    // Reporting
    pub performance_report_interval: Duration,
    pub performance_report_days: i64,

    pub log_level: String,
}

/// Risk table shipped with the detector; `SYMBOL_SPECIFIC_RR` overrides it.
pub fn default_symbol_rr() -> HashMap<String, SymbolConfig> {
    [
        SymbolConfig::new("BTCUSDT", 1.2, 1.0, 1.2, 2.5),
        SymbolConfig::new("ETHUSDT", 1.5, 0.8, 1.5, 3.0),
        SymbolConfig::new("SUIUSDT", 1.8, 0.5, 1.8, 3.5),
        SymbolConfig::new("SOLUSDT", 1.8, 0.5, 1.8, 3.5),
    ]
    .into_iter()
    .map(|s| (s.symbol.clone(), s))
    .collect()
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let env = |key: &str, default: &str| -> String {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };
        let required = |key: &'static str| -> Result<String, ConfigError> {
            match std::env::var(key) {
                Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
                _ => Err(ConfigError::Missing(key)),
            }
        };

        let symbols: Vec<String> = env("SYMBOLS", "BTCUSDT,ETHUSDT,SUIUSDT,SOLUSDT")
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        let mut symbol_rr = default_symbol_rr();
        if let Ok(raw) = std::env::var("SYMBOL_SPECIFIC_RR") {
            let overrides: HashMap<String, SymbolConfig> =
                serde_json::from_str(&raw).map_err(|e| ConfigError::Invalid {
                    key: "SYMBOL_SPECIFIC_RR".to_string(),
                    reason: e.to_string(),
                })?;
            for (symbol, mut rr) in overrides {
                rr.symbol = symbol.to_uppercase();
                symbol_rr.insert(rr.symbol.clone(), rr);
            }
        }

        let interval = parse_timeframe("INTERVAL", &env("INTERVAL", "3m"))?;
        let mtf_interval = parse_timeframe("MTF_INTERVAL", &env("MTF_INTERVAL", "15m"))?;
        let dedup_default = interval.as_seconds().to_string();

        let cfg = Config {
            telegram_bot_token: required("TELEGRAM_BOT_TOKEN")?,
            telegram_chat_id: required("TELEGRAM_CHAT_ID")?,
            enable_persistence: parse_bool(&env("ENABLE_MONGODB", "true")),
            store_uri: env("MONGO_CONNECTION_STRING", "data"),
            store_database: env("MONGO_DATABASE", "crypto_trading"),
            store_collections: StoreCollections {
                signals: env("MONGO_COLLECTION_SIGNALS", "trading_signals"),
                results: env("MONGO_COLLECTION_RESULTS", "signal_results"),
                market_data: env("MONGO_COLLECTION_MARKET_DATA", "market_analysis"),
            },
            symbols,
            symbol_rr,
            market_data_url: env("BINANCE_BASE_URL", "https://api.binance.com"),
            interval,
            mtf_interval,
            candle_limit: parse_num("LIMIT", &env("LIMIT", "120"))?,
            loop_sleep: secs(parse_num("LOOP_SLEEP_SECONDS", &env("LOOP_SLEEP_SECONDS", "15"))?),
            mtf_confirm: parse_bool(&env("MTF_CONFIRM", "true")),
            send_images: parse_bool(&env("SEND_IMAGES", "true")),
            volume_threshold: parse_num("VOLUME_THRESHOLD", &env("VOLUME_THRESHOLD", "1.2"))?,
            volatility_threshold: parse_num(
                "VOLATILITY_THRESHOLD",
                &env("VOLATILITY_THRESHOLD", "2.0"),
            )?,
            atr_period: parse_num("ATR_PERIOD", &env("ATR_PERIOD", "14"))?,
            trend_fast_period: parse_num("TREND_FAST_PERIOD", &env("TREND_FAST_PERIOD", "9"))?,
            trend_slow_period: parse_num("TREND_SLOW_PERIOD", &env("TREND_SLOW_PERIOD", "21"))?,
            trend_epsilon: parse_num("TREND_EPSILON", &env("TREND_EPSILON", "0.0005"))?,
            api_timeout: secs(parse_num("API_TIMEOUT", &env("API_TIMEOUT", "20"))?),
            telegram_timeout: secs(parse_num("TELEGRAM_TIMEOUT", &env("TELEGRAM_TIMEOUT", "10"))?),
            retry_delay: secs(parse_num("RETRY_DELAY", &env("RETRY_DELAY", "10"))?),
            fetch_max_attempts: parse_num("FETCH_MAX_ATTEMPTS", &env("FETCH_MAX_ATTEMPTS", "2"))?,
            symbol_delay: secs(parse_num("SYMBOL_DELAY", &env("SYMBOL_DELAY", "1"))?),
            dedup_cooldown: secs(parse_num(
                "DEDUP_COOLDOWN_SECONDS",
                &env("DEDUP_COOLDOWN_SECONDS", &dedup_default),
            )?),
            signal_expiry: hours("SIGNAL_EXPIRY_HOURS", &env("SIGNAL_EXPIRY_HOURS", "24"))?,
            performance_report_interval: hours(
                "PERFORMANCE_REPORT_INTERVAL",
                &env("PERFORMANCE_REPORT_INTERVAL", "6"),
            )?,
            performance_report_days: parse_num(
                "PERFORMANCE_REPORT_DAYS",
                &env("PERFORMANCE_REPORT_DAYS", "7"),
            )?,
            log_level: env("LOG_LEVEL", "info"),
        };

        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks the invariants every component relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(invalid("SYMBOLS", "at least one symbol is required"));
        }
        for symbol in &self.symbols {
            match self.symbol_rr.get(symbol) {
                Some(rr) => rr.validate()?,
                None => {
                    return Err(invalid(
                        "SYMBOL_SPECIFIC_RR",
                        &format!("no risk settings for {symbol}"),
                    ))
                }
            }
        }
        if self.atr_period == 0 {
            return Err(invalid("ATR_PERIOD", "must be at least 1"));
        }
        if self.trend_fast_period == 0 || self.trend_fast_period >= self.trend_slow_period {
            return Err(invalid(
                "TREND_FAST_PERIOD",
                "must be positive and shorter than TREND_SLOW_PERIOD",
            ));
        }
        if self.candle_limit <= self.atr_period {
            return Err(invalid("LIMIT", "must exceed ATR_PERIOD"));
        }
        if self.fetch_max_attempts == 0 {
            return Err(invalid("FETCH_MAX_ATTEMPTS", "must be at least 1"));
        }
        if self.performance_report_days <= 0 || self.performance_report_days > MAX_HORIZON_DAYS {
            return Err(invalid(
                "PERFORMANCE_REPORT_DAYS",
                &format!("must be between 1 and {MAX_HORIZON_DAYS}"),
            ));
        }
        for (key, value) in [
            ("SIGNAL_EXPIRY_HOURS", self.signal_expiry),
            ("PERFORMANCE_REPORT_INTERVAL", self.performance_report_interval),
        ] {
            if value > MAX_HORIZON {
                return Err(invalid(key, &format!("must not exceed {MAX_HORIZON_DAYS} days")));
            }
        }
        for (key, value) in [
            ("VOLUME_THRESHOLD", self.volume_threshold),
            ("VOLATILITY_THRESHOLD", self.volatility_threshold),
            ("TREND_EPSILON", self.trend_epsilon),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(key, "must be a positive number"));
            }
        }
        Ok(())
    }

    pub fn symbol_config(&self, symbol: &str) -> Option<&SymbolConfig> {
        self.symbol_rr.get(symbol)
    }

    pub fn shared(self) -> SharedConfig {
        Arc::new(self)
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

/// Fractional hours; must be positive and within [`MAX_HORIZON_DAYS`].
fn hours(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    let h: f64 = parse_num(key, raw)?;
    if !(h.is_finite() && h > 0.0) {
        return Err(invalid(key, "must be a positive number of hours"));
    }
    match Duration::try_from_secs_f64(h * 3600.0) {
        Ok(d) if d <= MAX_HORIZON => Ok(d),
        _ => Err(invalid(key, &format!("must not exceed {MAX_HORIZON_DAYS} days"))),
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

fn parse_num<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key: key.to_string(),
        reason: format!("{raw:?}: {e}"),
    })
}

fn parse_timeframe(key: &str, raw: &str) -> Result<Timeframe, ConfigError> {
    Timeframe::from_str_loose(raw).ok_or_else(|| invalid(key, &format!("unknown interval {raw:?}")))
}
