use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crypto_signal_detector::bot::SignalBot;
use crypto_signal_detector::config::Config;
use crypto_signal_detector::exchange::BinanceClient;
use crypto_signal_detector::notify::TelegramNotifier;
use crypto_signal_detector::storage::{FileStore, History, SignalStore};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env().context("loading configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    let market = Box::new(BinanceClient::new(&cfg)?);
    let notifier = Box::new(TelegramNotifier::new(&cfg)?);

    let backend: Option<Arc<dyn SignalStore>> = if cfg.enable_persistence {
        match FileStore::from_config(&cfg).await {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                warn!("Persistence disabled for this run: {}", e);
                None
            }
        }
    } else {
        None
    };

    let mut bot = SignalBot::new(cfg.shared(), market, notifier, History::new(backend));
    bot.seed_history(Utc::now()).await;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Stop signal received");
                trigger.cancel();
            }
            Err(e) => warn!("Cannot listen for Ctrl+C: {}", e),
        }
    });

    bot.run(shutdown).await;
    Ok(())
}
