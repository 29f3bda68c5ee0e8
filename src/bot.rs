use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SharedConfig;
use crate::core::{IndicatorEngine, MtfConfirmer, MtfDecision, RiskFilter};
use crate::error::{FetchError, PipelineError};
use crate::exchange::Exchange;
use crate::models::{CandleSeries, Signal, Timeframe};
use crate::notify::{format_report, format_signal, ChartRenderer, Notifier, OutgoingMessage};
use crate::storage::History;
use crate::trading::{outcome, DedupDecision, PerformanceReport, SignalDeduplicator};

/// What happened to one symbol in one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolOutcome {
    NoSetup,
    Vetoed,
    Suppressed,
    Emitted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub processed: usize,
    pub skipped: usize,
    pub emitted: usize,
}

#[derive(Debug, Clone, Default)]
pub struct BotStats {
    pub cycles: u64,
    pub emitted: u64,
    pub vetoed: u64,
    pub skipped: u64,
    pub resolved: u64,
    pub notify_failures: u64,
    pub reports: u64,
}

pub struct SignalBot {
    config: SharedConfig,
    market: Box<dyn Exchange>,
    notifier: Box<dyn Notifier>,
    renderer: Option<Box<dyn ChartRenderer>>,
    engine: IndicatorEngine,
    risk: RiskFilter,
    mtf: MtfConfirmer,
    dedup: SignalDeduplicator,
    history: History,

    windows: HashMap<(String, Timeframe), CandleSeries>,
    last_report: Option<DateTime<Utc>>,
    stats: BotStats,
}

impl SignalBot {
    pub fn new(
        config: SharedConfig,
        market: Box<dyn Exchange>,
        notifier: Box<dyn Notifier>,
        history: History,
    ) -> Self {
        let cfg = &*config;

        info!("{}", "=".repeat(60));
        info!("Crypto signal detector starting up");
        info!(
            "Interval: {} | MTF: {} | Window: {} candles",
            cfg.interval,
            if cfg.mtf_confirm {
                cfg.mtf_interval.to_string()
            } else {
                "off".to_string()
            },
            cfg.candle_limit
        );
        info!(
            "Persistence: {}",
            if history.has_backend() {
                format!("{}/{}", cfg.store_uri, cfg.store_database)
            } else {
                "in-memory only".to_string()
            }
        );
        info!("Symbols:");
        for symbol in &cfg.symbols {
            if let Some(sc) = cfg.symbol_config(symbol) {
                info!(
                    "  {}: min_rr={} risk={}% sl={}xATR tp={}xATR",
                    symbol, sc.min_rr, sc.risk_percent, sc.atr_sl_mult, sc.atr_tp_mult
                );
            }
        }
        info!("{}", "=".repeat(60));

        Self {
            engine: IndicatorEngine::new(cfg),
            risk: RiskFilter::new(cfg),
            mtf: MtfConfirmer::new(cfg),
            dedup: SignalDeduplicator::new(cfg.dedup_cooldown),
            config,
            market,
            notifier,
            renderer: None,
            history,
            windows: HashMap::new(),
            last_report: None,
            stats: BotStats::default(),
        }
    }

    pub fn with_renderer(mut self, renderer: Box<dyn ChartRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn stats(&self) -> &BotStats {
        &self.stats
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn dedup(&self) -> &SignalDeduplicator {
        &self.dedup
    }

    /// Reloads persisted history covering the report window and the expiry
    /// window, and rebuilds dedup slots from still-active signals.
    pub async fn seed_history(&mut self, now: DateTime<Utc>) {
        if !self.history.has_backend() {
            return;
        }
        let cfg = Arc::clone(&self.config);
        let report_window = report_window(cfg.performance_report_days);
        let expiry = chrono::Duration::from_std(cfg.signal_expiry).unwrap_or(report_window);
        let from = lookback(now, report_window.max(expiry));

        match self.history.seed(from, now).await {
            Ok(records) => {
                self.dedup.seed(&records);
                info!(
                    "Loaded {} stored signals ({} active)",
                    records.len(),
                    self.history.active_count().await
                );
            }
            Err(e) => warn!("Could not load signal history, starting empty: {}", e),
        }
    }

    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!("Bot is now running. Press Ctrl+C to stop.");
        let loop_sleep = self.config.loop_sleep;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.run_cycle_at(Utc::now()) => {}
            }
            self.maybe_report(Utc::now()).await;

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(loop_sleep) => {}
            }
        }

        self.shutdown().await;
    }

    /// One full pass over every configured symbol, evaluated as of `now`.
    pub async fn run_cycle_at(&mut self, now: DateTime<Utc>) -> CycleSummary {
        let cfg = Arc::clone(&self.config);
        self.stats.cycles += 1;

        if self.history.pending_len() > 0 {
            if let Err(e) = self.history.flush_pending().await {
                warn!(
                    "{} persistence writes still queued: {}",
                    self.history.pending_len(),
                    e
                );
            }
        }

        let mut summary = CycleSummary::default();
        for (i, symbol) in cfg.symbols.iter().enumerate() {
            if i > 0 && !cfg.symbol_delay.is_zero() {
                tokio::time::sleep(cfg.symbol_delay).await;
            }
            match self.process_symbol(symbol, now).await {
                Ok(result) => {
                    summary.processed += 1;
                    match result {
                        SymbolOutcome::Emitted => summary.emitted += 1,
                        SymbolOutcome::Vetoed => self.stats.vetoed += 1,
                        SymbolOutcome::Suppressed | SymbolOutcome::NoSetup => {}
                    }
                }
                Err(e) => {
                    summary.skipped += 1;
                    self.stats.skipped += 1;
                    warn!("{}: skipped this cycle: {}", symbol, e);
                }
            }
        }

        debug!(
            "Cycle {} done: {} processed, {} skipped, {} emitted",
            self.stats.cycles, summary.processed, summary.skipped, summary.emitted
        );
        summary
    }

    pub async fn process_symbol(
        &mut self,
        symbol: &str,
        now: DateTime<Utc>,
    ) -> Result<SymbolOutcome, PipelineError> {
        let cfg = Arc::clone(&self.config);
        let sym_cfg = cfg
            .symbol_config(symbol)
            .ok_or_else(|| PipelineError::UnknownSymbol(symbol.to_string()))?;

        let fresh = self.fetch_with_retry(symbol, cfg.interval).await?;
        let window = self
            .windows
            .entry((symbol.to_string(), cfg.interval))
            .or_insert_with(|| CandleSeries::empty(cfg.interval));
        window.merge(&fresh, cfg.candle_limit);
        let window = window.clone();

        self.resolve_outcomes(symbol, &window, now).await;

        let snapshot = self.engine.compute(symbol, &window, now)?;
        debug!(
            "{}: close={:.4} atr={:.4} vol_ratio={:.2} volatility={:.2}% trend={} strength={:.2}",
            symbol,
            snapshot.close,
            snapshot.atr,
            snapshot.volume_ratio,
            snapshot.volatility,
            snapshot.trend,
            snapshot.trend_strength
        );
        if let Err(e) = self.history.record_snapshot(&snapshot).await {
            debug!("{}: market analysis not stored: {}", symbol, e);
        }

        let Some(latest) = window.last() else {
            return Ok(SymbolOutcome::NoSetup);
        };
        let Some(candidate) = self.risk.evaluate(latest, &snapshot, sym_cfg) else {
            return Ok(SymbolOutcome::NoSetup);
        };

        let candidate = if cfg.mtf_confirm {
            let secondary = self.fetch_with_retry(symbol, self.mtf.timeframe()).await;
            match self.mtf.confirm(candidate, secondary.as_ref()) {
                MtfDecision::Pass(signal) => signal,
                MtfDecision::Veto { secondary } => {
                    info!(
                        "{}: setup vetoed, {} trend is {}",
                        symbol,
                        self.mtf.timeframe(),
                        secondary
                    );
                    return Ok(SymbolOutcome::Vetoed);
                }
            }
        } else {
            candidate
        };

        if self.dedup.check_and_record(&candidate, now) == DedupDecision::Suppress {
            debug!("{}: duplicate {} suppressed", symbol, candidate.fingerprint);
            return Ok(SymbolOutcome::Suppressed);
        }

        self.emit(candidate, &window).await;
        Ok(SymbolOutcome::Emitted)
    }

    async fn fetch_with_retry(
        &self,
        symbol: &str,
        tf: Timeframe,
    ) -> Result<CandleSeries, FetchError> {
        let attempts = self.config.fetch_max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self
                .market
                .fetch_ohlcv(symbol, tf, self.config.candle_limit)
                .await
            {
                Ok(series) => return Ok(series),
                Err(e) if attempt < attempts => {
                    warn!(
                        "{} {}: fetch attempt {}/{} failed: {}",
                        symbol, tf, attempt, attempts, e
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn resolve_outcomes(&mut self, symbol: &str, window: &CandleSeries, now: DateTime<Utc>) {
        let expiry = self.config.signal_expiry;
        for record in self.history.active_for(symbol).await {
            let Some(update) = outcome::resolve(&record, window, now, expiry) else {
                continue;
            };
            info!(
                "{}: {} signal {} -> {} (exit {:?})",
                symbol, record.signal.direction, record.fingerprint(), update.status, update.exit_price
            );
            self.dedup.release(symbol, &update.fingerprint);
            self.stats.resolved += 1;
            if let Err(e) = self.history.record_outcome(&update).await {
                warn!("{}: outcome queued for retry: {}", symbol, e);
            }
        }
    }

    async fn emit(&mut self, signal: Signal, window: &CandleSeries) {
        self.log_signal(&signal);
        self.stats.emitted += 1;

        if let Err(e) = self.history.record_signal(signal.clone()).await {
            warn!("{}: signal kept in memory, persistence failed: {}", signal.symbol, e);
        }

        let image = if self.config.send_images {
            self.renderer
                .as_ref()
                .and_then(|r| r.render(&signal, window))
        } else {
            None
        };
        let msg = OutgoingMessage::text(format_signal(&signal)).with_image(image);
        if let Err(e) = self.notifier.send(&msg).await {
            self.stats.notify_failures += 1;
            warn!("{}: notification not delivered: {}", signal.symbol, e);
        }
    }

    fn log_signal(&self, s: &Signal) {
        info!("{}", "=".repeat(60));
        info!("SIGNAL: {} {}", s.symbol, s.direction.as_str().to_uppercase());
        info!("  Entry: {:.4}", s.entry_price);
        info!("  Stop Loss: {:.4}", s.stop_loss);
        info!("  Take Profit: {:.4}", s.take_profit);
        info!("  R:R: {:.2} | Risk: {}%", s.risk_reward, s.risk_percent);
        info!("  Confidence: {:.1}%", s.confidence * 100.0);
        info!(
            "  ATR: {:.4} | Volume ratio: {:.2} | High volatility: {} | MTF confirmed: {}",
            s.atr, s.volume_ratio, s.high_volatility, s.mtf_confirmed
        );
        info!("{}", "=".repeat(60));
    }

    /// Sends a report once `PERFORMANCE_REPORT_INTERVAL` has elapsed since
    /// the previous one. The first call only starts the clock.
    pub async fn maybe_report(&mut self, now: DateTime<Utc>) -> bool {
        let last = *self.last_report.get_or_insert(now);
        let interval = chrono::Duration::from_std(self.config.performance_report_interval)
            .unwrap_or(chrono::Duration::MAX);
        if now - last < interval {
            return false;
        }
        self.last_report = Some(now);
        self.send_report(now).await;
        true
    }

    pub async fn send_report(&mut self, now: DateTime<Utc>) -> Option<PerformanceReport> {
        let start = lookback(now, report_window(self.config.performance_report_days));
        let records = match self.history.records_between(start, now).await {
            Ok(records) => records,
            Err(e) => {
                warn!("Performance report skipped: {}", e);
                return None;
            }
        };
        let report = PerformanceReport::build(&records, start, now);
        self.stats.reports += 1;

        info!("--- Performance Report ---");
        for (symbol, p) in &report.by_symbol {
            info!(
                "  {}: {} signals | TP {} SL {} expired {} open {} | WR {:.1}% | R {:+.2}",
                symbol,
                p.emitted,
                p.hit_target,
                p.hit_stop,
                p.expired,
                p.open,
                p.win_rate * 100.0,
                p.realized_rr
            );
        }

        let msg = OutgoingMessage::text(format_report(&report));
        if let Err(e) = self.notifier.send(&msg).await {
            self.stats.notify_failures += 1;
            warn!("Performance report not delivered: {}", e);
        }

        let pruned = self.history.prune_resolved_before(start).await;
        if pruned > 0 {
            debug!("Dropped {} resolved signals older than the report window", pruned);
        }
        Some(report)
    }

    async fn shutdown(&mut self) {
        info!("Shutting down...");
        if self.history.pending_len() > 0 {
            if let Err(e) = self.history.flush_pending().await {
                warn!(
                    "{} persistence writes lost on shutdown: {}",
                    self.history.pending_len(),
                    e
                );
            }
        }
        info!(
            "Cycles: {} | Emitted: {} | Suppressed: {} | Vetoed: {} | Skipped: {}",
            self.stats.cycles,
            self.stats.emitted,
            self.dedup.suppressed(),
            self.stats.vetoed,
            self.stats.skipped
        );
        info!(
            "Active signals: {} | Resolved: {} | Failed notifications: {}",
            self.history.active_count().await,
            self.stats.resolved,
            self.stats.notify_failures
        );
        info!("Bot stopped.");
    }
}

fn report_window(days: i64) -> chrono::Duration {
    chrono::Duration::try_days(days).unwrap_or(chrono::Duration::MAX)
}

/// `now - window`, clamped to the earliest representable instant.
fn lookback(now: DateTime<Utc>, window: chrono::Duration) -> DateTime<Utc> {
    now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC)
}
