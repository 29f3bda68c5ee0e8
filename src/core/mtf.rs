use tracing::{debug, warn};

use crate::config::Config;
use crate::core::indicators::IndicatorEngine;
use crate::error::FetchError;
use crate::models::{CandleSeries, Signal, Timeframe, Trend};

#[derive(Debug, Clone, PartialEq)]
pub enum MtfDecision {
    /// Candidate survives; `mtf_confirmed` tells whether the higher timeframe agreed.
    Pass(Signal),
    Veto { secondary: Trend },
}

/// Re-checks trend on a higher timeframe. Fails open: a missing or short
/// secondary series never drops a primary signal.
#[derive(Debug, Clone)]
pub struct MtfConfirmer {
    engine: IndicatorEngine,
    timeframe: Timeframe,
}

impl MtfConfirmer {
    pub fn new(cfg: &Config) -> Self {
        Self::with_engine(IndicatorEngine::new(cfg), cfg.mtf_interval)
    }

    pub fn with_engine(engine: IndicatorEngine, timeframe: Timeframe) -> Self {
        Self { engine, timeframe }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn confirm(&self, mut candidate: Signal, secondary: Result<&CandleSeries, &FetchError>) -> MtfDecision {
        let series = match secondary {
            Ok(series) => series,
            Err(e) => {
                warn!(
                    "{}: {} confirmation unavailable ({}), passing unconfirmed",
                    candidate.symbol, self.timeframe, e
                );
                candidate.mtf_confirmed = false;
                return MtfDecision::Pass(candidate);
            }
        };

        let trend = match self.engine.trend(series) {
            Ok(t) => t,
            Err(e) => {
                warn!(
                    "{}: {} confirmation skipped ({}), passing unconfirmed",
                    candidate.symbol, self.timeframe, e
                );
                candidate.mtf_confirmed = false;
                return MtfDecision::Pass(candidate);
            }
        };

        if trend.opposes(candidate.direction) {
            debug!(
                "{}: {} vetoed by {} trend {}",
                candidate.symbol, candidate.direction, self.timeframe, trend
            );
            return MtfDecision::Veto { secondary: trend };
        }

        candidate.mtf_confirmed = trend != Trend::Flat;
        MtfDecision::Pass(candidate)
    }
}
