use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::models::{IndicatorSnapshot, OutcomeUpdate, Signal, SignalRecord};
use crate::storage::{MemoryStore, SignalStore};

pub const PENDING_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
enum PendingWrite {
    Signal(SignalRecord),
    Outcome(OutcomeUpdate),
}

/// Signal history as the bot sees it. The in-memory store is authoritative
/// for the running process; the optional backend receives every write in
/// order. Writes the backend rejects stay queued and are retried on the next
/// flush. When the queue is full the oldest write is dropped.
pub struct History {
    local: MemoryStore,
    backend: Option<Arc<dyn SignalStore>>,
    pending: VecDeque<PendingWrite>,
    capacity: usize,
}

impl History {
    pub fn new(backend: Option<Arc<dyn SignalStore>>) -> Self {
        Self::with_capacity(backend, PENDING_CAPACITY)
    }

    pub fn with_capacity(backend: Option<Arc<dyn SignalStore>>, capacity: usize) -> Self {
        Self {
            local: MemoryStore::new(),
            backend,
            pending: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Loads previously persisted records into memory. Returns what was
    /// loaded so the caller can rebuild dedup state.
    pub async fn seed(
        &mut self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SignalRecord>, StoreError> {
        let Some(backend) = &self.backend else {
            return Ok(Vec::new());
        };
        let records = backend.query(None, from, to).await?;
        for r in &records {
            self.local.upsert_signal(r).await?;
        }
        Ok(records)
    }

    /// Stores an emitted signal. A still-active record with the same
    /// fingerprint keeps its id and generation time, so the backend document
    /// is updated in place and the expiry clock is not restarted.
    pub async fn record_signal(&mut self, signal: Signal) -> Result<SignalRecord, StoreError> {
        let mut record = SignalRecord::active(signal);
        if let Some(existing) = self.local.active_by_fingerprint(record.fingerprint()).await {
            record.id = existing.id;
            record.signal.generated_at = existing.signal.generated_at;
        }
        self.local.upsert_signal(&record).await?;
        self.enqueue(PendingWrite::Signal(record.clone()));
        self.flush_pending().await?;
        Ok(record)
    }

    pub async fn record_outcome(&mut self, outcome: &OutcomeUpdate) -> Result<(), StoreError> {
        self.local.upsert_outcome(outcome).await?;
        self.enqueue(PendingWrite::Outcome(outcome.clone()));
        self.flush_pending().await
    }

    /// Market-analysis telemetry. Not queued: a lost snapshot is superseded by
    /// the next cycle's.
    pub async fn record_snapshot(&self, snapshot: &IndicatorSnapshot) -> Result<(), StoreError> {
        self.local.record_snapshot(snapshot).await?;
        match &self.backend {
            Some(backend) => backend.record_snapshot(snapshot).await,
            None => Ok(()),
        }
    }

    /// Replays queued writes in order, stopping at the first failure.
    pub async fn flush_pending(&mut self) -> Result<(), StoreError> {
        let Some(backend) = self.backend.clone() else {
            self.pending.clear();
            return Ok(());
        };
        while let Some(write) = self.pending.front() {
            let res = match write {
                PendingWrite::Signal(r) => backend.upsert_signal(r).await,
                PendingWrite::Outcome(o) => backend.upsert_outcome(o).await,
            };
            res?;
            self.pending.pop_front();
        }
        debug!("Persistence queue drained");
        Ok(())
    }

    pub async fn active_for(&self, symbol: &str) -> Vec<SignalRecord> {
        self.local.active_for(symbol).await
    }

    pub async fn active_count(&self) -> usize {
        self.local.active_count().await
    }

    pub async fn records_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SignalRecord>, StoreError> {
        self.local.query(None, from, to).await
    }

    pub async fn prune_resolved_before(&self, cutoff: DateTime<Utc>) -> usize {
        self.local.prune_resolved_before(cutoff).await
    }

    fn enqueue(&mut self, write: PendingWrite) {
        if self.backend.is_none() {
            return;
        }
        if self.pending.len() >= self.capacity {
            if let Some(dropped) = self.pending.pop_front() {
                warn!("Persistence queue full, dropping oldest write: {:?}", dropped);
            }
        }
        self.pending.push_back(write);
    }
}
