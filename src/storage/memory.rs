use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::models::{IndicatorSnapshot, OutcomeUpdate, SignalRecord};
use crate::storage::SignalStore;

const SNAPSHOT_CAPACITY: usize = 512;

#[derive(Default)]
struct Inner {
    records: HashMap<String, SignalRecord>,
    snapshots: VecDeque<IndicatorSnapshot>,
}

/// Process-lifetime store. Every mutation goes through one lock, so writes
/// for a given record are serialized.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    pub async fn get(&self, id: &str) -> Option<SignalRecord> {
        self.inner.lock().await.records.get(id).cloned()
    }

    /// The unresolved record carrying `fingerprint`, if any.
    pub async fn active_by_fingerprint(&self, fingerprint: &str) -> Option<SignalRecord> {
        self.inner
            .lock()
            .await
            .records
            .values()
            .find(|r| !r.status.is_resolved() && r.fingerprint() == fingerprint)
            .cloned()
    }

    pub async fn active_for(&self, symbol: &str) -> Vec<SignalRecord> {
        let inner = self.inner.lock().await;
        let mut out: Vec<SignalRecord> = inner
            .records
            .values()
            .filter(|r| !r.status.is_resolved() && r.signal.symbol == symbol)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.signal.generated_at);
        out
    }

    pub async fn active_count(&self) -> usize {
        self.inner
            .lock()
            .await
            .records
            .values()
            .filter(|r| !r.status.is_resolved())
            .count()
    }

    /// Drops resolved records generated before `cutoff`; the backend keeps
    /// the full history, this only bounds process memory.
    pub async fn prune_resolved_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut inner = self.inner.lock().await;
        let before = inner.records.len();
        inner
            .records
            .retain(|_, r| !(r.status.is_resolved() && r.signal.generated_at < cutoff));
        before - inner.records.len()
    }

    pub async fn snapshots(&self) -> Vec<IndicatorSnapshot> {
        self.inner.lock().await.snapshots.iter().cloned().collect()
    }
}

#[async_trait]
impl SignalStore for MemoryStore {
    async fn upsert_signal(&self, record: &SignalRecord) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .records
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn upsert_outcome(&self, outcome: &OutcomeUpdate) -> Result<(), StoreError> {
        if let Some(r) = self.inner.lock().await.records.get_mut(&outcome.record_id) {
            r.apply(outcome);
        }
        Ok(())
    }

    async fn record_snapshot(&self, snapshot: &IndicatorSnapshot) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.snapshots.len() == SNAPSHOT_CAPACITY {
            inner.snapshots.pop_front();
        }
        inner.snapshots.push_back(snapshot.clone());
        Ok(())
    }

    async fn query(
        &self,
        symbol: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SignalRecord>, StoreError> {
        let inner = self.inner.lock().await;
        let mut out: Vec<SignalRecord> = inner
            .records
            .values()
            .filter(|r| symbol.map_or(true, |s| r.signal.symbol == s))
            .filter(|r| r.signal.generated_at >= from && r.signal.generated_at <= to)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.signal.generated_at);
        Ok(out)
    }
}
