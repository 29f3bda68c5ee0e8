pub mod file;
pub mod history;
pub mod memory;

pub use file::FileStore;
pub use history::History;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::{IndicatorSnapshot, OutcomeUpdate, SignalRecord};

/// Signal history backend. Append/update only: records are upserted by id
/// and resolved through outcome updates, never deleted.
#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn upsert_signal(&self, record: &SignalRecord) -> Result<(), StoreError>;

    async fn upsert_outcome(&self, outcome: &OutcomeUpdate) -> Result<(), StoreError>;

    async fn record_snapshot(&self, snapshot: &IndicatorSnapshot) -> Result<(), StoreError>;

    /// Records generated within `[from, to]`, oldest first.
    async fn query(
        &self,
        symbol: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SignalRecord>, StoreError>;
}
