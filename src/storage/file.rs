use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use crate::config::{Config, StoreCollections};
use crate::error::StoreError;
use crate::models::{IndicatorSnapshot, OutcomeUpdate, SignalRecord};
use crate::storage::SignalStore;

/// Document store over JSON-lines files, one file per collection under
/// `<root>/<database>/`. Documents are only ever appended; on read, the last
/// signal document per id wins and result documents are applied on top.
pub struct FileStore {
    signals: PathBuf,
    results: PathBuf,
    market_data: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub async fn open(
        uri: &str,
        database: &str,
        collections: &StoreCollections,
    ) -> Result<Self, StoreError> {
        let root = uri.strip_prefix("file://").unwrap_or(uri);
        if root.trim().is_empty() {
            return Err(StoreError::PersistenceUnavailable("empty store location".into()));
        }
        let dir = Path::new(root).join(database);
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            signals: dir.join(format!("{}.jsonl", collections.signals)),
            results: dir.join(format!("{}.jsonl", collections.results)),
            market_data: dir.join(format!("{}.jsonl", collections.market_data)),
            write_lock: Mutex::new(()),
        })
    }

    pub async fn from_config(cfg: &Config) -> Result<Self, StoreError> {
        Self::open(&cfg.store_uri, &cfg.store_database, &cfg.store_collections).await
    }

    async fn append<T: Serialize>(&self, path: &Path, doc: &T) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(doc)?;
        line.push('\n');
        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn read_lines(path: &Path) -> Result<Vec<String>, StoreError> {
        match fs::read_to_string(path).await {
            Ok(content) => Ok(content
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_records(&self) -> Result<HashMap<String, SignalRecord>, StoreError> {
        let mut records = HashMap::new();
        for line in Self::read_lines(&self.signals).await? {
            match serde_json::from_str::<SignalRecord>(&line) {
                Ok(r) => {
                    records.insert(r.id.clone(), r);
                }
                Err(e) => warn!("Skipping unreadable signal document: {}", e),
            }
        }
        for line in Self::read_lines(&self.results).await? {
            match serde_json::from_str::<OutcomeUpdate>(&line) {
                Ok(o) => {
                    if let Some(r) = records.get_mut(&o.record_id) {
                        r.apply(&o);
                    }
                }
                Err(e) => warn!("Skipping unreadable result document: {}", e),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl SignalStore for FileStore {
    async fn upsert_signal(&self, record: &SignalRecord) -> Result<(), StoreError> {
        self.append(&self.signals, record).await
    }

    async fn upsert_outcome(&self, outcome: &OutcomeUpdate) -> Result<(), StoreError> {
        self.append(&self.results, outcome).await
    }

    async fn record_snapshot(&self, snapshot: &IndicatorSnapshot) -> Result<(), StoreError> {
        self.append(&self.market_data, snapshot).await
    }

    async fn query(
        &self,
        symbol: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SignalRecord>, StoreError> {
        let mut out: Vec<SignalRecord> = self
            .load_records()
            .await?
            .into_values()
            .filter(|r| symbol.map_or(true, |s| r.signal.symbol == s))
            .filter(|r| r.signal.generated_at >= from && r.signal.generated_at <= to)
            .collect();
        out.sort_by_key(|r| r.signal.generated_at);
        Ok(out)
    }
}
