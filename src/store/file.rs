//! File-backed store.
//!
//! IP records live in a JSON snapshot rewritten atomically (temp file +
//! rename) on each change. The tracking and view logs are append-only JSON
//! lines next to it and are replayed on open. A write that fails leaves the
//! in-memory tables untouched. Suited to single-node deployments.

use crate::fingerprint::Fingerprint;
use crate::protocol::models::{ArticleViewRecord, IpRecord, TrackingRecord};
use crate::store::memory::{MemoryStore, StoreSnapshot};
use crate::store::{IpStore, ViewStore};
use crate::ViewgateError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Snapshot filename used under a namespace directory.
const SNAPSHOT_FILE: &str = "viewgate.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct IpSnapshot {
    #[serde(default)]
    ip_records: BTreeMap<String, IpRecord>,
}

/// Persistent store backed by an IP snapshot and two JSON-lines logs.
pub struct FileStore {
    path: PathBuf,
    tracking_log: PathBuf,
    views_log: PathBuf,
    inner: MemoryStore,
    ip_lock: Mutex<()>,
    log_lock: Mutex<()>,
}

impl FileStore {
    /// Open (or create) a store at the given snapshot path.
    ///
    /// The logs sit beside it as `<stem>.tracking.jsonl` and
    /// `<stem>.views.jsonl`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, ViewgateError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ViewgateError::StoreIO(format!("Failed to create dir: {}", e)))?;
        }

        let ip_records = match fs::read_to_string(&path).await {
            Ok(json) => {
                serde_json::from_str::<IpSnapshot>(&json)
                    .map_err(|e| {
                        ViewgateError::ProtocolError(format!(
                            "Failed to parse store snapshot: {}",
                            e
                        ))
                    })?
                    .ip_records
            }
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(ViewgateError::StoreIO(format!(
                    "Failed to read store snapshot: {}",
                    e
                )))
            }
        };

        let tracking_log = path.with_extension("tracking.jsonl");
        let views_log = path.with_extension("views.jsonl");
        let snapshot = StoreSnapshot {
            ip_records,
            tracking: replay(&tracking_log).await?,
            views: replay(&views_log).await?,
        };

        info!(
            path = %path.display(),
            ips = snapshot.ip_records.len(),
            tracking_rows = snapshot.tracking.len(),
            views = snapshot.views.len(),
            "store opened"
        );

        Ok(Self {
            path,
            tracking_log,
            views_log,
            inner: MemoryStore::from_snapshot(snapshot),
            ip_lock: Mutex::new(()),
            log_lock: Mutex::new(()),
        })
    }

    /// Open the store under `dirs::data_dir()/<namespace>/`.
    pub async fn with_namespace(namespace: &str) -> Result<Self, ViewgateError> {
        if namespace.is_empty() {
            return Err(ViewgateError::ConfigError(
                "store namespace cannot be empty".to_string(),
            ));
        }
        let base_dir = dirs::data_dir()
            .ok_or_else(|| ViewgateError::StoreIO("Could not find data directory".to_string()))?;
        Self::open(base_dir.join(namespace).join(SNAPSHOT_FILE)).await
    }

    /// Snapshot file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to a copy of the IP records, persist the copy, then
    /// swap it in. `change` returns false when nothing changed; no write
    /// happens then.
    async fn commit_ips<F>(&self, change: F) -> Result<bool, ViewgateError>
    where
        F: FnOnce(&mut BTreeMap<String, IpRecord>) -> bool + Send,
    {
        let _guard = self.ip_lock.lock().await;
        let mut ip_records = self.inner.ip_records().await;
        if !change(&mut ip_records) {
            return Ok(false);
        }
        let snapshot = IpSnapshot { ip_records };
        self.write_snapshot(&snapshot).await?;
        self.inner.replace_ip_records(snapshot.ip_records).await;
        Ok(true)
    }

    async fn write_snapshot(&self, snapshot: &IpSnapshot) -> Result<(), ViewgateError> {
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| ViewgateError::StoreIO(format!("Failed to serialize store: {}", e)))?;

        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, json)
            .await
            .map_err(|e| ViewgateError::StoreIO(format!("Failed to write temp file: {}", e)))?;
        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| ViewgateError::StoreIO(format!("Failed to rename snapshot: {}", e)))?;
        Ok(())
    }

    async fn append_line<T: Serialize>(&self, log: &Path, record: &T) -> Result<(), ViewgateError> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| ViewgateError::StoreIO(format!("Failed to serialize record: {}", e)))?;
        line.push('\n');

        let _guard = self.log_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log)
            .await
            .map_err(|e| ViewgateError::StoreIO(format!("Failed to open log: {}", e)))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| ViewgateError::StoreIO(format!("Failed to append to log: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| ViewgateError::StoreIO(format!("Failed to flush log: {}", e)))?;
        Ok(())
    }
}

/// Read a JSON-lines log. A missing file is empty; unreadable lines (such
/// as a torn final write) are skipped.
async fn replay<T: DeserializeOwned>(log: &Path) -> Result<Vec<T>, ViewgateError> {
    let text = match fs::read_to_string(log).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(ViewgateError::StoreIO(format!(
                "Failed to read {}: {}",
                log.display(),
                e
            )))
        }
    };

    let mut records = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(log = %log.display(), line = index + 1, error = %e, "skipping unreadable log line")
            }
        }
    }
    Ok(records)
}

#[async_trait]
impl IpStore for FileStore {
    async fn find_ip(&self, ip: &str) -> Result<Option<IpRecord>, ViewgateError> {
        self.inner.find_ip(ip).await
    }

    async fn upsert_block(
        &self,
        ip: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<(), ViewgateError> {
        self.commit_ips(|records| {
            records
                .entry(ip.to_string())
                .or_insert_with(|| IpRecord::new(ip, at))
                .block(reason, at);
            true
        })
        .await?;
        Ok(())
    }

    async fn clear_block(&self, ip: &str, at: DateTime<Utc>) -> Result<bool, ViewgateError> {
        self.commit_ips(|records| records.get_mut(ip).map_or(false, |record| record.unblock(at)))
            .await
    }

    async fn touch_ip(
        &self,
        ip: &str,
        fingerprint_count: u64,
        at: DateTime<Utc>,
    ) -> Result<(), ViewgateError> {
        self.commit_ips(|records| {
            records
                .entry(ip.to_string())
                .or_insert_with(|| IpRecord::new(ip, at))
                .touch(fingerprint_count, at);
            true
        })
        .await?;
        Ok(())
    }

    async fn append_tracking(&self, record: TrackingRecord) -> Result<(), ViewgateError> {
        self.append_line(&self.tracking_log, &record).await?;
        self.inner.append_tracking(record).await
    }

    async fn distinct_fingerprints_since(
        &self,
        ip: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, ViewgateError> {
        self.inner.distinct_fingerprints_since(ip, since).await
    }

    async fn requests_since(&self, ip: &str, since: DateTime<Utc>) -> Result<u64, ViewgateError> {
        self.inner.requests_since(ip, since).await
    }
}

#[async_trait]
impl ViewStore for FileStore {
    async fn append_view(&self, record: ArticleViewRecord) -> Result<(), ViewgateError> {
        self.append_line(&self.views_log, &record).await?;
        self.inner.append_view(record).await
    }

    async fn distinct_articles_since(
        &self,
        fingerprint: &Fingerprint,
        since: DateTime<Utc>,
    ) -> Result<u64, ViewgateError> {
        self.inner.distinct_articles_since(fingerprint, since).await
    }
}
