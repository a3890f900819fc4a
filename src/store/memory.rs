//! In-memory tracking store.

use crate::fingerprint::Fingerprint;
use crate::protocol::models::{ArticleViewRecord, IpRecord, TrackingRecord};
use crate::store::{IpStore, ViewStore};
use crate::ViewgateError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

/// All tables. [`crate::store::FileStore`] persists the IP records as a
/// snapshot and the two logs as JSON lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// IP records keyed by address.
    #[serde(default)]
    pub ip_records: BTreeMap<String, IpRecord>,

    /// Fingerprint/IP tracking log, in insertion order.
    #[serde(default)]
    pub tracking: Vec<TrackingRecord>,

    /// Article view log, in insertion order.
    #[serde(default)]
    pub views: Vec<ArticleViewRecord>,
}

/// Store keeping every table behind one async `RwLock`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<StoreSnapshot>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated from a snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            tables: RwLock::new(snapshot),
        }
    }

    /// Copy of the current tables.
    pub async fn snapshot(&self) -> StoreSnapshot {
        self.tables.read().await.clone()
    }

    /// Copy of the IP records only.
    pub(crate) async fn ip_records(&self) -> BTreeMap<String, IpRecord> {
        self.tables.read().await.ip_records.clone()
    }

    /// Swap in a new set of IP records.
    pub(crate) async fn replace_ip_records(&self, ip_records: BTreeMap<String, IpRecord>) {
        self.tables.write().await.ip_records = ip_records;
    }
}

#[async_trait]
impl IpStore for MemoryStore {
    async fn find_ip(&self, ip: &str) -> Result<Option<IpRecord>, ViewgateError> {
        Ok(self.tables.read().await.ip_records.get(ip).cloned())
    }

    async fn upsert_block(
        &self,
        ip: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<(), ViewgateError> {
        self.tables
            .write()
            .await
            .ip_records
            .entry(ip.to_string())
            .or_insert_with(|| IpRecord::new(ip, at))
            .block(reason, at);
        Ok(())
    }

    async fn clear_block(&self, ip: &str, at: DateTime<Utc>) -> Result<bool, ViewgateError> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .ip_records
            .get_mut(ip)
            .map_or(false, |record| record.unblock(at)))
    }

    async fn touch_ip(
        &self,
        ip: &str,
        fingerprint_count: u64,
        at: DateTime<Utc>,
    ) -> Result<(), ViewgateError> {
        self.tables
            .write()
            .await
            .ip_records
            .entry(ip.to_string())
            .or_insert_with(|| IpRecord::new(ip, at))
            .touch(fingerprint_count, at);
        Ok(())
    }

    async fn append_tracking(&self, record: TrackingRecord) -> Result<(), ViewgateError> {
        debug!(ip = %record.ip_address, fingerprint = %record.fingerprint_id, "tracking row appended");
        self.tables.write().await.tracking.push(record);
        Ok(())
    }

    async fn distinct_fingerprints_since(
        &self,
        ip: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, ViewgateError> {
        let tables = self.tables.read().await;
        let distinct: HashSet<&Fingerprint> = tables
            .tracking
            .iter()
            .filter(|row| row.ip_address == ip && row.created_at >= since)
            .map(|row| &row.fingerprint_id)
            .collect();
        Ok(distinct.len() as u64)
    }

    async fn requests_since(&self, ip: &str, since: DateTime<Utc>) -> Result<u64, ViewgateError> {
        let tables = self.tables.read().await;
        let count = tables
            .tracking
            .iter()
            .filter(|row| row.ip_address == ip && row.created_at >= since)
            .count();
        Ok(count as u64)
    }
}

#[async_trait]
impl ViewStore for MemoryStore {
    async fn append_view(&self, record: ArticleViewRecord) -> Result<(), ViewgateError> {
        self.tables.write().await.views.push(record);
        Ok(())
    }

    async fn distinct_articles_since(
        &self,
        fingerprint: &Fingerprint,
        since: DateTime<Utc>,
    ) -> Result<u64, ViewgateError> {
        let tables = self.tables.read().await;
        let distinct: HashSet<&str> = tables
            .views
            .iter()
            .filter(|view| &view.fingerprint == fingerprint && view.created_at >= since)
            .map(|view| view.article_id.as_str())
            .collect();
        Ok(distinct.len() as u64)
    }
}
