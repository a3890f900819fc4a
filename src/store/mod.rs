//! Tracking store seams.
//!
//! The evaluator owns the IP tables, the meter owns the view log. Both are
//! multi-writer: inserts never conflict and keyed upserts are
//! last-write-wins. No operation here takes a cross-record lock, so two
//! concurrent requests may both observe a count below threshold.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::fingerprint::Fingerprint;
use crate::protocol::models::{ArticleViewRecord, IpRecord, TrackingRecord};
use crate::ViewgateError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Per-IP security records and the fingerprint/IP tracking log.
#[async_trait]
pub trait IpStore: Send + Sync {
    /// Look up the record for an IP. `Ok(None)` when the IP is unknown.
    async fn find_ip(&self, ip: &str) -> Result<Option<IpRecord>, ViewgateError>;

    /// Mark an IP blocked, creating the record if absent.
    async fn upsert_block(
        &self,
        ip: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<(), ViewgateError>;

    /// Clear a block. Returns whether the IP was blocked.
    async fn clear_block(&self, ip: &str, at: DateTime<Utc>) -> Result<bool, ViewgateError>;

    /// Refresh `last_seen` and the cached fingerprint count, creating the
    /// record if absent.
    async fn touch_ip(
        &self,
        ip: &str,
        fingerprint_count: u64,
        at: DateTime<Utc>,
    ) -> Result<(), ViewgateError>;

    /// Append one row to the tracking log.
    async fn append_tracking(&self, record: TrackingRecord) -> Result<(), ViewgateError>;

    /// Distinct fingerprints tracked from `ip` at or after `since`.
    async fn distinct_fingerprints_since(
        &self,
        ip: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, ViewgateError>;

    /// Tracking rows for `ip` at or after `since`.
    async fn requests_since(&self, ip: &str, since: DateTime<Utc>) -> Result<u64, ViewgateError>;
}

/// Article view log.
#[async_trait]
pub trait ViewStore: Send + Sync {
    /// Append one view event.
    async fn append_view(&self, record: ArticleViewRecord) -> Result<(), ViewgateError>;

    /// Distinct article ids viewed by `fingerprint` at or after `since`.
    async fn distinct_articles_since(
        &self,
        fingerprint: &Fingerprint,
        since: DateTime<Utc>,
    ) -> Result<u64, ViewgateError>;
}
