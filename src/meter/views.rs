//! Article view metering over a rolling window.
//!
//! The count is the number of distinct article ids a fingerprint viewed in
//! the trailing `window_days`. Re-reading an article does not consume
//! another free view.

use crate::clock::{window_start, Clock, SystemClock};
use crate::config::MeterPolicy;
use crate::fingerprint::Fingerprint;
use crate::protocol::models::ArticleViewRecord;
use crate::store::ViewStore;
use crate::ViewgateError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Longest article id accepted.
pub const MAX_ARTICLE_ID_LEN: usize = 256;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Server-side view meter.
pub struct ViewMeter {
    store: Arc<dyn ViewStore>,
    policy: MeterPolicy,
    clock: Arc<dyn Clock>,
}

impl ViewMeter {
    /// Create a meter over the given store, using the system clock.
    pub fn new(store: Arc<dyn ViewStore>, policy: MeterPolicy) -> Result<Self, ViewgateError> {
        Self::with_clock(store, policy, Arc::new(SystemClock))
    }

    /// Create a meter with a custom clock.
    pub fn with_clock(
        store: Arc<dyn ViewStore>,
        policy: MeterPolicy,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ViewgateError> {
        policy.validate()?;
        Ok(Self {
            store,
            policy,
            clock,
        })
    }

    /// Active allowance.
    pub fn policy(&self) -> &MeterPolicy {
        &self.policy
    }

    /// Distinct articles viewed by `fingerprint` in the trailing window.
    ///
    /// `window_days` defaults to the policy window. A store failure counts
    /// as zero views.
    pub async fn get_article_view_count(
        &self,
        fingerprint: &Fingerprint,
        window_days: Option<u32>,
    ) -> u64 {
        match self.count_article_views(fingerprint, window_days).await {
            Ok(count) => count,
            Err(e) => {
                warn!(fingerprint = %fingerprint, error = %e, "view count unavailable, assuming none");
                0
            }
        }
    }

    /// Like [`Self::get_article_view_count`], but reports store failures.
    pub async fn count_article_views(
        &self,
        fingerprint: &Fingerprint,
        window_days: Option<u32>,
    ) -> Result<u64, ViewgateError> {
        let days = window_days.unwrap_or(self.policy.window_days);
        let since = window_start(
            self.clock.now_utc(),
            Duration::from_secs(u64::from(days) * SECS_PER_DAY),
        );

        let count = self.store.distinct_articles_since(fingerprint, since).await?;
        debug!(fingerprint = %fingerprint, count, days, "article views counted");
        Ok(count)
    }

    /// Record a view, stamped with whether the viewer was already over the
    /// allowance.
    pub async fn track_article_view(
        &self,
        article_id: &str,
        fingerprint: &Fingerprint,
        over_limit: bool,
    ) -> Result<(), ViewgateError> {
        let article_id = validate_article_id(article_id)?;
        self.store
            .append_view(ArticleViewRecord {
                fingerprint: fingerprint.clone(),
                article_id: article_id.to_string(),
                created_at: self.clock.now_utc(),
                over_limit,
            })
            .await
    }

    /// Whether `count` views exhaust the allowance.
    pub fn has_reached_limit(&self, count: u64) -> bool {
        count >= self.policy.max_free_articles
    }
}

/// Trim and bound an article id.
pub fn validate_article_id(article_id: &str) -> Result<&str, ViewgateError> {
    let article_id = article_id.trim();
    if article_id.is_empty() {
        return Err(ViewgateError::InvalidRequest(
            "article_id cannot be empty".to_string(),
        ));
    }
    if article_id.len() > MAX_ARTICLE_ID_LEN {
        return Err(ViewgateError::InvalidRequest(format!(
            "article_id longer than {} characters",
            MAX_ARTICLE_ID_LEN
        )));
    }
    Ok(article_id)
}
