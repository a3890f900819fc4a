//! Per-IP suspicious-activity evaluation.
//!
//! An IP is Unknown, Clear, or Blocked. Blocked is terminal here: only
//! [`IpSecurityEvaluator::unblock_ip`], an administrative action, leaves it.
//!
//! Two signals are computed over the tracking log on every check:
//! - fan-out: distinct fingerprints from the IP in the trailing 24h
//! - rate: tracked requests from the IP in the trailing 60s
//!
//! Every store failure degrades to "not blocked".

use crate::clock::{window_start, Clock, SystemClock};
use crate::config::SecurityPolicy;
use crate::fingerprint::Fingerprint;
use crate::policy::access::{AccessDecision, DEFAULT_BLOCK_REASON};
use crate::protocol::models::{IpRecord, TrackingRecord};
use crate::security::client_ip::extract_client_ip;
use crate::store::IpStore;
use crate::ViewgateError;
use axum::http::HeaderMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Result of evaluating one IP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpVerdict {
    /// Not blocked and no signal tripped.
    Clear {
        /// Distinct fingerprints in the fan-out window.
        fingerprint_count: u64,
    },
    /// Already blocked; the stored reason.
    Blocked {
        /// Reason recorded when the block was placed.
        reason: String,
    },
    /// A signal tripped; the caller should block the IP now.
    ShouldBlock {
        /// First tripped signal, with its measured count.
        reason: String,
    },
}

impl IpVerdict {
    /// Whether the IP is already blocked.
    pub fn is_blocked(&self) -> bool {
        matches!(self, IpVerdict::Blocked { .. })
    }

    /// Whether the IP should be blocked now.
    pub fn should_block(&self) -> bool {
        matches!(self, IpVerdict::ShouldBlock { .. })
    }

    /// Block reason for either denial variant.
    pub fn reason(&self) -> Option<&str> {
        match self {
            IpVerdict::Clear { .. } => None,
            IpVerdict::Blocked { reason } | IpVerdict::ShouldBlock { reason } => Some(reason),
        }
    }
}

/// Evaluates, blocks and tracks client IPs.
pub struct IpSecurityEvaluator {
    store: Arc<dyn IpStore>,
    policy: SecurityPolicy,
    clock: Arc<dyn Clock>,
}

impl IpSecurityEvaluator {
    /// Create an evaluator over the given store, using the system clock.
    pub fn new(store: Arc<dyn IpStore>, policy: SecurityPolicy) -> Result<Self, ViewgateError> {
        Self::with_clock(store, policy, Arc::new(SystemClock))
    }

    /// Create an evaluator with a custom clock.
    pub fn with_clock(
        store: Arc<dyn IpStore>,
        policy: SecurityPolicy,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ViewgateError> {
        policy.validate()?;
        Ok(Self {
            store,
            policy,
            clock,
        })
    }

    /// Active thresholds.
    pub fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }

    /// Decide whether `ip` is blocked, or should be blocked now.
    ///
    /// Fan-out is checked before rate; the first tripped signal's reason is
    /// returned. Store failures yield `Clear`.
    pub async fn check_ip_security(&self, ip: &str) -> IpVerdict {
        match self.store.find_ip(ip).await {
            Ok(Some(record)) if record.is_blocked => {
                info!(ip = %ip, "request from blocked IP");
                return IpVerdict::Blocked {
                    reason: record
                        .block_reason
                        .unwrap_or_else(|| DEFAULT_BLOCK_REASON.to_string()),
                };
            }
            Ok(_) => {}
            Err(e) => {
                warn!(ip = %ip, error = %e, "IP record lookup failed, treating as clear");
            }
        }

        match self.evaluate_signals(ip).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(ip = %ip, error = %e, "activity signals unavailable, treating as clear");
                IpVerdict::Clear {
                    fingerprint_count: 0,
                }
            }
        }
    }

    async fn evaluate_signals(&self, ip: &str) -> Result<IpVerdict, ViewgateError> {
        let now = self.clock.now_utc();

        let fingerprint_count = self
            .store
            .distinct_fingerprints_since(ip, window_start(now, self.policy.fanout_window))
            .await?;
        if fingerprint_count >= self.policy.fanout_threshold {
            return Ok(IpVerdict::ShouldBlock {
                reason: format!(
                    "Too many unique fingerprints ({}) from single IP in {}",
                    fingerprint_count,
                    describe_window(self.policy.fanout_window)
                ),
            });
        }

        let request_count = self
            .store
            .requests_since(ip, window_start(now, self.policy.rate_window))
            .await?;
        if request_count >= self.policy.rate_threshold {
            return Ok(IpVerdict::ShouldBlock {
                reason: format!(
                    "Too many requests ({}) per {}",
                    request_count,
                    describe_rate_window(self.policy.rate_window)
                ),
            });
        }

        debug!(ip = %ip, fingerprint_count, request_count, "IP clear");
        Ok(IpVerdict::Clear { fingerprint_count })
    }

    /// Block an IP. Idempotent; the latest reason wins.
    pub async fn block_ip(&self, ip: &str, reason: &str) -> Result<(), ViewgateError> {
        let now = self.clock.now_utc();
        self.store.upsert_block(ip, reason, now).await?;
        warn!(ip = %ip, reason = %reason, "IP blocked");
        Ok(())
    }

    /// Clear a block. Returns whether the IP had been blocked.
    pub async fn unblock_ip(&self, ip: &str) -> Result<bool, ViewgateError> {
        let cleared = self.store.clear_block(ip, self.clock.now_utc()).await?;
        if cleared {
            info!(ip = %ip, "IP unblocked");
        }
        Ok(cleared)
    }

    /// Current record for an IP, if any.
    pub async fn ip_record(&self, ip: &str) -> Result<Option<IpRecord>, ViewgateError> {
        self.store.find_ip(ip).await
    }

    /// Record one tracked action. Failures are logged, never returned.
    pub async fn track_ip_fingerprint(
        &self,
        fingerprint: &Fingerprint,
        ip: &str,
        user_agent: Option<&str>,
    ) {
        let now = self.clock.now_utc();
        let row = TrackingRecord {
            fingerprint_id: fingerprint.clone(),
            ip_address: ip.to_string(),
            user_agent: user_agent.map(String::from),
            created_at: now,
        };
        if let Err(e) = self.store.append_tracking(row).await {
            error!(ip = %ip, fingerprint = %fingerprint, error = %e, "failed to track fingerprint");
            return;
        }

        let fingerprint_count = match self
            .store
            .distinct_fingerprints_since(ip, window_start(now, self.policy.fanout_window))
            .await
        {
            Ok(count) => count,
            Err(e) => {
                error!(ip = %ip, error = %e, "failed to count fingerprints for IP");
                return;
            }
        };

        if let Err(e) = self.store.touch_ip(ip, fingerprint_count, now).await {
            error!(ip = %ip, error = %e, "failed to update IP record");
        }
    }

    /// Pre-flight decision for an HTTP request.
    ///
    /// Derives the client IP from the proxy headers, then see
    /// [`Self::check_ip_before_request_for`].
    pub async fn check_ip_before_request_server(&self, headers: &HeaderMap) -> AccessDecision {
        let ip = extract_client_ip(headers);
        self.check_ip_before_request_for(&ip).await
    }

    /// Pre-flight decision for a known client IP.
    ///
    /// A tripped signal blocks the IP before denying. If the block cannot be
    /// persisted the request is allowed.
    pub async fn check_ip_before_request_for(&self, ip: &str) -> AccessDecision {
        match self.check_ip_security(ip).await {
            IpVerdict::Clear { .. } => AccessDecision::allow(),
            IpVerdict::Blocked { reason } => AccessDecision::deny(reason),
            IpVerdict::ShouldBlock { reason } => match self.block_ip(ip, &reason).await {
                Ok(()) => AccessDecision::deny(reason),
                Err(e) => AccessDecision::fail_open(&e),
            },
        }
    }
}

fn describe_window(window: Duration) -> String {
    let secs = window.as_secs();
    if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

fn describe_rate_window(window: Duration) -> String {
    if window.as_secs() == 60 {
        "minute".to_string()
    } else {
        describe_window(window)
    }
}
