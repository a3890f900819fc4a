//! Tracking records and the JSON bodies exchanged with the gate endpoints.

use crate::fingerprint::Fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-IP security state. One record per distinct client IP.
///
/// Once `is_blocked` is set the record short-circuits every later check
/// until an administrator clears it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpRecord {
    /// Client IP address (natural key).
    pub ip_address: String,

    /// Whether the IP is blocked.
    #[serde(default)]
    pub is_blocked: bool,

    /// Human-readable reason recorded when the IP was blocked.
    #[serde(default)]
    pub block_reason: Option<String>,

    /// When the IP was blocked.
    #[serde(default)]
    pub blocked_at: Option<DateTime<Utc>>,

    /// Cached count of distinct fingerprints seen in the fan-out window.
    #[serde(default)]
    pub fingerprint_count: u64,

    /// Last tracked request from this IP.
    pub last_seen: DateTime<Utc>,

    /// Last modification of this record.
    pub updated_at: DateTime<Utc>,
}

impl IpRecord {
    /// A fresh, unblocked record first seen at `now`.
    pub fn new(ip_address: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            ip_address: ip_address.into(),
            is_blocked: false,
            block_reason: None,
            blocked_at: None,
            fingerprint_count: 0,
            last_seen: now,
            updated_at: now,
        }
    }

    /// Mark blocked. The latest reason wins.
    pub fn block(&mut self, reason: &str, at: DateTime<Utc>) {
        self.is_blocked = true;
        self.block_reason = Some(reason.to_string());
        self.blocked_at = Some(at);
        self.updated_at = at;
    }

    /// Lift a block. Returns whether the record was blocked.
    pub fn unblock(&mut self, at: DateTime<Utc>) -> bool {
        if !self.is_blocked {
            return false;
        }
        self.is_blocked = false;
        self.block_reason = None;
        self.blocked_at = None;
        self.updated_at = at;
        true
    }

    /// Record activity with the current fan-out count.
    pub fn touch(&mut self, fingerprint_count: u64, at: DateTime<Utc>) {
        self.fingerprint_count = fingerprint_count;
        self.last_seen = at;
        self.updated_at = at;
    }
}

/// One observed (fingerprint, IP, user agent) tuple. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingRecord {
    /// Visitor fingerprint reported by the client.
    pub fingerprint_id: Fingerprint,

    /// Client IP the request arrived from.
    pub ip_address: String,

    /// User-Agent header, when present.
    #[serde(default)]
    pub user_agent: Option<String>,

    /// When the request was tracked.
    pub created_at: DateTime<Utc>,
}

/// One article view by one fingerprint. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleViewRecord {
    /// Viewer fingerprint.
    pub fingerprint: Fingerprint,

    /// Viewed article.
    pub article_id: String,

    /// When the view was recorded.
    pub created_at: DateTime<Utc>,

    /// Whether the viewer was already over the free allowance (analytics only).
    #[serde(default)]
    pub over_limit: bool,
}

/// Body of `GET /api/check-ip-security`. A 403 carries `allowed: false`
/// and the block `reason`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityCheckResponse {
    /// Whether the caller may proceed.
    #[serde(default = "default_allowed")]
    pub allowed: bool,

    /// Block reason, present on denial.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

fn default_allowed() -> bool {
    true
}

/// Query of `GET /api/article-views`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewCountQuery {
    /// Fingerprint to count views for.
    pub fingerprint: String,

    /// Window override in days.
    #[serde(default)]
    pub window_days: Option<u32>,
}

/// Body of `GET /api/article-views`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewCountResponse {
    /// Distinct articles viewed within the window.
    pub count: u64,
}

/// Body of `POST /api/article-views`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackViewRequest {
    /// Viewed article.
    pub article_id: String,

    /// Viewer fingerprint.
    pub fingerprint: String,

    /// Whether the viewer was already over the allowance.
    #[serde(default)]
    pub over_limit: bool,
}

/// Response of `POST /api/article-views`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackViewResponse {
    /// Whether the view was persisted.
    pub recorded: bool,

    /// Distinct articles in the window after this view. Absent when the
    /// view was not recorded or the count could not be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_count: Option<u64>,
}

/// Response of `DELETE /api/admin/ip-blocks/{ip}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnblockResponse {
    /// The IP the request named.
    pub ip_address: String,

    /// Whether a block was lifted. False if the IP was not blocked.
    pub unblocked: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_body_parses_with_reason_only() {
        let body: SecurityCheckResponse =
            serde_json::from_str(r#"{"reason":"Too many requests (31) per minute"}"#).unwrap();
        assert!(body.allowed);
        assert_eq!(body.reason.as_deref(), Some("Too many requests (31) per minute"));
    }

    #[test]
    fn allowed_body_omits_reason() {
        let body = SecurityCheckResponse {
            allowed: true,
            reason: None,
        };
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"allowed":true}"#);
    }

    #[test]
    fn track_request_defaults_over_limit() {
        let req: TrackViewRequest =
            serde_json::from_str(r#"{"article_id":"a1","fingerprint":"abc"}"#).unwrap();
        assert!(!req.over_limit);
    }

    #[test]
    fn track_response_without_count_parses() {
        let body: TrackViewResponse = serde_json::from_str(r#"{"recorded":false}"#).unwrap();
        assert!(!body.recorded);
        assert_eq!(body.view_count, None);
    }

    #[test]
    fn ip_record_starts_clear() {
        let now = Utc::now();
        let record = IpRecord::new("203.0.113.7", now);
        assert!(!record.is_blocked);
        assert!(record.block_reason.is_none());
        assert_eq!(record.last_seen, now);
    }

    #[test]
    fn unblock_only_reports_real_blocks() {
        let now = Utc::now();
        let mut record = IpRecord::new("203.0.113.7", now);
        assert!(!record.unblock(now));

        record.block("abuse", now);
        record.touch(4, now);
        assert!(record.is_blocked);
        assert!(record.unblock(now));
        assert!(record.blocked_at.is_none());
        assert_eq!(record.fingerprint_count, 4);
    }
}
