//! Allow/deny decisions with an explicit fail-open fallback.
//!
//! Availability wins over strict enforcement: any check that cannot be
//! completed resolves to [`AccessDecision::fail_open`], never to a denial.

use crate::ViewgateError;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Reason reported when a 403 arrives without one.
pub const DEFAULT_BLOCK_REASON: &str = "Access denied due to suspicious activity";

/// Outcome of a pre-flight access check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum AccessDecision {
    /// The caller may proceed.
    Allow,
    /// The caller is blocked.
    Deny {
        /// Human-readable block reason.
        reason: String,
    },
}

impl AccessDecision {
    /// Allow the caller.
    pub fn allow() -> Self {
        AccessDecision::Allow
    }

    /// Deny with a reason. Empty reasons fall back to [`DEFAULT_BLOCK_REASON`].
    pub fn deny(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        if reason.trim().is_empty() {
            AccessDecision::Deny {
                reason: DEFAULT_BLOCK_REASON.to_string(),
            }
        } else {
            AccessDecision::Deny { reason }
        }
    }

    /// The check could not be completed: log and allow.
    pub fn fail_open(error: &ViewgateError) -> Self {
        warn!(error = %error, "access check failed, allowing request");
        AccessDecision::Allow
    }

    /// Whether the caller may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allow)
    }

    /// Block reason, if denied.
    pub fn reason(&self) -> Option<&str> {
        match self {
            AccessDecision::Allow => None,
            AccessDecision::Deny { reason } => Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_open_allows() {
        let decision = AccessDecision::fail_open(&ViewgateError::Transport("timeout".into()));
        assert!(decision.is_allowed());
        assert!(decision.reason().is_none());
    }

    #[test]
    fn deny_keeps_reason() {
        let decision = AccessDecision::deny("Too many requests (31) per minute");
        assert!(!decision.is_allowed());
        assert_eq!(decision.reason(), Some("Too many requests (31) per minute"));
    }

    #[test]
    fn deny_without_reason_uses_default() {
        let decision = AccessDecision::deny("  ");
        assert_eq!(decision.reason(), Some(DEFAULT_BLOCK_REASON));
    }

    #[test]
    fn serializes_with_decision_tag() {
        let json = serde_json::to_string(&AccessDecision::deny("blocked")).unwrap();
        assert_eq!(json, r#"{"decision":"deny","reason":"blocked"}"#);
    }
}
