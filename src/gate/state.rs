//! Client-held gate state and its reducer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Snapshot of the visitor's gate state for the current session.
///
/// A mirror of server decisions; nothing here is written back. Two
/// distinct denials are surfaced: `is_blocked` (IP-level, full-page block)
/// and `has_reached_limit` (view allowance, upsell).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientGateState {
    /// Initial checks still running.
    pub is_loading: bool,
    /// The visitor's IP is blocked.
    pub is_blocked: bool,
    /// Reason shown on the blocked-access screen.
    pub block_reason: Option<String>,
    /// Articles viewed in this session.
    pub viewed_articles: BTreeSet<String>,
    /// Free allowance exhausted. Never reset within a session.
    pub has_reached_limit: bool,
}

impl Default for ClientGateState {
    fn default() -> Self {
        Self {
            is_loading: true,
            is_blocked: false,
            block_reason: None,
            viewed_articles: BTreeSet::new(),
            has_reached_limit: false,
        }
    }
}

/// State transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateEvent {
    /// Full reinitialization (page reload): back to the loading state.
    Reinitialize,
    /// The pre-flight check denied access.
    Blocked {
        /// Reason from the server.
        reason: String,
    },
    /// Access allowed; the server-side view count at load time.
    Allowed {
        /// Distinct articles viewed in the window.
        view_count: u64,
        /// Allowance in effect.
        max_free_articles: u64,
    },
    /// Initial checks could not complete; proceed unrestricted.
    Degraded,
    /// A view was recorded.
    ViewRecorded {
        /// Viewed article.
        article_id: String,
        /// Server-side count before this view.
        prior_count: u64,
        /// Server-side count after this view, when known. A re-read article
        /// leaves it equal to `prior_count`.
        view_count: Option<u64>,
        /// Allowance in effect.
        max_free_articles: u64,
    },
}

impl ClientGateState {
    /// Apply one event.
    pub fn apply(&mut self, event: GateEvent) {
        match event {
            GateEvent::Reinitialize => *self = Self::default(),
            GateEvent::Blocked { reason } => {
                self.is_loading = false;
                self.is_blocked = true;
                self.block_reason = Some(reason);
            }
            GateEvent::Allowed {
                view_count,
                max_free_articles,
            } => {
                self.is_loading = false;
                self.has_reached_limit |= view_count >= max_free_articles;
            }
            GateEvent::Degraded => self.is_loading = false,
            GateEvent::ViewRecorded {
                article_id,
                prior_count,
                view_count,
                max_free_articles,
            } => {
                self.viewed_articles.insert(article_id);
                // Without a post-view count, assume the view was a new article.
                let after = view_count.unwrap_or_else(|| prior_count.saturating_add(1));
                self.has_reached_limit |=
                    prior_count >= max_free_articles || after >= max_free_articles;
            }
        }
    }

    /// Number of distinct articles viewed this session.
    pub fn session_views(&self) -> usize {
        self.viewed_articles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorded(article_id: &str, prior_count: u64) -> GateEvent {
        GateEvent::ViewRecorded {
            article_id: article_id.to_string(),
            prior_count,
            view_count: None,
            max_free_articles: 5,
        }
    }

    fn reread(article_id: &str, count: u64) -> GateEvent {
        GateEvent::ViewRecorded {
            article_id: article_id.to_string(),
            prior_count: count,
            view_count: Some(count),
            max_free_articles: 5,
        }
    }

    #[test]
    fn starts_loading_and_unrestricted() {
        let state = ClientGateState::default();
        assert!(state.is_loading);
        assert!(!state.is_blocked);
        assert!(!state.has_reached_limit);
    }

    #[test]
    fn fifth_view_reaches_limit() {
        let mut state = ClientGateState::default();
        state.apply(recorded("a", 3));
        assert!(!state.has_reached_limit);
        state.apply(recorded("b", 4));
        assert!(state.has_reached_limit);
    }

    #[test]
    fn limit_is_monotonic_within_session() {
        let mut state = ClientGateState::default();
        state.apply(GateEvent::Allowed {
            view_count: 7,
            max_free_articles: 5,
        });
        assert!(state.has_reached_limit);

        state.apply(recorded("a", 0));
        state.apply(GateEvent::Allowed {
            view_count: 0,
            max_free_articles: 5,
        });
        assert!(state.has_reached_limit);
    }

    #[test]
    fn repeated_article_counts_once() {
        let mut state = ClientGateState::default();
        state.apply(recorded("a", 0));
        state.apply(recorded("a", 1));
        assert_eq!(state.session_views(), 1);
    }

    #[test]
    fn rereading_a_counted_article_spends_nothing() {
        let mut state = ClientGateState::default();
        state.apply(reread("a", 4));
        assert!(!state.has_reached_limit);

        state.apply(GateEvent::ViewRecorded {
            article_id: "e".to_string(),
            prior_count: 4,
            view_count: Some(5),
            max_free_articles: 5,
        });
        assert!(state.has_reached_limit);
    }

    #[test]
    fn blocked_keeps_reason() {
        let mut state = ClientGateState::default();
        state.apply(GateEvent::Blocked {
            reason: "Too many requests (31) per minute".to_string(),
        });
        assert!(!state.is_loading);
        assert!(state.is_blocked);
        assert_eq!(
            state.block_reason.as_deref(),
            Some("Too many requests (31) per minute")
        );
    }

    #[test]
    fn reinitialize_clears_session() {
        let mut state = ClientGateState::default();
        state.apply(recorded("a", 4));
        state.apply(GateEvent::Reinitialize);
        assert_eq!(state, ClientGateState::default());
    }
}
