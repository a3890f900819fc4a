//! Gate session - the visitor-facing API of viewgate.
//!
//! A `GateSession` is the explicit context object an application creates
//! once at its root and drops on teardown. It:
//! - runs the pre-flight IP check and loads the server-side view count
//! - meters article views against the free allowance
//! - publishes every state change to subscribers

use crate::config::MAX_FREE_ARTICLES;
use crate::fingerprint::FingerprintService;
use crate::gate::state::{ClientGateState, GateEvent};
use crate::gate::GateBackend;
use crate::meter::views::validate_article_id;
use crate::policy::access::AccessDecision;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Visitor gate session.
pub struct GateSession {
    backend: Arc<dyn GateBackend>,
    fingerprints: Arc<FingerprintService>,
    max_free_articles: u64,
    state: watch::Sender<ClientGateState>,
}

impl GateSession {
    /// Create a session in the loading state. Call [`Self::initialize`]
    /// before metering views.
    pub fn new(backend: Arc<dyn GateBackend>, fingerprints: Arc<FingerprintService>) -> Self {
        Self::with_allowance(backend, fingerprints, MAX_FREE_ARTICLES)
    }

    /// Create a session with a custom free-article allowance.
    pub fn with_allowance(
        backend: Arc<dyn GateBackend>,
        fingerprints: Arc<FingerprintService>,
        max_free_articles: u64,
    ) -> Self {
        let (state, _) = watch::channel(ClientGateState::default());
        Self {
            backend,
            fingerprints,
            max_free_articles: max_free_articles.max(1),
            state,
        }
    }

    /// Create and initialize a session.
    pub async fn start(
        backend: Arc<dyn GateBackend>,
        fingerprints: Arc<FingerprintService>,
    ) -> Self {
        let session = Self::new(backend, fingerprints);
        session.initialize().await;
        session
    }

    /// Run the initial checks, discarding any previous session state.
    ///
    /// 1. Pre-flight IP check; a denial ends here with `is_blocked`
    /// 2. Fingerprint and server-side view count; `has_reached_limit` when
    ///    the allowance is already spent
    ///
    /// Failures in step 2 leave the visitor unrestricted.
    pub async fn initialize(&self) -> ClientGateState {
        self.dispatch(GateEvent::Reinitialize);

        if let AccessDecision::Deny { reason } = self.backend.check_access().await {
            info!(reason = %reason, "visitor blocked");
            self.dispatch(GateEvent::Blocked { reason });
            return self.state();
        }

        let fingerprint = match self.fingerprints.get_fingerprint().await {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                warn!(error = %e, "fingerprint unavailable, view metering disabled");
                self.dispatch(GateEvent::Degraded);
                return self.state();
            }
        };

        match self.backend.article_view_count(&fingerprint).await {
            Ok(view_count) => self.dispatch(GateEvent::Allowed {
                view_count,
                max_free_articles: self.max_free_articles,
            }),
            Err(e) => {
                warn!(error = %e, "view count unavailable");
                self.dispatch(GateEvent::Degraded);
            }
        }
        self.state()
    }

    /// Meter a view of `article_id`.
    ///
    /// Skipped entirely when the visitor is blocked. Otherwise the current
    /// server count decides whether the view is over the allowance, the
    /// view is tracked, and the count reported after tracking decides
    /// `has_reached_limit`. Re-reading an already counted article spends
    /// nothing. A failed tracking write is logged and the view counts
    /// locally as a new article.
    pub async fn add_article_view(&self, article_id: &str) -> ClientGateState {
        if self.state.borrow().is_blocked {
            debug!(article_id = %article_id, "blocked visitor, view not tracked");
            return self.state();
        }

        let article_id = match validate_article_id(article_id) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "ignoring article view");
                return self.state();
            }
        };

        let fingerprint = match self.fingerprints.get_fingerprint().await {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                warn!(error = %e, "fingerprint unavailable, view not tracked");
                return self.state();
            }
        };

        let prior_count = match self.backend.article_view_count(&fingerprint).await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "view count unavailable, view not tracked");
                return self.state();
            }
        };

        let will_exceed = prior_count >= self.max_free_articles;
        let view_count = match self
            .backend
            .track_article_view(article_id, &fingerprint, will_exceed)
            .await
        {
            Ok(view_count) => view_count,
            Err(e) => {
                error!(article_id = %article_id, error = %e, "failed to track article view");
                None
            }
        };

        self.dispatch(GateEvent::ViewRecorded {
            article_id: article_id.to_string(),
            prior_count,
            view_count,
            max_free_articles: self.max_free_articles,
        });

        let state = self.state();
        if state.has_reached_limit {
            info!(fingerprint = %fingerprint, prior_count, "free article limit reached");
        }
        state
    }

    /// Current state snapshot.
    pub fn state(&self) -> ClientGateState {
        self.state.borrow().clone()
    }

    /// Receive every subsequent state change.
    pub fn subscribe(&self) -> watch::Receiver<ClientGateState> {
        self.state.subscribe()
    }

    fn dispatch(&self, event: GateEvent) {
        self.state.send_modify(|state| state.apply(event));
    }
}
