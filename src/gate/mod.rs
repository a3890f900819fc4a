//! Visitor-side gate: shared state plus the orchestration that feeds it.

pub mod local;
pub mod session;
pub mod state;

pub use local::LocalBackend;
pub use session::GateSession;
pub use state::{ClientGateState, GateEvent};

use crate::fingerprint::Fingerprint;
use crate::policy::access::AccessDecision;
use crate::ViewgateError;
use async_trait::async_trait;

/// Server operations a [`GateSession`] depends on.
///
/// Implemented over HTTP by [`crate::client::http::GateClient`] and
/// in-process by [`LocalBackend`].
#[async_trait]
pub trait GateBackend: Send + Sync {
    /// Pre-flight IP check. Must not fail: unreachable means allowed.
    async fn check_access(&self) -> AccessDecision;

    /// Distinct articles `fingerprint` viewed in the metering window.
    async fn article_view_count(&self, fingerprint: &Fingerprint) -> Result<u64, ViewgateError>;

    /// Record one view. Returns the distinct count after the view when the
    /// backend can report it.
    async fn track_article_view(
        &self,
        article_id: &str,
        fingerprint: &Fingerprint,
        over_limit: bool,
    ) -> Result<Option<u64>, ViewgateError>;
}
