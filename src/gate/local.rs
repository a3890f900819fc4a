//! In-process backend for server-rendered embeddings.

use crate::fingerprint::Fingerprint;
use crate::gate::GateBackend;
use crate::meter::ViewMeter;
use crate::policy::access::AccessDecision;
use crate::security::IpSecurityEvaluator;
use crate::ViewgateError;
use async_trait::async_trait;
use std::sync::Arc;

/// Backend calling the evaluator and meter directly for one visitor.
pub struct LocalBackend {
    evaluator: Arc<IpSecurityEvaluator>,
    meter: Arc<ViewMeter>,
    client_ip: String,
    user_agent: Option<String>,
}

impl LocalBackend {
    /// Bind a backend to the visitor's IP and User-Agent.
    pub fn new(
        evaluator: Arc<IpSecurityEvaluator>,
        meter: Arc<ViewMeter>,
        client_ip: impl Into<String>,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            evaluator,
            meter,
            client_ip: client_ip.into(),
            user_agent,
        }
    }
}

#[async_trait]
impl GateBackend for LocalBackend {
    async fn check_access(&self) -> AccessDecision {
        self.evaluator
            .check_ip_before_request_for(&self.client_ip)
            .await
    }

    async fn article_view_count(&self, fingerprint: &Fingerprint) -> Result<u64, ViewgateError> {
        Ok(self.meter.get_article_view_count(fingerprint, None).await)
    }

    async fn track_article_view(
        &self,
        article_id: &str,
        fingerprint: &Fingerprint,
        over_limit: bool,
    ) -> Result<Option<u64>, ViewgateError> {
        self.evaluator
            .track_ip_fingerprint(fingerprint, &self.client_ip, self.user_agent.as_deref())
            .await;
        self.meter
            .track_article_view(article_id, fingerprint, over_limit)
            .await?;
        Ok(self.meter.count_article_views(fingerprint, None).await.ok())
    }
}
