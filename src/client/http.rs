//! Reqwest-based HTTP client for the gate endpoints.
//!
//! The pre-flight check never fails: HTTP 403 is a denial, every other
//! outcome (success, other statuses, transport errors, timeouts) allows.

use crate::config::ClientConfig;
use crate::fingerprint::Fingerprint;
use crate::gate::GateBackend;
use crate::policy::access::{AccessDecision, DEFAULT_BLOCK_REASON};
use crate::protocol::models::{
    SecurityCheckResponse, TrackViewRequest, TrackViewResponse, ViewCountResponse,
};
use crate::ViewgateError;
use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

/// Path of the pre-flight security check.
pub const CHECK_IP_SECURITY_PATH: &str = "/api/check-ip-security";

/// Path of the article view endpoints.
pub const ARTICLE_VIEWS_PATH: &str = "/api/article-views";

/// Gate HTTP client.
pub struct GateClient {
    client: Client,
    base_url: String,
    user_agent: String,
    max_free_articles: u64,
}

impl GateClient {
    /// Create a client from config.
    pub fn new(config: &ClientConfig) -> Result<Self, ViewgateError> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ViewgateError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user_agent: build_user_agent(config),
            max_free_articles: config.max_free_articles,
        })
    }

    /// Server base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Free-article allowance to pass to [`crate::gate::GateSession::with_allowance`].
    pub fn max_free_articles(&self) -> u64 {
        self.max_free_articles
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Ask the server whether this visitor may proceed.
    pub async fn check_ip_before_request(&self) -> AccessDecision {
        let response = match self
            .client
            .get(self.url(CHECK_IP_SECURITY_PATH))
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return AccessDecision::fail_open(&ViewgateError::Transport(format!(
                    "Security check failed: {}",
                    e
                )))
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!("security check passed");
            return AccessDecision::allow();
        }
        if status == StatusCode::FORBIDDEN {
            let reason = response
                .json::<SecurityCheckResponse>()
                .await
                .ok()
                .and_then(|body| body.reason)
                .unwrap_or_else(|| DEFAULT_BLOCK_REASON.to_string());
            return AccessDecision::deny(reason);
        }

        AccessDecision::fail_open(&ViewgateError::Transport(format!(
            "Security check returned HTTP {}",
            status.as_u16()
        )))
    }

    /// Distinct articles viewed by `fingerprint` in the server's window.
    pub async fn article_view_count(
        &self,
        fingerprint: &Fingerprint,
        window_days: Option<u32>,
    ) -> Result<u64, ViewgateError> {
        let mut query = vec![("fingerprint", fingerprint.as_str().to_string())];
        if let Some(days) = window_days {
            query.push(("window_days", days.to_string()));
        }

        let response = self
            .client
            .get(self.url(ARTICLE_VIEWS_PATH))
            .header(USER_AGENT, &self.user_agent)
            .query(&query)
            .send()
            .await
            .map_err(|e| ViewgateError::Transport(format!("View count request failed: {}", e)))?;

        let body: ViewCountResponse = expect_success(response)
            .await?
            .json()
            .await
            .map_err(|e| ViewgateError::ProtocolError(format!("Invalid view count body: {}", e)))?;
        Ok(body.count)
    }

    /// Record a view. The response says whether the server persisted it and
    /// the distinct count afterwards.
    pub async fn track_article_view(
        &self,
        article_id: &str,
        fingerprint: &Fingerprint,
        over_limit: bool,
    ) -> Result<TrackViewResponse, ViewgateError> {
        let request = TrackViewRequest {
            article_id: article_id.to_string(),
            fingerprint: fingerprint.as_str().to_string(),
            over_limit,
        };

        let response = self
            .client
            .post(self.url(ARTICLE_VIEWS_PATH))
            .header(USER_AGENT, &self.user_agent)
            .json(&request)
            .send()
            .await
            .map_err(|e| ViewgateError::Transport(format!("Track view request failed: {}", e)))?;

        let body: TrackViewResponse = expect_success(response)
            .await?
            .json()
            .await
            .map_err(|e| ViewgateError::ProtocolError(format!("Invalid track body: {}", e)))?;
        Ok(body)
    }
}

async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response, ViewgateError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response.text().await.unwrap_or_default();
    Err(ViewgateError::Transport(format!(
        "HTTP {}: {}",
        status.as_u16(),
        detail
    )))
}

#[async_trait]
impl GateBackend for GateClient {
    async fn check_access(&self) -> AccessDecision {
        self.check_ip_before_request().await
    }

    async fn article_view_count(&self, fingerprint: &Fingerprint) -> Result<u64, ViewgateError> {
        GateClient::article_view_count(self, fingerprint, None).await
    }

    async fn track_article_view(
        &self,
        article_id: &str,
        fingerprint: &Fingerprint,
        over_limit: bool,
    ) -> Result<Option<u64>, ViewgateError> {
        let body = GateClient::track_article_view(self, article_id, fingerprint, over_limit)
            .await?;
        if !body.recorded {
            warn!(article_id = %article_id, "server did not record article view");
        }
        Ok(body.view_count)
    }
}

/// Build a User-Agent string from config.
///
/// Format: `<product>/viewgate-<version> <app>`
pub fn build_user_agent(config: &ClientConfig) -> String {
    format!(
        "{}/viewgate-{} {}",
        config.user_agent_product,
        env!("CARGO_PKG_VERSION"),
        config.app_name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client_for(base_url: &str) -> GateClient {
        let mut config = ClientConfig::new(base_url);
        config.timeout = Duration::from_millis(500);
        GateClient::new(&config).unwrap()
    }

    #[test]
    fn user_agent_format() {
        let mut config = ClientConfig::new("https://example.com");
        config.app_name = "newsroom/2.1.0".to_string();
        config.user_agent_product = "newsroom-web".to_string();

        assert_eq!(
            build_user_agent(&config),
            format!("newsroom-web/viewgate-{} newsroom/2.1.0", env!("CARGO_PKG_VERSION"))
        );
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let client = client_for("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[tokio::test]
    async fn success_allows() {
        let base = serve(Router::new().route(
            CHECK_IP_SECURITY_PATH,
            get(|| async { Json(serde_json::json!({ "allowed": true })) }),
        ))
        .await;
        assert!(client_for(&base).check_ip_before_request().await.is_allowed());
    }

    #[tokio::test]
    async fn forbidden_denies_with_reason() {
        let base = serve(Router::new().route(
            CHECK_IP_SECURITY_PATH,
            get(|| async {
                (
                    AxumStatus::FORBIDDEN,
                    Json(serde_json::json!({ "reason": "Too many requests (31) per minute" })),
                )
            }),
        ))
        .await;

        let decision = client_for(&base).check_ip_before_request().await;
        assert_eq!(decision.reason(), Some("Too many requests (31) per minute"));
    }

    #[tokio::test]
    async fn forbidden_without_body_uses_default_reason() {
        let base = serve(Router::new().route(
            CHECK_IP_SECURITY_PATH,
            get(|| async { AxumStatus::FORBIDDEN }),
        ))
        .await;

        let decision = client_for(&base).check_ip_before_request().await;
        assert_eq!(decision.reason(), Some(DEFAULT_BLOCK_REASON));
    }

    #[tokio::test]
    async fn server_error_fails_open() {
        let base = serve(Router::new().route(
            CHECK_IP_SECURITY_PATH,
            get(|| async { AxumStatus::INTERNAL_SERVER_ERROR }),
        ))
        .await;
        assert!(client_for(&base).check_ip_before_request().await.is_allowed());
    }

    #[tokio::test]
    async fn timeout_fails_open() {
        let base = serve(Router::new().route(
            CHECK_IP_SECURITY_PATH,
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                AxumStatus::FORBIDDEN
            }),
        ))
        .await;
        assert!(client_for(&base).check_ip_before_request().await.is_allowed());
    }

    #[tokio::test]
    async fn unreachable_server_fails_open() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_for(&format!("http://{}", addr));
        assert!(client.check_ip_before_request().await.is_allowed());
    }

    #[tokio::test]
    async fn view_count_error_is_reported() {
        let base = serve(Router::new().route(
            ARTICLE_VIEWS_PATH,
            get(|| async { AxumStatus::BAD_GATEWAY }),
        ))
        .await;

        let fingerprint = Fingerprint::parse("abc123").unwrap();
        let result = client_for(&base).article_view_count(&fingerprint, None).await;
        assert!(matches!(result, Err(ViewgateError::Transport(_))));
    }
}
