//! Route handlers.

use crate::fingerprint::Fingerprint;
use crate::meter::views::validate_article_id;
use crate::policy::access::AccessDecision;
use crate::protocol::models::{
    IpRecord, SecurityCheckResponse, TrackViewRequest, TrackViewResponse, UnblockResponse,
    ViewCountQuery, ViewCountResponse,
};
use crate::security::extract_client_ip;
use crate::server::AppState;
use crate::ViewgateError;
use axum::extract::{Path, Query, State};
use axum::http::header::USER_AGENT;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

/// Header carrying the admin key.
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Admin route failures.
#[derive(Debug)]
pub enum AdminError {
    /// Admin routes are disabled.
    Disabled,
    /// Missing or wrong key.
    Unauthorized,
    /// No record for the IP.
    NotFound(String),
    /// Store failure.
    Internal(ViewgateError),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AdminError::Disabled => (StatusCode::NOT_FOUND, "not found".to_string()),
            AdminError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            AdminError::NotFound(ip) => (StatusCode::NOT_FOUND, format!("no record for {}", ip)),
            AdminError::Internal(e) => return e.into_response(),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// `GET /api/check-ip-security`
pub async fn check_ip_security(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match state.evaluator.check_ip_before_request_server(&headers).await {
        AccessDecision::Allow => Json(SecurityCheckResponse {
            allowed: true,
            reason: None,
        })
        .into_response(),
        AccessDecision::Deny { reason } => (
            StatusCode::FORBIDDEN,
            Json(SecurityCheckResponse {
                allowed: false,
                reason: Some(reason),
            }),
        )
            .into_response(),
    }
}

/// `GET /api/article-views?fingerprint=..&window_days=..`
pub async fn article_view_count(
    State(state): State<AppState>,
    Query(query): Query<ViewCountQuery>,
) -> Result<Json<ViewCountResponse>, ViewgateError> {
    let fingerprint = Fingerprint::parse(&query.fingerprint)?;
    if query.window_days == Some(0) {
        return Err(ViewgateError::InvalidRequest(
            "window_days must be at least 1".to_string(),
        ));
    }

    let count = state
        .meter
        .get_article_view_count(&fingerprint, query.window_days)
        .await;
    Ok(Json(ViewCountResponse { count }))
}

/// `POST /api/article-views`
///
/// Feeds the IP signals before recording the view, then reports the
/// distinct count after it. A store failure is reported as
/// `recorded: false`, not as an error status. Blocked IPs are not refused
/// here; skipping tracking while blocked is the caller's job.
pub async fn track_article_view(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<TrackViewRequest>,
) -> Result<Json<TrackViewResponse>, ViewgateError> {
    let fingerprint = Fingerprint::parse(&request.fingerprint)?;
    let article_id = validate_article_id(&request.article_id)?;

    let ip = extract_client_ip(&headers);
    let user_agent = headers.get(USER_AGENT).and_then(|v| v.to_str().ok());
    state
        .evaluator
        .track_ip_fingerprint(&fingerprint, &ip, user_agent)
        .await;

    match state
        .meter
        .track_article_view(article_id, &fingerprint, request.over_limit)
        .await
    {
        Ok(()) => {
            let view_count = match state.meter.count_article_views(&fingerprint, None).await {
                Ok(count) => Some(count),
                Err(e) => {
                    warn!(fingerprint = %fingerprint, error = %e, "view count unavailable after tracking");
                    None
                }
            };
            Ok(Json(TrackViewResponse {
                recorded: true,
                view_count,
            }))
        }
        Err(e @ ViewgateError::InvalidRequest(_)) => Err(e),
        Err(e) => {
            error!(article_id = %article_id, fingerprint = %fingerprint, error = %e, "failed to record article view");
            Ok(Json(TrackViewResponse {
                recorded: false,
                view_count: None,
            }))
        }
    }
}

/// `GET /api/admin/ip-blocks/{ip}`
pub async fn get_ip_block(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(ip): Path<String>,
) -> Result<Json<IpRecord>, AdminError> {
    authorize(&state, &headers)?;
    match state.evaluator.ip_record(&ip).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(AdminError::NotFound(ip)),
        Err(e) => Err(AdminError::Internal(e)),
    }
}

/// `DELETE /api/admin/ip-blocks/{ip}`
pub async fn delete_ip_block(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(ip): Path<String>,
) -> Result<Json<UnblockResponse>, AdminError> {
    authorize(&state, &headers)?;
    let unblocked = state
        .evaluator
        .unblock_ip(&ip)
        .await
        .map_err(AdminError::Internal)?;
    info!(ip = %ip, unblocked, "admin unblock");
    Ok(Json(UnblockResponse {
        ip_address: ip,
        unblocked,
    }))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), AdminError> {
    let expected = state.admin_api_key.as_deref().ok_or(AdminError::Disabled)?;
    let provided = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AdminError::Unauthorized)?;

    // Digests have equal length, so the comparison does not leak the key length.
    if Sha256::digest(expected.as_bytes()) != Sha256::digest(provided.as_bytes()) {
        warn!("invalid admin key");
        return Err(AdminError::Unauthorized);
    }
    Ok(())
}
