//! HTTP surface for the gate.
//!
//! Routes:
//!
//! - `GET /api/check-ip-security` - pre-flight check, 403 when blocked
//! - `GET /api/article-views` - distinct articles in the window
//! - `POST /api/article-views` - record a view and feed the IP signals
//! - `GET|DELETE /api/admin/ip-blocks/{ip}` - inspect or lift a block

pub mod routes;

use crate::config::ServerConfig;
use crate::meter::ViewMeter;
use crate::security::IpSecurityEvaluator;
use crate::store::{FileStore, IpStore, MemoryStore, ViewStore};
use crate::ViewgateError;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// IP signal evaluation.
    pub evaluator: Arc<IpSecurityEvaluator>,

    /// Article metering.
    pub meter: Arc<ViewMeter>,

    /// Admin key; admin routes answer 404 when unset.
    pub admin_api_key: Option<String>,
}

impl AppState {
    /// Build state over a store implementing both tables.
    pub fn from_store<S>(store: Arc<S>, config: &ServerConfig) -> Result<Self, ViewgateError>
    where
        S: IpStore + ViewStore + 'static,
    {
        let evaluator = IpSecurityEvaluator::new(store.clone(), config.security.clone())?;
        let meter = ViewMeter::new(store, config.meter.clone())?;
        Ok(Self {
            evaluator: Arc::new(evaluator),
            meter: Arc::new(meter),
            admin_api_key: config.admin_api_key.clone(),
        })
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/check-ip-security", get(routes::check_ip_security))
        .route(
            "/api/article-views",
            get(routes::article_view_count).post(routes::track_article_view),
        )
        .route(
            "/api/admin/ip-blocks/{ip}",
            get(routes::get_ip_block).delete(routes::delete_ip_block),
        )
        .with_state(state)
}

/// Open the configured store, bind, and serve until the task is dropped.
pub async fn serve(config: ServerConfig) -> Result<(), ViewgateError> {
    config.validate()?;

    let state = match &config.data_path {
        Some(path) => {
            let store = FileStore::open(path.clone()).await?;
            info!(path = %store.path().display(), "using file store");
            AppState::from_store(Arc::new(store), &config)?
        }
        None => {
            info!("using in-memory store");
            AppState::from_store(Arc::new(MemoryStore::new()), &config)?
        }
    };
    if state.admin_api_key.is_none() {
        info!("admin routes disabled (no admin key configured)");
    }

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .map_err(|e| ViewgateError::Server(format!("Failed to bind {}: {}", config.bind_addr, e)))?;
    info!(addr = %config.bind_addr, "viewgate server listening");

    axum::serve(listener, router(state))
        .await
        .map_err(|e| ViewgateError::Server(format!("Server error: {}", e)))
}
