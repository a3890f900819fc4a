//! End-to-end: a `GateSession` driving a live server through `GateClient`.

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use viewgate::fingerprint::{DeviceSignals, FingerprintService, StaticSignals};
use viewgate::server::{router, AppState};
use viewgate::{ClientConfig, GateClient, GateSession, MemoryStore, ServerConfig};

async fn spawn_server() -> (String, AppState) {
    let state = AppState::from_store(Arc::new(MemoryStore::new()), &ServerConfig::default())
        .expect("state");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (format!("http://{}", addr), state)
}

fn client(base_url: &str) -> Arc<GateClient> {
    let mut config = ClientConfig::new(base_url);
    config.timeout = Duration::from_secs(2);
    Arc::new(GateClient::new(&config).expect("client"))
}

fn fingerprints(user_agent: &str) -> Arc<FingerprintService> {
    let signals = DeviceSignals {
        user_agent: user_agent.to_string(),
        languages: vec!["en-US".to_string()],
        timezone: Some("Europe/Berlin".to_string()),
        ..DeviceSignals::default()
    };
    Arc::new(FingerprintService::new(Arc::new(StaticSignals(signals))))
}

#[tokio::test]
async fn fresh_visitor_reaches_limit_on_fifth_article() {
    let (base, _state) = spawn_server().await;
    let session = GateSession::start(client(&base), fingerprints("reader/1")).await;

    let state = session.state();
    assert!(!state.is_loading);
    assert!(!state.is_blocked);
    assert!(!state.has_reached_limit);

    for i in 1..=4 {
        let state = session.add_article_view(&format!("article-{}", i)).await;
        assert!(!state.has_reached_limit, "limit reached early at {}", i);
    }

    let state = session.add_article_view("article-5").await;
    assert!(state.has_reached_limit);
    assert_eq!(state.session_views(), 5);
}

#[tokio::test]
async fn returning_visitor_sees_server_count() {
    let (base, _state) = spawn_server().await;
    let fp = fingerprints("reader/2");

    let first = GateSession::start(client(&base), fp.clone()).await;
    for i in 1..=5 {
        first.add_article_view(&format!("article-{}", i)).await;
    }

    let second = GateSession::start(client(&base), fp.clone()).await;
    let state = second.state();
    assert!(state.has_reached_limit);
    assert!(state.viewed_articles.is_empty());

    let fingerprint = fp.get_fingerprint().await.expect("fingerprint");
    let count = client(&base)
        .article_view_count(&fingerprint, None)
        .await
        .expect("count");
    assert_eq!(count, 5);
}

#[tokio::test]
async fn rereading_an_article_keeps_free_views() {
    let (base, _state) = spawn_server().await;
    let session = GateSession::start(client(&base), fingerprints("reader/7")).await;
    for i in 1..=4 {
        session.add_article_view(&format!("article-{}", i)).await;
    }

    let state = session.add_article_view("article-2").await;
    assert!(!state.has_reached_limit);

    let state = session.add_article_view("article-5").await;
    assert!(state.has_reached_limit);
}

#[tokio::test]
async fn blocked_ip_is_reported_and_not_metered() {
    let (base, state) = spawn_server().await;
    // No proxy headers reach the server, so every request resolves to the fallback IP.
    state
        .evaluator
        .block_ip("127.0.0.1", "Flagged by moderation")
        .await
        .expect("block");

    let fp = fingerprints("reader/3");
    let session = GateSession::start(client(&base), fp.clone()).await;
    let gate = session.state();
    assert!(gate.is_blocked);
    assert_eq!(gate.block_reason.as_deref(), Some("Flagged by moderation"));

    let gate = session.add_article_view("article-1").await;
    assert!(gate.viewed_articles.is_empty());

    let fingerprint = fp.get_fingerprint().await.expect("fingerprint");
    assert_eq!(state.meter.get_article_view_count(&fingerprint, None).await, 0);
}

#[tokio::test]
async fn request_burst_trips_rate_signal() {
    let (base, _state) = spawn_server().await;
    let gate_client = client(&base);
    let fp = fingerprints("reader/4")
        .get_fingerprint()
        .await
        .expect("fingerprint");

    for i in 0..30 {
        let body = gate_client
            .track_article_view(&format!("article-{}", i), &fp, false)
            .await
            .expect("track");
        assert!(body.recorded);
        assert_eq!(body.view_count, Some(i + 1));
    }

    let decision = gate_client.check_ip_before_request().await;
    assert!(!decision.is_allowed());
    assert_eq!(decision.reason(), Some("Too many requests (30) per minute"));
}

#[tokio::test]
async fn client_allowance_drives_session_limit() {
    let (base, _state) = spawn_server().await;
    let mut config = ClientConfig::new(&base);
    config.max_free_articles = 2;
    let gate_client = Arc::new(GateClient::new(&config).expect("client"));

    let session = GateSession::with_allowance(
        gate_client.clone(),
        fingerprints("reader/6"),
        gate_client.max_free_articles(),
    );
    session.initialize().await;

    assert!(!session.add_article_view("article-1").await.has_reached_limit);
    assert!(session.add_article_view("article-2").await.has_reached_limit);
}

#[tokio::test]
async fn unreachable_server_fails_open() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let session =
        GateSession::start(client(&format!("http://{}", addr)), fingerprints("reader/5")).await;
    let state = session.state();
    assert!(!state.is_loading);
    assert!(!state.is_blocked);
    assert!(!state.has_reached_limit);

    let state = session.add_article_view("article-1").await;
    assert!(!state.is_blocked);
}
