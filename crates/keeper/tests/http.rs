// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the keeper admin API.
//!
//! Uses `axum_test::TestServer`, so no real TCP is needed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use tokio_util::sync::CancellationToken;

use didkeep::agent::{AgentFactory, RetryPolicy};
use didkeep::clock::ManualClock;
use didkeep::did::Did;
use didkeep::expiry::ExpiryTracker;
use didkeep::markers::RefreshMarkers;
use didkeep::provider::IdentityProvider;
use didkeep::scheduler::timers::TokioTimers;
use didkeep::scheduler::SchedulerHandle;
use didkeep::session::decode::OAuthTokenDecoder;
use didkeep::session::{Session, SessionBlob, SessionStore};
use didkeep::state::KeeperState;
use didkeep::store::{KvStore, MemoryKv};
use didkeep::transport::build_router;

/// Provider that always has a session ready.
struct ReadyProvider;

#[async_trait]
impl IdentityProvider for ReadyProvider {
    async fn restore(&self, did: &Did) -> anyhow::Result<Option<Session>> {
        Ok(Some(Session { did: did.clone(), blob: SessionBlob::new("{}") }))
    }
}

struct Harness {
    state: Arc<KeeperState>,
    sessions: SessionStore,
}

fn harness(auth_token: Option<&str>) -> Harness {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let sessions = SessionStore::new(Arc::clone(&kv), Arc::new(ManualClock::new(1_000)));
    let markers = RefreshMarkers::new(kv, "refresh", 10);
    let tracker = Arc::new(ExpiryTracker::new(sessions.clone(), Arc::new(OAuthTokenDecoder), 10));
    let factory = Arc::new(AgentFactory::new(Arc::new(ReadyProvider), RetryPolicy::default()));
    let handle = SchedulerHandle::new(factory, Arc::new(TokioTimers), Duration::from_secs(300));
    let state = Arc::new(KeeperState::new(
        auth_token.map(str::to_owned),
        handle,
        markers,
        tracker,
        CancellationToken::new(),
    ));
    Harness { state, sessions }
}

fn test_server(state: Arc<KeeperState>) -> anyhow::Result<TestServer> {
    Ok(TestServer::new(build_router(state))?)
}

#[tokio::test]
async fn health_reports_tracked_count() -> anyhow::Result<()> {
    let h = harness(None);
    h.state.handle.track(Did::parse("did:plc:alice")?, Duration::from_secs(60));

    let server = test_server(h.state)?;
    let resp = server.get("/api/v1/health").await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "running");
    assert_eq!(body["tracked"], 1);
    Ok(())
}

#[tokio::test]
async fn register_writes_marker_and_tracks() -> anyhow::Result<()> {
    let h = harness(None);
    let did = Did::parse("did:plc:alice")?;
    let server = test_server(Arc::clone(&h.state))?;

    let resp = server.post("/api/v1/refresh/did:plc:alice").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["did"], "did:plc:alice");
    assert_eq!(body["registered"], true);
    assert_eq!(body["tracked"], true);

    assert!(h.state.markers.contains(&did).await?);
    assert!(h.state.handle.is_tracked(&did));
    Ok(())
}

#[tokio::test]
async fn register_twice_reuses_marker() -> anyhow::Result<()> {
    let h = harness(None);
    let server = test_server(Arc::clone(&h.state))?;

    server.post("/api/v1/refresh/did:plc:alice").await.assert_status_ok();
    let resp = server.post("/api/v1/refresh/did:plc:alice").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["registered"], false);
    assert_eq!(body["tracked"], true);
    assert_eq!(h.state.handle.len(), 1);
    Ok(())
}

#[tokio::test]
async fn register_rejects_malformed_did() -> anyhow::Result<()> {
    let h = harness(None);
    let server = test_server(Arc::clone(&h.state))?;

    let resp = server.post("/api/v1/refresh/not-a-did").await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert!(h.state.handle.is_empty());
    Ok(())
}

#[tokio::test]
async fn list_returns_tracked_dids_sorted() -> anyhow::Result<()> {
    let h = harness(None);
    h.state.handle.track(Did::parse("did:plc:bbb")?, Duration::from_secs(60));
    h.state.handle.track(Did::parse("did:plc:aaa")?, Duration::from_secs(60));

    let server = test_server(h.state)?;
    let resp = server.get("/api/v1/refresh").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["dids"], serde_json::json!(["did:plc:aaa", "did:plc:bbb"]));
    Ok(())
}

#[tokio::test]
async fn sweep_returns_report() -> anyhow::Result<()> {
    let h = harness(None);
    h.sessions
        .put(&Did::parse("did:plc:alice")?, SessionBlob::new(r#"{"tokenSet":{"expires_at":5000}}"#))
        .await?;
    h.sessions.put(&Did::parse("did:plc:bob")?, SessionBlob::new(r#"{"tokenSet":{}}"#)).await?;

    let server = test_server(h.state)?;
    let resp = server.post("/api/v1/expiry/sweep").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["scanned"], 2);
    assert_eq!(body["updated"], 1);
    assert_eq!(body["failed"][0][0], "session:did:plc:bob");

    let record = h.sessions.get(&Did::parse("did:plc:alice")?).await?;
    assert_eq!(record.and_then(|r| r.expires_at), Some(5000));
    Ok(())
}

#[tokio::test]
async fn auth_required_except_health() -> anyhow::Result<()> {
    let h = harness(Some("s3cret"));
    let server = test_server(h.state)?;

    server.get("/api/v1/health").await.assert_status_ok();

    let resp = server.get("/api/v1/refresh").await;
    resp.assert_status(StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    server.get("/api/v1/refresh").authorization_bearer("wrong").await.assert_status(StatusCode::UNAUTHORIZED);
    server.get("/api/v1/refresh").authorization_bearer("s3cret").await.assert_status_ok();
    server
        .post("/api/v1/refresh/did:plc:alice")
        .authorization_bearer("s3cret")
        .await
        .assert_status_ok();
    Ok(())
}
