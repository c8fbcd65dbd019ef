// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::*;
use crate::clock::ManualClock;
use crate::session::decode::OAuthTokenDecoder;
use crate::session::{SessionBlob, SessionRecord};
use crate::store::{KvStore, MemoryKv};

/// Memory store that counts writes.
#[derive(Default)]
struct CountingKv {
    inner: MemoryKv,
    puts: AtomicUsize,
}

#[async_trait]
impl KvStore for CountingKv {
    async fn scan(&self, prefix: &str, after: Option<&str>, limit: usize) -> anyhow::Result<Vec<String>> {
        self.inner.scan(prefix, after, limit).await
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, value).await
    }

    async fn compare_and_put(&self, key: &str, expected: &[u8], value: Vec<u8>) -> anyhow::Result<bool> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.compare_and_put(key, expected, value).await
    }

    async fn delete(&self, key: &str) -> anyhow::Result<bool> {
        self.inner.delete(key).await
    }
}

struct Fixture {
    kv: Arc<CountingKv>,
    sessions: SessionStore,
    tracker: ExpiryTracker,
}

fn fixture(page_size: usize) -> Fixture {
    let kv = Arc::new(CountingKv::default());
    let sessions = SessionStore::new(kv.clone(), Arc::new(ManualClock::new(1_000)));
    let tracker = ExpiryTracker::new(sessions.clone(), Arc::new(OAuthTokenDecoder), page_size);
    Fixture { kv, sessions, tracker }
}

fn blob_expiring(at: u64) -> SessionBlob {
    SessionBlob::new(format!(r#"{{"tokenSet":{{"expires_at":{at}}}}}"#))
}

async fn seed(f: &Fixture, n: usize, broken: Option<usize>) -> anyhow::Result<()> {
    for i in 0..n {
        let did = Did::parse(&format!("did:plc:user{i:03}"))?;
        let blob = if Some(i) == broken {
            SessionBlob::new(r#"{"tokenSet":{"access_token":"opaque"}}"#)
        } else {
            blob_expiring(10_000 + i as u64)
        };
        f.sessions.put(&did, blob).await?;
    }
    Ok(())
}

#[tokio::test]
async fn first_pass_fills_expiry_for_every_row() -> anyhow::Result<()> {
    let f = fixture(3);
    seed(&f, 7, None).await?;

    let report = f.tracker.recompute().await?;
    assert_eq!(report.scanned, 7);
    assert_eq!(report.updated, 7);
    assert!(report.failed.is_empty());

    let record = f.sessions.get(&Did::parse("did:plc:user004")?).await?;
    assert_eq!(record.and_then(|r| r.expires_at), Some(10_004));
    Ok(())
}

#[tokio::test]
async fn second_pass_without_changes_writes_nothing() -> anyhow::Result<()> {
    let f = fixture(2);
    seed(&f, 5, None).await?;
    f.tracker.recompute().await?;

    let before = f.kv.puts.load(Ordering::SeqCst);
    let report = f.tracker.recompute().await?;
    assert_eq!(report.updated, 0);
    assert_eq!(f.kv.puts.load(Ordering::SeqCst), before);
    Ok(())
}

#[tokio::test]
async fn rotated_blob_is_picked_up_again() -> anyhow::Result<()> {
    let f = fixture(10);
    seed(&f, 2, None).await?;
    f.tracker.recompute().await?;

    let did = Did::parse("did:plc:user001")?;
    f.sessions.put(&did, blob_expiring(20_000)).await?;
    let report = f.tracker.recompute().await?;

    assert_eq!(report.updated, 1);
    assert_eq!(f.sessions.get(&did).await?.and_then(|r| r.expires_at), Some(20_000));
    Ok(())
}

#[tokio::test]
async fn undecodable_row_is_isolated() -> anyhow::Result<()> {
    let f = fixture(2);
    seed(&f, 6, Some(3)).await?;

    let report = f.tracker.recompute().await?;
    assert_eq!(report.scanned, 6);
    assert_eq!(report.updated, 5);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "session:did:plc:user003");

    for i in [0, 1, 2, 4, 5] {
        let record = f.sessions.get(&Did::parse(&format!("did:plc:user{i:03}"))?).await?;
        assert_eq!(record.and_then(|r| r.expires_at), Some(10_000 + i));
    }
    Ok(())
}

#[tokio::test]
async fn corrupt_row_is_reported_not_fatal() -> anyhow::Result<()> {
    let f = fixture(10);
    seed(&f, 2, None).await?;
    f.kv.put("session:did:plc:broken", b"{".to_vec()).await?;

    let report = f.tracker.recompute().await?;
    assert_eq!(report.updated, 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "session:did:plc:broken");
    Ok(())
}

#[tokio::test]
async fn pending_selects_rows_inside_lookahead() -> anyhow::Result<()> {
    let f = fixture(2);
    seed(&f, 5, Some(0)).await?;
    f.tracker.recompute().await?;

    // user001..user004 expire at 10_001..10_004; user000 has no expiry.
    let due: Vec<String> = f.tracker.pending(10_000, 2).await?.into_iter().map(String::from).collect();
    assert_eq!(due, vec!["did:plc:user001", "did:plc:user002"]);

    assert!(f.tracker.pending(0, 60).await?.is_empty());
    assert_eq!(f.tracker.pending(20_000, 0).await?.len(), 4);
    Ok(())
}

#[tokio::test]
async fn empty_store_sweeps_cleanly() -> anyhow::Result<()> {
    let f = fixture(5);
    assert_eq!(f.tracker.recompute().await?, SweepReport::default());
    Ok(())
}

/// Memory store that lands one pending write just before the next
/// conditional write, as a concurrent token rotation would.
#[derive(Default)]
struct RotatingKv {
    inner: MemoryKv,
    pending: Mutex<Option<(String, Vec<u8>)>>,
}

#[async_trait]
impl KvStore for RotatingKv {
    async fn scan(&self, prefix: &str, after: Option<&str>, limit: usize) -> anyhow::Result<Vec<String>> {
        self.inner.scan(prefix, after, limit).await
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()> {
        self.inner.put(key, value).await
    }

    async fn compare_and_put(&self, key: &str, expected: &[u8], value: Vec<u8>) -> anyhow::Result<bool> {
        let pending = self.pending.lock().take();
        if let Some((k, v)) = pending {
            self.inner.put(&k, v).await?;
        }
        self.inner.compare_and_put(key, expected, value).await
    }

    async fn delete(&self, key: &str) -> anyhow::Result<bool> {
        self.inner.delete(key).await
    }
}

#[tokio::test]
async fn sweep_never_reverts_a_concurrent_rotation() -> anyhow::Result<()> {
    let kv = Arc::new(RotatingKv::default());
    let clock = Arc::new(ManualClock::new(1_000));
    let sessions = SessionStore::new(kv.clone(), clock);
    let tracker = ExpiryTracker::new(sessions.clone(), Arc::new(OAuthTokenDecoder), 10);
    let did = Did::parse("did:plc:alice")?;

    sessions
        .put(&did, SessionBlob::new(r#"{"tokenSet":{"expires_at":5000,"refresh_token":"OLD"}}"#))
        .await?;
    let rotated = SessionBlob::new(r#"{"tokenSet":{"expires_at":9000,"refresh_token":"NEW"}}"#);
    let rotated_row = SessionRecord {
        did: did.clone(),
        blob: rotated.clone(),
        created_at: 1_000,
        updated_at: 1_060,
        expires_at: None,
    };
    *kv.pending.lock() = Some((SessionStore::key(&did), serde_json::to_vec(&rotated_row)?));

    let report = tracker.recompute().await?;
    assert_eq!(report.updated, 0);
    assert!(report.failed.is_empty());
    assert_eq!(sessions.get(&did).await?, Some(rotated_row));

    // The next pass derives the expiry from the rotated blob.
    let report = tracker.recompute().await?;
    assert_eq!(report.updated, 1);
    let record = sessions.get(&did).await?;
    assert_eq!(record.as_ref().map(|r| r.blob.clone()), Some(rotated));
    assert_eq!(record.and_then(|r| r.expires_at), Some(9000));
    Ok(())
}
