// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted sessions: one opaque credential blob per DID plus bookkeeping.

pub mod decode;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::did::Did;
use crate::store::KvStore;

/// Key prefix for session rows.
pub const SESSION_PREFIX: &str = "session:";

/// Provider-defined serialized credential material.
///
/// The core never looks inside; decoding is delegated to a
/// [`decode::TokenDecoder`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionBlob(String);

impl SessionBlob {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Blobs hold bearer and refresh tokens.
impl fmt::Debug for SessionBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionBlob({} bytes)", self.0.len())
    }
}

/// A restored session bound to its DID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub did: Did,
    pub blob: SessionBlob,
}

/// A stored session row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub did: Did,
    pub blob: SessionBlob,
    /// Epoch seconds.
    pub created_at: u64,
    /// Epoch seconds.
    pub updated_at: u64,
    /// Derived from the blob by the expiry tracker; `None` until computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl SessionRecord {
    pub fn session(&self) -> Session {
        Session { did: self.did.clone(), blob: self.blob.clone() }
    }
}

/// One page of session rows.
///
/// Rows that fail to parse are surfaced individually so one corrupt row
/// never hides the rest of the page.
#[derive(Debug, Default)]
pub struct SessionPage {
    pub records: Vec<SessionRecord>,
    pub corrupt: Vec<(String, String)>,
    /// Cursor for the next call, `None` when exhausted.
    pub next: Option<String>,
}

/// Typed session rows over a [`KvStore`].
#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KvStore>, clock: Arc<dyn Clock>) -> Self {
        Self { kv, clock }
    }

    pub fn key(did: &Did) -> String {
        format!("{SESSION_PREFIX}{did}")
    }

    pub async fn get(&self, did: &Did) -> anyhow::Result<Option<SessionRecord>> {
        let Some(bytes) = self.kv.get(&Self::key(did)).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Write (or overwrite) the session for `did`.
    ///
    /// Keeps `created_at` from any prior row. A changed blob invalidates the
    /// derived `expires_at`. Store errors propagate; an undecodable prior row
    /// is replaced outright.
    pub async fn put(&self, did: &Did, blob: SessionBlob) -> anyhow::Result<SessionRecord> {
        let now = self.clock.now();
        let key = Self::key(did);
        let prior = match self.kv.get(&key).await? {
            Some(bytes) => match serde_json::from_slice::<SessionRecord>(&bytes) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(did = %did, err = %e, "replacing unreadable session row");
                    None
                }
            },
            None => None,
        };
        let record = match prior {
            Some(prior) => SessionRecord {
                did: did.clone(),
                expires_at: if prior.blob == blob { prior.expires_at } else { None },
                blob,
                created_at: prior.created_at,
                updated_at: now,
            },
            None => SessionRecord {
                did: did.clone(),
                blob,
                created_at: now,
                updated_at: now,
                expires_at: None,
            },
        };
        self.kv.put(&key, serde_json::to_vec(&record)?).await?;
        Ok(record)
    }

    /// Record `expires_at` as derived from `decoded`.
    ///
    /// Only the bookkeeping field changes, and only while the stored blob is
    /// still `decoded`. Returns `false` without writing if the row is gone or
    /// its blob was rewritten since it was read.
    pub async fn set_expires_at(
        &self,
        did: &Did,
        decoded: &SessionBlob,
        expires_at: u64,
    ) -> anyhow::Result<bool> {
        let key = Self::key(did);
        let Some(current) = self.kv.get(&key).await? else {
            return Ok(false);
        };
        let mut record: SessionRecord = serde_json::from_slice(&current)?;
        if record.blob != *decoded {
            return Ok(false);
        }
        record.expires_at = Some(expires_at);
        self.kv.compare_and_put(&key, &current, serde_json::to_vec(&record)?).await
    }

    pub async fn delete(&self, did: &Did) -> anyhow::Result<bool> {
        self.kv.delete(&Self::key(did)).await
    }

    /// Fetch up to `limit` rows after the `after` cursor.
    pub async fn page(&self, after: Option<&str>, limit: usize) -> anyhow::Result<SessionPage> {
        let limit = limit.max(1);
        let keys = self.kv.scan(SESSION_PREFIX, after, limit).await?;
        let next = if keys.len() < limit { None } else { keys.last().cloned() };

        let mut page = SessionPage { next, ..SessionPage::default() };
        for key in keys {
            // Deleted between scan and read.
            let Some(bytes) = self.kv.get(&key).await? else {
                continue;
            };
            match serde_json::from_slice::<SessionRecord>(&bytes) {
                Ok(record) => page.records.push(record),
                Err(e) => page.corrupt.push((key, e.to_string())),
            }
        }
        Ok(page)
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
