// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Refresh marker registry: `<namespace>:<did>` keys recording which DIDs
//! have a background upkeep obligation.

use std::sync::Arc;

use crate::did::Did;
use crate::store::{KeyPager, KvStore};

#[derive(Clone)]
pub struct RefreshMarkers {
    kv: Arc<dyn KvStore>,
    prefix: String,
    page_size: usize,
}

impl RefreshMarkers {
    pub fn new(kv: Arc<dyn KvStore>, namespace: &str, page_size: usize) -> Self {
        Self { kv, prefix: format!("{namespace}:"), page_size }
    }

    pub fn key(&self, did: &Did) -> String {
        format!("{}{did}", self.prefix)
    }

    /// Record an upkeep obligation. Returns `false` if one already existed.
    pub async fn register(&self, did: &Did) -> anyhow::Result<bool> {
        let key = self.key(did);
        if self.kv.get(&key).await?.is_some() {
            return Ok(false);
        }
        self.kv.put(&key, did.as_str().as_bytes().to_vec()).await?;
        Ok(true)
    }

    pub async fn contains(&self, did: &Did) -> anyhow::Result<bool> {
        Ok(self.kv.get(&self.key(did)).await?.is_some())
    }

    /// Drop a marker. Marker lifecycle is owned by the account flows, not upkeep.
    pub async fn remove(&self, did: &Did) -> anyhow::Result<bool> {
        self.kv.delete(&self.key(did)).await
    }

    /// Every registered DID, in key order.
    pub async fn list(&self) -> anyhow::Result<Vec<Did>> {
        let mut pager = KeyPager::new(self.kv.as_ref(), &self.prefix, self.page_size);
        let mut dids = Vec::new();
        while let Some(keys) = pager.next_page().await? {
            for key in keys {
                let suffix = key.strip_prefix(&self.prefix).unwrap_or_default();
                match Did::parse(suffix) {
                    Ok(did) => dids.push(did),
                    Err(e) => tracing::warn!(key = %key, err = %e, "skipping malformed refresh marker"),
                }
            }
        }
        Ok(dids)
    }
}

#[cfg(test)]
#[path = "markers_tests.rs"]
mod tests;
