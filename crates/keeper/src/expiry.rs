// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session expiry bookkeeping.
//!
//! Decodes the provider token expiry out of every stored session and keeps
//! the `expires_at` column in step with it, so staleness queries never need
//! to look inside a blob.

use std::sync::Arc;

use serde::Serialize;

use crate::did::Did;
use crate::session::decode::TokenDecoder;
use crate::session::SessionStore;

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub updated: usize,
    /// `(row key, error)` for every row that could not be decoded or written.
    pub failed: Vec<(String, String)>,
}

pub struct ExpiryTracker {
    sessions: SessionStore,
    decoder: Arc<dyn TokenDecoder>,
    page_size: usize,
}

impl ExpiryTracker {
    pub fn new(sessions: SessionStore, decoder: Arc<dyn TokenDecoder>, page_size: usize) -> Self {
        Self { sessions, decoder, page_size: page_size.max(1) }
    }

    /// Bring every session's `expires_at` in line with its token.
    ///
    /// Only rows whose stored value differs from the decoded one are written,
    /// so a second pass over unchanged data writes nothing. A row that fails
    /// is recorded and skipped.
    pub async fn recompute(&self) -> anyhow::Result<SweepReport> {
        let mut report = SweepReport::default();
        let mut cursor: Option<String> = None;

        loop {
            let page = self.sessions.page(cursor.as_deref(), self.page_size).await?;
            report.scanned += page.records.len() + page.corrupt.len();

            for (key, err) in page.corrupt {
                tracing::warn!(key = %key, err = %err, "unreadable session row");
                report.failed.push((key, err));
            }

            for record in page.records {
                let expires_at = match self.decoder.expires_at(&record.blob) {
                    Ok(ts) => ts,
                    Err(e) => {
                        tracing::warn!(did = %record.did, err = %e, "cannot decode session expiry");
                        report.failed.push((SessionStore::key(&record.did), e.to_string()));
                        continue;
                    }
                };
                if record.expires_at == Some(expires_at) {
                    continue;
                }
                match self.sessions.set_expires_at(&record.did, &record.blob, expires_at).await {
                    Ok(true) => report.updated += 1,
                    // Deleted or rewritten mid-sweep; the next pass sees the new blob.
                    Ok(false) => {
                        tracing::debug!(did = %record.did, "session changed during sweep, skipped");
                    }
                    Err(e) => {
                        tracing::warn!(did = %record.did, err = %e, "cannot store session expiry");
                        report.failed.push((SessionStore::key(&record.did), e.to_string()));
                    }
                }
            }

            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        tracing::info!(
            scanned = report.scanned,
            updated = report.updated,
            failed = report.failed.len(),
            "expiry sweep complete"
        );
        Ok(report)
    }

    /// DIDs whose session expires at or before `now + lookahead_secs`.
    ///
    /// Rows without a computed expiry are not included.
    pub async fn pending(&self, now: u64, lookahead_secs: u64) -> anyhow::Result<Vec<Did>> {
        let horizon = now.saturating_add(lookahead_secs);
        let mut due = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self.sessions.page(cursor.as_deref(), self.page_size).await?;
            due.extend(
                page.records
                    .into_iter()
                    .filter(|r| r.expires_at.is_some_and(|ts| ts <= horizon))
                    .map(|r| r.did),
            );
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(due)
    }
}

#[cfg(test)]
#[path = "expiry_tests.rs"]
mod tests;
