// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent acquisition: turn a DID into an authenticated handle, retrying
//! restoration through transient unavailability.
//!
//! Agents are never cached. Every acquisition restores fresh from the
//! provider, so concurrent acquisitions for one DID run independently.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::did::Did;
use crate::provider::IdentityProvider;
use crate::session::decode::token_set;
use crate::session::Session;

/// Authenticated handle for one DID, owned by the caller for one operation.
///
/// This is the seam provider RPC clients attach to: [`Agent::authorize`]
/// stamps the restored access token onto an outgoing request.
#[derive(Debug, Clone)]
pub struct Agent {
    session: Session,
}

impl Agent {
    /// The OAuth access token carried by the restored session, if any.
    pub fn access_token(&self) -> Option<String> {
        let value: Value = serde_json::from_str(self.session.blob.as_str()).ok()?;
        token_set(&value)?.get("access_token")?.as_str().map(str::to_owned)
    }

    /// Attach `Authorization: Bearer <access token>` to `request`.
    ///
    /// Sessions without an access token leave the request unchanged.
    pub fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.access_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    pub fn did(&self) -> &Did {
        &self.session.did
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }
}

/// Terminal acquisition failure, reported to the caller.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("agent unavailable for {did} after {attempts} attempts{}", cause_suffix(.last_error))]
    Unavailable { did: Did, attempts: u32, last_error: Option<String> },
}

impl AgentError {
    pub fn did(&self) -> &Did {
        match self {
            Self::Unavailable { did, .. } => did,
        }
    }
}

fn cause_suffix(last_error: &Option<String>) -> String {
    last_error.as_deref().map(|e| format!(": {e}")).unwrap_or_default()
}

/// Fixed-interval retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 5, backoff: Duration::from_secs(1) }
    }
}

pub struct AgentFactory {
    provider: Arc<dyn IdentityProvider>,
    retry: RetryPolicy,
}

impl AgentFactory {
    pub fn new(provider: Arc<dyn IdentityProvider>, retry: RetryPolicy) -> Self {
        Self { provider, retry }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Restore a session for `did` and wrap it in an [`Agent`].
    ///
    /// Absent sessions and provider errors both count as a failed attempt.
    /// The backoff sleep happens between attempts only, so the budget is
    /// `(max_attempts - 1) * backoff` plus provider time. There is no overall
    /// deadline; callers needing one race this future against their own.
    pub async fn acquire(&self, did: &Did) -> Result<Agent, AgentError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match self.provider.restore(did).await {
                Ok(Some(session)) => return Ok(Agent { session }),
                Ok(None) => {
                    tracing::debug!(did = %did, attempt, "session not available yet");
                    last_error = None;
                }
                Err(e) => {
                    tracing::debug!(did = %did, attempt, err = %e, "session restore failed");
                    last_error = Some(format!("{e:#}"));
                }
            }
            if attempt < max_attempts {
                tokio::time::sleep(self.retry.backoff).await;
            }
        }

        // Callers own the terminal failure and log it with their context.
        tracing::debug!(did = %did, attempts = max_attempts, "agent unavailable");
        Err(AgentError::Unavailable { did: did.clone(), attempts: max_attempts, last_error })
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
