// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth-backed identity provider: restores sessions from the session store
//! and rotates them with a refresh-token grant when they near expiry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::Clock;
use crate::did::Did;
use crate::provider::IdentityProvider;
use crate::session::decode::{token_set, TokenDecoder};
use crate::session::{Session, SessionBlob, SessionStore};

/// Standard OAuth2 token response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

pub struct OAuthProvider {
    sessions: SessionStore,
    decoder: Arc<dyn TokenDecoder>,
    clock: Arc<dyn Clock>,
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    refresh_margin_secs: u64,
}

impl OAuthProvider {
    pub fn new(
        sessions: SessionStore,
        decoder: Arc<dyn TokenDecoder>,
        clock: Arc<dyn Clock>,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        refresh_margin: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            sessions,
            decoder,
            clock,
            http,
            token_url: token_url.into(),
            client_id: client_id.into(),
            refresh_margin_secs: refresh_margin.as_secs(),
        })
    }

    /// Perform a single refresh-token grant.
    pub async fn do_refresh(&self, refresh_token: &str) -> anyhow::Result<TokenResponse> {
        let resp = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("refresh failed ({status}): {text}");
        }

        let token: TokenResponse = resp.json().await?;
        Ok(token)
    }

    fn is_due(&self, did: &Did, blob: &SessionBlob) -> bool {
        match self.decoder.expires_at(blob) {
            Ok(expires_at) => expires_at <= self.clock.now().saturating_add(self.refresh_margin_secs),
            Err(e) => {
                tracing::debug!(did = %did, err = %e, "token expiry unreadable, refreshing");
                true
            }
        }
    }

    /// Fold a token response into the stored token set.
    fn merge(&self, mut value: Value, token: TokenResponse) -> anyhow::Result<SessionBlob> {
        let expires_at = (token.expires_in > 0)
            .then(|| self.clock.now().saturating_add(token.expires_in))
            .and_then(|secs| DateTime::<Utc>::from_timestamp(i64::try_from(secs).ok()?, 0))
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true));

        let key = if value.get("token_set").is_some() { "token_set" } else { "tokenSet" };
        let set = value
            .get_mut(key)
            .and_then(Value::as_object_mut)
            .ok_or_else(|| anyhow::anyhow!("session blob has no token set"))?;
        set.insert("access_token".to_owned(), Value::String(token.access_token));
        if let Some(rt) = token.refresh_token {
            set.insert("refresh_token".to_owned(), Value::String(rt));
        }
        if let Some(tt) = token.token_type {
            set.insert("token_type".to_owned(), Value::String(tt));
        }
        set.insert("expires_at".to_owned(), expires_at.map(Value::String).unwrap_or(Value::Null));

        Ok(SessionBlob::new(serde_json::to_string(&value)?))
    }
}

#[async_trait]
impl IdentityProvider for OAuthProvider {
    async fn restore(&self, did: &Did) -> anyhow::Result<Option<Session>> {
        let Some(record) = self.sessions.get(did).await? else {
            return Ok(None);
        };

        let value: Value = serde_json::from_str(record.blob.as_str())?;
        let set = token_set(&value).ok_or_else(|| anyhow::anyhow!("session blob has no token set"))?;
        if let Some(sub) = set.get("sub").and_then(Value::as_str) {
            if sub != did.as_str() {
                anyhow::bail!("session subject {sub} does not match {did}");
            }
        }

        if !self.is_due(did, &record.blob) {
            return Ok(Some(record.session()));
        }

        let Some(refresh_token) = set.get("refresh_token").and_then(Value::as_str) else {
            anyhow::bail!("session for {did} is expiring and has no refresh token");
        };
        let token = self.do_refresh(refresh_token).await?;
        let blob = self.merge(value, token)?;
        self.sessions.put(did, blob.clone()).await?;
        tracing::info!(did = %did, "session refreshed");

        Ok(Some(Session { did: did.clone(), blob }))
    }
}

#[cfg(test)]
#[path = "oauth_tests.rs"]
mod tests;
