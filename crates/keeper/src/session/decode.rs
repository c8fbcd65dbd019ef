// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provider-specific token expiry decoding.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;

use crate::session::SessionBlob;

/// Extracts the provider token expiry (epoch seconds) from an opaque blob.
pub trait TokenDecoder: Send + Sync + 'static {
    fn expires_at(&self, blob: &SessionBlob) -> anyhow::Result<u64>;
}

/// Decodes the session shape persisted by the OAuth client.
///
/// Reads `tokenSet.expires_at` (RFC 3339 or epoch seconds), falling back to
/// the `exp` claim of `tokenSet.access_token`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OAuthTokenDecoder;

impl TokenDecoder for OAuthTokenDecoder {
    fn expires_at(&self, blob: &SessionBlob) -> anyhow::Result<u64> {
        let value: Value = serde_json::from_str(blob.as_str())?;
        let token_set = token_set(&value)
            .ok_or_else(|| anyhow::anyhow!("session blob has no token set"))?;

        if let Some(raw) = token_set.get("expires_at").filter(|v| !v.is_null()) {
            return parse_timestamp(raw);
        }

        let access_token = token_set
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("token set has neither expires_at nor access_token"))?;
        jwt_exp(access_token)
    }
}

/// The token set object, under either casing the client has used.
pub fn token_set(value: &Value) -> Option<&Value> {
    value.get("tokenSet").or_else(|| value.get("token_set")).filter(|v| v.is_object())
}

fn parse_timestamp(raw: &Value) -> anyhow::Result<u64> {
    match raw {
        Value::Number(n) => {
            n.as_u64().ok_or_else(|| anyhow::anyhow!("expires_at is not a positive integer: {n}"))
        }
        Value::String(s) => {
            let parsed = chrono::DateTime::parse_from_rfc3339(s)
                .map_err(|e| anyhow::anyhow!("invalid expires_at {s:?}: {e}"))?;
            u64::try_from(parsed.timestamp())
                .map_err(|_| anyhow::anyhow!("expires_at before epoch: {s}"))
        }
        other => anyhow::bail!("unsupported expires_at: {other}"),
    }
}

/// Read the `exp` claim from a JWT without verifying it.
pub fn jwt_exp(token: &str) -> anyhow::Result<u64> {
    let mut parts = token.split('.');
    let payload = match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_)) => payload,
        _ => anyhow::bail!("access token is not a JWT"),
    };
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    let claims: Value = serde_json::from_slice(&bytes)?;
    claims
        .get("exp")
        .and_then(Value::as_u64)
        .ok_or_else(|| anyhow::anyhow!("access token has no exp claim"))
}

#[cfg(test)]
#[path = "decode_tests.rs"]
mod tests;
