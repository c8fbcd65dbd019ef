// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Decentralized identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Upper bound on identifier length accepted from the outside world.
const MAX_DID_LEN: usize = 2048;

/// A syntactically valid `did:<method>:<id>` identifier.
///
/// Only the shape is checked; whether the identifier resolves is the identity
/// provider's concern.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did(String);

impl Did {
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        if s.len() > MAX_DID_LEN {
            anyhow::bail!("did too long ({} bytes)", s.len());
        }
        let rest = s.strip_prefix("did:").ok_or_else(|| anyhow::anyhow!("missing did: prefix: {s}"))?;
        let (method, id) =
            rest.split_once(':').ok_or_else(|| anyhow::anyhow!("missing method-specific id: {s}"))?;

        if method.is_empty() || !method.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        {
            anyhow::bail!("invalid did method: {s}");
        }
        if id.is_empty() || id.ends_with(':') || id.ends_with('%') {
            anyhow::bail!("invalid method-specific id: {s}");
        }
        if !id.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b':' | b'%' | b'-'))
        {
            anyhow::bail!("invalid character in did: {s}");
        }
        Ok(Self(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The method segment (`plc` in `did:plc:abc`).
    pub fn method(&self) -> &str {
        self.0.split(':').nth(1).unwrap_or_default()
    }
}

impl FromStr for Did {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Did {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.0
    }
}

impl AsRef<str> for Did {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[path = "did_tests.rs"]
mod tests;
