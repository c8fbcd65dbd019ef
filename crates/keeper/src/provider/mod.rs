// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity provider seam.

pub mod oauth;

use async_trait::async_trait;

use crate::did::Did;
use crate::session::Session;

pub use oauth::OAuthProvider;

/// Restores stored sessions into usable credentials.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Restore the session for `did`.
    ///
    /// `Ok(None)` means the session is not (yet) available. Implementations
    /// may rotate and persist token material as a side effect. Every error is
    /// treated as transient by callers.
    async fn restore(&self, did: &Did) -> anyhow::Result<Option<Session>>;
}
