// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the admin API.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::did::Did;
use crate::error::ErrorCode;
use crate::state::KeeperState;

// -- Response types -----------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub tracked: usize,
}

#[derive(Debug, Serialize)]
pub struct TrackedResponse {
    pub dids: Vec<Did>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub did: Did,
    /// A new marker was written.
    pub registered: bool,
    /// Upkeep is active for the DID after this call.
    pub tracked: bool,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<KeeperState>>) -> impl IntoResponse {
    Json(HealthResponse { status: "running".to_owned(), tracked: s.handle.len() })
}

/// `GET /api/v1/refresh`: DIDs with an active upkeep timer.
pub async fn list_tracked(State(s): State<Arc<KeeperState>>) -> impl IntoResponse {
    Json(TrackedResponse { dids: s.handle.tracked() })
}

/// `POST /api/v1/refresh/{did}`: register a DID for background upkeep.
pub async fn register_refresh(
    State(s): State<Arc<KeeperState>>,
    Path(raw): Path<String>,
) -> impl IntoResponse {
    let did = match Did::parse(&raw) {
        Ok(did) => did,
        Err(e) => return ErrorCode::BadRequest.to_http_response(e.to_string()).into_response(),
    };

    let registered = match s.markers.register(&did).await {
        Ok(registered) => registered,
        Err(e) => {
            tracing::warn!(did = %did, err = %e, "failed to write refresh marker");
            return ErrorCode::Internal.to_http_response(format!("{e:#}")).into_response();
        }
    };

    // Already-tracked DIDs keep their existing timer.
    s.handle.track(did.clone(), Duration::ZERO);
    let tracked = s.handle.is_tracked(&did);

    Json(RegisterResponse { did, registered, tracked }).into_response()
}

/// `POST /api/v1/expiry/sweep`: recompute every session's expiry now.
pub async fn sweep(State(s): State<Arc<KeeperState>>) -> impl IntoResponse {
    match s.tracker.recompute().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            tracing::warn!(err = %e, "on-demand expiry sweep failed");
            ErrorCode::Internal.to_http_response(format!("{e:#}")).into_response()
        }
    }
}
