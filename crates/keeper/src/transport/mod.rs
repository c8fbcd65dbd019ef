// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admin HTTP surface for the keeper.

pub mod auth;
pub mod http;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::KeeperState;

/// Build the axum `Router` with all admin routes.
pub fn build_router(state: Arc<KeeperState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        // Upkeep registry
        .route("/api/v1/refresh", get(http::list_tracked))
        .route("/api/v1/refresh/{did}", post(http::register_refresh))
        // Expiry bookkeeping
        .route("/api/v1/expiry/sweep", post(http::sweep))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
