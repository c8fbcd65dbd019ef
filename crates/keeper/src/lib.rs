// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! didkeep: keeps DID sessions warm with staggered background refresh.

pub mod agent;
pub mod clock;
pub mod config;
pub mod did;
pub mod error;
pub mod expiry;
pub mod markers;
pub mod provider;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod store;
pub mod transport;

use std::sync::{Arc, Once};

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::agent::AgentFactory;
use crate::clock::{Clock, SystemClock};
use crate::config::KeeperConfig;
use crate::expiry::ExpiryTracker;
use crate::markers::RefreshMarkers;
use crate::provider::OAuthProvider;
use crate::scheduler::timers::TokioTimers;
use crate::scheduler::RefreshScheduler;
use crate::session::decode::{OAuthTokenDecoder, TokenDecoder};
use crate::session::SessionStore;
use crate::state::KeeperState;
use crate::store::{FsKv, KvStore};
use crate::transport::build_router;

static CRYPTO: Once = Once::new();

/// Install the rustls crypto provider (needed by reqwest even on plain HTTP).
pub fn ensure_crypto() {
    CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Initialize tracing from config.
///
/// Uses `try_init` so it's safe to call more than once.
pub fn init_tracing(config: &KeeperConfig) {
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// Run the keeper until SIGINT or SIGTERM.
pub async fn run(config: KeeperConfig) -> anyhow::Result<()> {
    ensure_crypto();

    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();
    let state_dir = config.resolved_state_dir();

    let kv: Arc<dyn KvStore> = Arc::new(FsKv::open(&state_dir).await?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let decoder: Arc<dyn TokenDecoder> = Arc::new(OAuthTokenDecoder);
    let sessions = SessionStore::new(Arc::clone(&kv), Arc::clone(&clock));
    let markers = RefreshMarkers::new(Arc::clone(&kv), &config.marker_namespace, config.page_size);
    let tracker = Arc::new(ExpiryTracker::new(sessions.clone(), Arc::clone(&decoder), config.page_size));

    let provider = OAuthProvider::new(
        sessions,
        decoder,
        Arc::clone(&clock),
        config.token_url.clone(),
        config.client_id.clone(),
        config.refresh_margin(),
    )?;
    let factory = Arc::new(AgentFactory::new(Arc::new(provider), config.retry_policy()));

    let handle = RefreshScheduler::new(
        factory,
        Arc::clone(&tracker),
        markers.clone(),
        Arc::new(TokioTimers),
        clock,
        config.scheduler_config(),
    )
    .start()
    .await?;

    spawn_signal_handler(shutdown.clone());

    let state = Arc::new(KeeperState::new(
        config.auth_token.clone(),
        handle.clone(),
        markers,
        tracker,
        shutdown.clone(),
    ));
    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(state_dir = %state_dir.display(), "didkeep listening on {addr}");

    let served =
        axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await;
    handle.shutdown();
    tracing::info!("upkeep stopped");
    served?;
    Ok(())
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                tracing::info!("received SIGTERM");
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                tracing::info!("received SIGINT");
            }
        }
        shutdown.cancel();
    });
}
