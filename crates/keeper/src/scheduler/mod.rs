// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background session upkeep.
//!
//! At startup the scheduler sweeps expiries, refreshes sessions that are
//! about to lapse, then gives every DID in the marker registry its own
//! recurring upkeep timer. Start times are staggered by enumeration index so
//! the identity provider never sees the whole population at once. Timers run
//! until cancelled through the [`SchedulerHandle`] or process shutdown.

pub mod timers;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::agent::AgentFactory;
use crate::clock::Clock;
use crate::did::Did;
use crate::expiry::ExpiryTracker;
use crate::markers::RefreshMarkers;
use crate::scheduler::timers::{spawn_logged, TickFn, Timers};

/// Timing knobs for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Start offset added per enumeration index.
    pub stagger: Duration,
    /// Period of each DID's recurring upkeep.
    pub period: Duration,
    /// Sessions expiring within this window are refreshed at startup.
    pub lookahead: Duration,
    /// Re-run the expiry sweep on this interval; `None` sweeps at startup only.
    pub sweep_interval: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            stagger: Duration::from_secs(5),
            period: Duration::from_secs(5 * 60),
            lookahead: Duration::from_secs(10 * 60),
            sweep_interval: None,
        }
    }
}

/// Start delay for the DID at `index` in enumeration order.
pub fn stagger_delay(stagger: Duration, index: usize) -> Duration {
    stagger.saturating_mul(u32::try_from(index).unwrap_or(u32::MAX))
}

pub struct RefreshScheduler {
    factory: Arc<AgentFactory>,
    tracker: Arc<ExpiryTracker>,
    markers: RefreshMarkers,
    timers: Arc<dyn Timers>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl RefreshScheduler {
    pub fn new(
        factory: Arc<AgentFactory>,
        tracker: Arc<ExpiryTracker>,
        markers: RefreshMarkers,
        timers: Arc<dyn Timers>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self { factory, tracker, markers, timers, clock, config }
    }

    /// Run the startup sequence and hand back the handle owning every timer.
    ///
    /// The expiry sweep completes before anything is scheduled. Store errors
    /// while enumerating are returned; per-DID failures are only logged.
    pub async fn start(self) -> anyhow::Result<SchedulerHandle> {
        let report = self.tracker.recompute().await?;
        if !report.failed.is_empty() {
            tracing::warn!(failed = report.failed.len(), "startup expiry sweep skipped rows");
        }

        let due = self.tracker.pending(self.clock.now(), self.config.lookahead.as_secs()).await?;
        for did in due {
            let factory = Arc::clone(&self.factory);
            spawn_logged("expiring session refresh", did.to_string(), async move {
                factory.acquire(&did).await?;
                Ok(())
            });
        }

        let handle = SchedulerHandle::new(Arc::clone(&self.factory), self.timers, self.config.period);

        let dids = self.markers.list().await?;
        for (index, did) in dids.into_iter().enumerate() {
            handle.track(did, stagger_delay(self.config.stagger, index));
        }

        if let Some(interval) = self.config.sweep_interval {
            handle.spawn_sweeps(self.tracker, interval);
        }

        tracing::info!(tracked = handle.len(), "scheduler started");
        Ok(handle)
    }
}

/// Owner of all upkeep timers, keyed by DID.
///
/// Cloning shares the same registry.
#[derive(Clone)]
pub struct SchedulerHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    factory: Arc<AgentFactory>,
    timers: Arc<dyn Timers>,
    period: Duration,
    root: CancellationToken,
    tracked: Mutex<HashMap<Did, CancellationToken>>,
}

impl SchedulerHandle {
    pub fn new(factory: Arc<AgentFactory>, timers: Arc<dyn Timers>, period: Duration) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                factory,
                timers,
                period,
                root: CancellationToken::new(),
                tracked: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Start recurring upkeep for `did` after `start_delay`.
    ///
    /// Returns `false` if the DID is already tracked or the handle is shut down.
    pub fn track(&self, did: Did, start_delay: Duration) -> bool {
        let token = {
            let mut tracked = self.inner.tracked.lock();
            if self.inner.root.is_cancelled() || tracked.contains_key(&did) {
                return false;
            }
            let token = self.inner.root.child_token();
            tracked.insert(did.clone(), token.clone());
            token
        };

        let tick = upkeep_tick(Arc::clone(&self.inner.factory), did.clone());
        let timers = Arc::clone(&self.inner.timers);
        let period = self.inner.period;
        let every_token = token.clone();
        self.inner.timers.after(
            start_delay,
            token,
            Box::pin(async move {
                timers.every(period, every_token, tick);
            }),
        );

        tracing::info!(did = %did, delay_ms = start_delay.as_millis() as u64, "upkeep registered");
        true
    }

    /// Stop upkeep for `did`. Returns `false` if it was not tracked.
    pub fn cancel(&self, did: &Did) -> bool {
        match self.inner.tracked.lock().remove(did) {
            Some(token) => {
                token.cancel();
                tracing::info!(did = %did, "upkeep cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_tracked(&self, did: &Did) -> bool {
        self.inner.tracked.lock().contains_key(did)
    }

    /// Tracked DIDs in sorted order.
    pub fn tracked(&self) -> Vec<Did> {
        let mut dids: Vec<Did> = self.inner.tracked.lock().keys().cloned().collect();
        dids.sort();
        dids
    }

    pub fn len(&self) -> usize {
        self.inner.tracked.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel every timer. Further `track` calls are refused.
    pub fn shutdown(&self) {
        self.inner.root.cancel();
        self.inner.tracked.lock().clear();
    }

    /// Re-run the expiry sweep every `interval` until shutdown.
    pub fn spawn_sweeps(&self, tracker: Arc<ExpiryTracker>, interval: Duration) {
        let tick: TickFn = Arc::new(move || -> BoxFuture<'static, ()> {
            let tracker = Arc::clone(&tracker);
            Box::pin(async move {
                if let Err(e) = tracker.recompute().await {
                    tracing::warn!(err = %e, "periodic expiry sweep failed");
                }
            })
        });
        self.inner.timers.every(interval, self.inner.root.child_token(), tick);
    }
}

/// One upkeep tick: acquire an agent and drop it. Failure ends at the log line.
fn upkeep_tick(factory: Arc<AgentFactory>, did: Did) -> TickFn {
    Arc::new(move || -> BoxFuture<'static, ()> {
        let factory = Arc::clone(&factory);
        let did = did.clone();
        Box::pin(async move {
            match factory.acquire(&did).await {
                Ok(_) => tracing::info!(did = %did, "agent refreshed"),
                Err(e) => tracing::warn!(did = %did, err = %e, "upkeep tick failed"),
            }
        })
    })
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
