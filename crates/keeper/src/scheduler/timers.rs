// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timer primitives for the refresh scheduler.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Produces one tick's work.
pub type TickFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Independent, cancellable timers.
///
/// A panicking task or tick must never reach another timer.
pub trait Timers: Send + Sync + 'static {
    /// Run `task` once after `delay`, unless cancelled first.
    fn after(&self, delay: Duration, cancel: CancellationToken, task: BoxFuture<'static, ()>);

    /// Run `tick` every `period` (first run one period from now) until cancelled.
    fn every(&self, period: Duration, cancel: CancellationToken, tick: TickFn);
}

/// Timers backed by tokio tasks.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTimers;

impl Timers for TokioTimers {
    fn after(&self, delay: Duration, cancel: CancellationToken, task: BoxFuture<'static, ()>) {
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => task.await,
            }
        });
    }

    fn every(&self, period: Duration, cancel: CancellationToken, tick: TickFn) {
        tokio::spawn(async move {
            let mut timer = tokio::time::interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = timer.tick() => {}
                }

                // Each tick runs in its own task so a panic ends that tick only.
                if let Err(e) = tokio::spawn(tick()).await {
                    tracing::warn!(err = %e, "timer tick aborted");
                }
            }
        });
    }
}

/// Submit `fut` as a background task whose only completion handler logs failure.
///
/// Errors stop here: they are logged and never returned to the submitter.
pub fn spawn_logged<F>(what: &'static str, subject: String, fut: F)
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        match fut.await {
            Ok(()) => tracing::debug!(subject = %subject, "{what} done"),
            Err(e) => tracing::warn!(subject = %subject, err = %e, "{what} failed"),
        }
    });
}

#[cfg(test)]
#[path = "timers_tests.rs"]
mod tests;
