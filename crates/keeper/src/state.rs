// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::expiry::ExpiryTracker;
use crate::markers::RefreshMarkers;
use crate::scheduler::SchedulerHandle;

/// Shared state behind the admin API.
pub struct KeeperState {
    /// Bearer token for the admin API; `None` disables auth.
    pub auth_token: Option<String>,
    pub handle: SchedulerHandle,
    pub markers: RefreshMarkers,
    pub tracker: Arc<ExpiryTracker>,
    pub shutdown: CancellationToken,
}

impl KeeperState {
    pub fn new(
        auth_token: Option<String>,
        handle: SchedulerHandle,
        markers: RefreshMarkers,
        tracker: Arc<ExpiryTracker>,
        shutdown: CancellationToken,
    ) -> Self {
        Self { auth_token, handle, markers, tracker, shutdown }
    }
}
