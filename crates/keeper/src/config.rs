// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::agent::RetryPolicy;
use crate::scheduler::SchedulerConfig;

/// Configuration for the didkeep daemon.
#[derive(Debug, Clone, Parser)]
#[command(name = "didkeep", version, about = "Keeps DID sessions warm with staggered background refresh.")]
pub struct KeeperConfig {
    /// Host to bind the admin API on.
    #[arg(long, default_value = "127.0.0.1", env = "DIDKEEP_HOST")]
    pub host: String,

    /// Port for the admin API.
    #[arg(long, default_value_t = 9810, env = "DIDKEEP_PORT")]
    pub port: u16,

    /// Bearer token for admin API auth. If unset, auth is disabled.
    #[arg(long, env = "DIDKEEP_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Root directory of the session and marker store.
    #[arg(long, env = "DIDKEEP_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Identity provider token endpoint.
    #[arg(long, env = "DIDKEEP_TOKEN_URL")]
    pub token_url: String,

    /// OAuth client id sent with refresh grants.
    #[arg(long, env = "DIDKEEP_CLIENT_ID")]
    pub client_id: String,

    /// Key prefix of refresh markers (`<namespace>:<did>`).
    #[arg(long, default_value = "refresh", env = "DIDKEEP_MARKER_NAMESPACE")]
    pub marker_namespace: String,

    /// Agent acquisition attempts before giving up.
    #[arg(long, default_value_t = 5, env = "DIDKEEP_MAX_ATTEMPTS")]
    pub max_attempts: u32,

    /// Fixed backoff between acquisition attempts in milliseconds.
    #[arg(long, default_value_t = 1000, env = "DIDKEEP_RETRY_BACKOFF_MS")]
    pub retry_backoff_ms: u64,

    /// Start offset per enumeration index in milliseconds.
    #[arg(long, default_value_t = 5000, env = "DIDKEEP_STAGGER_MS")]
    pub stagger_ms: u64,

    /// Recurring upkeep period in milliseconds.
    #[arg(long, default_value_t = 300_000, env = "DIDKEEP_REFRESH_PERIOD_MS")]
    pub refresh_period_ms: u64,

    /// Sessions expiring within this many seconds are refreshed at startup.
    #[arg(long, default_value_t = 600, env = "DIDKEEP_EXPIRY_LOOKAHEAD_SECS")]
    pub expiry_lookahead_secs: u64,

    /// Tokens expiring within this many seconds are rotated on restore.
    #[arg(long, default_value_t = 300, env = "DIDKEEP_REFRESH_MARGIN_SECS")]
    pub refresh_margin_secs: u64,

    /// Periodic expiry sweep interval in milliseconds (0 = startup only).
    #[arg(long, default_value_t = 0, env = "DIDKEEP_EXPIRY_SWEEP_MS")]
    pub expiry_sweep_ms: u64,

    /// Page size for store enumeration.
    #[arg(long, default_value_t = 100, env = "DIDKEEP_PAGE_SIZE")]
    pub page_size: usize,

    /// Log level (trace, debug, info, warn, error) or an `EnvFilter` directive.
    #[arg(long, default_value = "info", env = "DIDKEEP_LOG_LEVEL")]
    pub log_level: String,

    /// Log format (text or json).
    #[arg(long, default_value = "text", env = "DIDKEEP_LOG_FORMAT")]
    pub log_format: String,
}

impl KeeperConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_attempts == 0 {
            anyhow::bail!("--max-attempts must be at least 1");
        }
        if self.refresh_period_ms == 0 {
            anyhow::bail!("--refresh-period-ms must be greater than zero");
        }
        if self.page_size == 0 {
            anyhow::bail!("--page-size must be greater than zero");
        }
        if self.marker_namespace.is_empty() {
            anyhow::bail!("--marker-namespace must not be empty");
        }
        if self.token_url.is_empty() {
            anyhow::bail!("--token-url must not be empty");
        }
        if !matches!(self.log_format.as_str(), "text" | "json") {
            anyhow::bail!("unknown --log-format {:?} (expected text or json)", self.log_format);
        }
        Ok(())
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }

    pub fn refresh_period(&self) -> Duration {
        Duration::from_millis(self.refresh_period_ms)
    }

    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_secs)
    }

    pub fn expiry_sweep_interval(&self) -> Option<Duration> {
        (self.expiry_sweep_ms > 0).then(|| Duration::from_millis(self.expiry_sweep_ms))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy { max_attempts: self.max_attempts, backoff: self.retry_backoff() }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            stagger: self.stagger(),
            period: self.refresh_period(),
            lookahead: Duration::from_secs(self.expiry_lookahead_secs),
            sweep_interval: self.expiry_sweep_interval(),
        }
    }

    /// Resolve the store root.
    ///
    /// Uses `--state-dir` when given, then `$XDG_STATE_HOME/didkeep`,
    /// then `$HOME/.local/state/didkeep`.
    pub fn resolved_state_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.state_dir {
            return dir.clone();
        }
        if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
            return PathBuf::from(xdg).join("didkeep");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local/state/didkeep");
        }
        PathBuf::from(".didkeep")
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
