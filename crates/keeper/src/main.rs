// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use didkeep::config::KeeperConfig;

#[tokio::main]
async fn main() {
    let config = KeeperConfig::parse();
    didkeep::init_tracing(&config);

    if let Err(e) = config.validate() {
        error!("invalid configuration: {e:#}");
        std::process::exit(2);
    }

    if let Err(e) = didkeep::run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
