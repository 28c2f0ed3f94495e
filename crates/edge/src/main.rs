// SPDX-License-Identifier: MIT

use clap::Parser;
use tracing::error;

use bridge_edge::config::EdgeConfig;

#[tokio::main]
async fn main() {
    let config = EdgeConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone())),
        )
        .init();

    if let Err(e) = bridge_edge::run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
