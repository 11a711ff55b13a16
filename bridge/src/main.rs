// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use vsock_bridge::application::Application;
use vsock_bridge::configuration::{BridgeOptions, LogFormat};
use vsock_bridge::constants::DEFAULT_LOG_FILTER;
use vsock_bridge::forwarder::Forwarder;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
    );

    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            // this needs to be set to remove duplicated information in the log.
            .with_current_span(false)
            // ANSI color codes are noise once logs are shipped.
            .with_ansi(false)
            // the log collector adds the ingestion time.
            .without_time()
            .with_target(false)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // get configuration options from flags and environment variables
    let options = BridgeOptions::parse();

    init_tracing(options.log_format);

    tracing::info!("[bridge] {:?}", &options);

    let config = options
        .to_config()
        .context("invalid bridge configuration")?;

    tracing::info!(
        "[bridge] forwarding to {} ({:?} framing, {:?} JSON mode)",
        config.destination,
        config.framing,
        config.json_mode
    );

    let forwarder = Arc::new(Forwarder::new(config));

    let application = Application::build(&options, forwarder)
        .await
        .with_context(|| format!("unable to bind {}:{}", options.host, options.port))?;

    application
        .run_until_stopped()
        .await
        .context("HTTP server failed")?;

    tracing::info!("[bridge] stopped");

    Ok(())
}
