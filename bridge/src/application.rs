// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use crate::configuration::BridgeOptions;
use crate::forwarder::Forwarder;
use crate::routes;
use axum::Router;
use axum::routing::{get, post};
use axum::serve::Serve;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub forwarder: Arc<Forwarder>,
}

pub struct Application {
    server: Serve<TcpListener, Router, Router>,
}

impl Application {
    /// Binds the listen address and prepares the server.
    ///
    /// Failing to bind is the only fatal runtime error of the bridge.
    pub async fn build(
        options: &BridgeOptions,
        forwarder: Arc<Forwarder>,
    ) -> Result<Self, std::io::Error> {
        let address = format!("{}:{}", options.host, options.port);
        let listener = TcpListener::bind(address).await?;
        let server = run(listener, forwarder)?;
        let port = server.local_addr()?.port();

        tracing::info!("[bridge] listening at http://{}:{}", options.host, port);

        Ok(Self { server })
    }

    /// Serves until Ctrl-C or SIGTERM, then drains in-flight requests.
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.server.with_graceful_shutdown(shutdown_signal()).await
    }
}

/// Builds the router with all middleware applied.
pub fn create_router(forwarder: Arc<Forwarder>) -> Router {
    let state = Arc::new(AppState { forwarder });

    Router::new()
        .route("/health", get(routes::health).post(routes::forward))
        .route("/", post(routes::forward))
        .route("/{*path}", post(routes::forward))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[tracing::instrument(skip(listener, forwarder))]
pub fn run(
    listener: TcpListener,
    forwarder: Arc<Forwarder>,
) -> Result<Serve<TcpListener, Router, Router>, std::io::Error> {
    let app = create_router(forwarder);
    Ok(axum::serve(listener, app))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("[bridge] failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("[bridge] failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("[bridge] shutdown signal received");
}
