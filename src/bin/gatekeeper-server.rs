// ABOUTME: Gatekeeper HTTP server binary
// ABOUTME: Loads environment configuration, wires the authorization server and serves it with axum
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Gatekeeper Contributors

//! # Gatekeeper Server Binary
//!
//! Serves the login, authorization and token endpoints over HTTP backed by
//! the in-memory credential store.

use std::future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use gatekeeper::config::ServerConfig;
use gatekeeper::logging;
use gatekeeper::oauth2_server::{AuthorizationServer, OAuth2Routes};
use gatekeeper::store::InMemoryStore;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

/// How often the in-memory store sweeps expired entries
const STORE_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "gatekeeper-server")]
#[command(about = "Gatekeeper - OAuth 2.0 authorization server with passwordless login")]
pub struct Args {
    /// Override the listen address
    #[arg(long)]
    host: Option<String>,

    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init_from_env()?;

    let mut config = ServerConfig::from_env()?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }
    info!("{}", config.summary());

    let address = format!("{}:{}", config.host, config.http_port);
    let store = Arc::new(InMemoryStore::with_cleanup(STORE_CLEANUP_INTERVAL));
    let server = AuthorizationServer::builder(config, store).build()?;
    let router = OAuth2Routes::routes(Arc::new(server));

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("Gatekeeper listening on {address}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server terminated")?;

    info!("Gatekeeper stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
