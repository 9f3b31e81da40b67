//! Session Orchestrator (bss-session) - Main entry point
//!
//! This is the session orchestrator service for the blind-listening party
//! game: it resolves the account capability, drives the single-track and
//! bingo game loops, and exposes the HTTP/SSE control surface the
//! presentation layer talks to.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bss_common::config::Config;
use bss_session::api::{self, AppState};
use bss_session::SessionService;

/// Command-line arguments for bss-session
#[derive(Parser, Debug)]
#[command(name = "bss-session")]
#[command(about = "Session orchestrator for the blind song scanner game")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "BSS_PORT")]
    port: Option<u16>,

    /// Path to a TOML config file
    #[arg(short, long, env = "BSS_CONFIG")]
    config: Option<PathBuf>,

    /// Vendor API bearer credential (overrides the config file)
    #[arg(long, env = "BSS_ACCESS_TOKEN")]
    access_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bss_session=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command-line arguments
    let args = Args::parse();

    let mut config = Config::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(token) = args.access_token {
        config.access_token = token;
    }

    info!("Starting BSS Session Orchestrator on port {}", config.port);

    let port = config.port;

    // Wire the orchestrator (audio thread, capability probe, resolvers)
    let service = SessionService::start(config)
        .await
        .context("Failed to initialize session service")?;
    info!("Session service initialized");

    // Build the application router
    let app = api::create_router(AppState { service });

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
