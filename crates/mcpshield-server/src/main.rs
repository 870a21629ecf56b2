//! mcpshield server binary.
//!
//! Starts the HTTP ingress for the MCP security gateway: ingestion, the
//! synchronous validate endpoints, and the health probe.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mcpshield_core::config::EngineConfig;
use mcpshield_server::build_router;
use mcpshield_server::state::AppState;

/// mcpshield API server — the MCP security gateway ingress.
#[derive(Parser)]
#[command(name = "mcpshield-server", version, about)]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value = "8787")]
    port: u16,

    /// Host address to bind to. Use 0.0.0.0 to accept external traffic.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (respects RUST_LOG env var).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env();

    if !config.guardrails_enabled {
        tracing::warn!("ENABLE_MCP_GUARDRAILS=false: all traffic will be allowed unvalidated");
    }
    if config.threat_backend_token.is_none() {
        tracing::warn!("THREAT_BACKEND_TOKEN not set: threat reporting is disabled");
    }

    tracing::info!(
        host = %cli.host,
        port = cli.port,
        policy_store = %config.policy_store_url,
        "starting mcpshield server"
    );

    let state = Arc::new(AppState::from_config(config));
    let app = build_router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind((cli.host.as_str(), cli.port)).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain detached threat reports, metadata audits, and mirror tees
    // before the process exits.
    state.tasks.close();
    state.tasks.wait().await;
    tracing::info!("shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
    }
}
