// ============================================================================
// credchain-gateway
// ============================================================================
//
// Single entry point for the credential platform. Every client request is
// authenticated, rate-limited and authorized here before it reaches a
// backend service.
//
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use credchain_gateway::config::Config;
use credchain_gateway::context::GatewayContext;
use credchain_gateway::routes;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(Config::from_env()?);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.rust_log.clone()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("=== Credential Gateway Starting ===");
    info!("Port: {}", config.port);
    info!("Rate limiting enabled: {}", config.rate_limit.enabled);

    let ctx = Arc::new(GatewayContext::new(config.clone())?);

    spawn_maintenance(ctx.clone());

    let app = routes::build_router(ctx);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port)
        .parse()
        .context("Failed to parse bind address")?;

    info!("Credential Gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Failed to start server")?;

    Ok(())
}

/// Periodic cleanup of idle rate-limit windows and expired tokens
fn spawn_maintenance(ctx: Arc<GatewayContext>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        interval.tick().await;
        loop {
            interval.tick().await;
            let evicted = ctx.limiter.evict_idle();
            let purged = ctx.tokens.purge_expired();
            if evicted > 0 || purged > 0 {
                tracing::debug!(evicted, purged, "Maintenance sweep");
            }
        }
    });
}
