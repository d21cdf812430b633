//! dreamlens-server: HTTP surface over `dreamlens-core`.
//!
//! Thin glue only. Every handler delegates to one `Commands` method; this
//! crate owns routing, request-boundary metrics and HTTP error mapping.

pub mod error;
pub mod http;
pub mod middleware;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dreamlens_core::Commands;

pub use http::{router, AppState};

/// Bind `addr` and serve until ctrl-c.
pub async fn serve(commands: Arc<Commands>, addr: SocketAddr) -> anyhow::Result<()> {
    let app = router(AppState::new(commands));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("dreamlens listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;
    tracing::info!("dreamlens stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("ctrl-c handler unavailable: {e}");
        std::future::pending::<()>().await;
    }
}
