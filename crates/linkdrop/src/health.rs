//! `GET /health` liveness endpoint for container platforms.

use std::net::SocketAddr;

use axum::{routing::get, Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    bot: &'static str,
    timestamp: String,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        bot: "running",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    })
}

pub fn router() -> Router {
    Router::new().route("/health", get(health_handler))
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(port: u16, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("health endpoint listening on http://{addr}/health");

    axum::serve(listener, router())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
