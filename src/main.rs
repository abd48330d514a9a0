//! NST · Progress & Rewards Backend
//!
//! - Axum HTTP API: chapter progress per subject, daily reward wheel, settings
//! - Optional remote key-value mirror for learner records
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT              : u16 (default 3000)
//!   NST_CONFIG_PATH   : path to TOML config (settings overrides, seed learners, mirror)
//!   NST_MIRROR_URL    : enables the remote mirror if present
//!   NST_MIRROR_TOKEN  : optional `auth` token for the mirror
//!   LOG_LEVEL         : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT        : "pretty" (default) or "json"

mod telemetry;
mod util;
mod clock;
mod domain;
mod error;
mod config;
mod progress;
mod reward;
mod store;
mod mirror;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Repository, settings, mirror and clock.
  let state = Arc::new(AppState::new());

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "nst_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "nst_backend", error = %e, "Failed to listen for shutdown signal");
    return;
  }
  info!(target: "nst_backend", "Shutdown requested");
}
