//! Challenge selector host
//!
//! - Axum HTTP API over the adaptive selection engine
//! - In-memory attempt history and challenge bank
//!
//! Important env variables:
//!   PORT               : u16 (default 3000)
//!   ENGINE_CONFIG_PATH : path to TOML config (engine tuning + optional challenge bank)
//!   LOG_LEVEL          : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT         : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc};

use challenge_selector::{routes::build_router, state::AppState, telemetry};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let state = Arc::new(AppState::new().await);
  let app = build_router(state);

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "engine", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(target: "engine", error = %e, "Failed to listen for shutdown signal");
      }
      info!(target: "engine", "Shutdown signal received");
    })
    .await?;
  Ok(())
}
