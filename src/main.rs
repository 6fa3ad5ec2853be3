//! llm-relay
//!
//! A streaming reverse proxy for chat-completion APIs.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────────┐
//!                 │                        RELAY                             │
//!   Client        │  ┌──────────┐   ┌───────────┐   ┌──────────────────┐     │
//!   ──────────────┼─▶│  http    │──▶│  agent    │──▶│  forwarding      │─────┼──▶ Upstream
//!                 │  │  server  │   │  classify │   │  engine + relay  │     │
//!   ◀─────────────┼──│          │◀──┼───────────┼───│  (streamed body) │◀────┼───
//!                 │  └────┬─────┘   └───────────┘   └────────┬─────────┘     │
//!                 │       │ /stats, /stats/export            │ one record    │
//!                 │       ▼                                  ▼               │
//!                 │  ┌──────────┐                    ┌──────────────┐        │
//!                 │  │  admin   │◀───────────────────│  telemetry   │        │
//!                 │  │ handlers │                    │  (SQLite)    │        │
//!                 │  └──────────┘                    └──────────────┘        │
//!                 └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use llm_relay::config::{load_config, CONFIG_PATH_VAR};
use llm_relay::lifecycle::{launch, signals::forward_signals, Shutdown};
use llm_relay::observability::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let config_path = std::env::var(CONFIG_PATH_VAR)
        .ok()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from);

    let config = match load_config(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("llm-relay: {e}");
            return ExitCode::FAILURE;
        }
    };

    logging::init(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address(),
        upstream = %config.upstream.url,
        upstream_timeout_ms = config.timeouts.upstream_ms,
        client_idle_ms = config.timeouts.client_idle_ms,
        "llm-relay starting"
    );

    let shutdown = Shutdown::new();
    tokio::spawn(forward_signals(shutdown.clone()));

    match launch(config, config_path, &shutdown).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "llm-relay failed");
            ExitCode::FAILURE
        }
    }
}
