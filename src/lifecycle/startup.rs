//! Startup orchestration.
//!
//! Subsystems come up in order: config validation, metrics exporter,
//! telemetry store, upstream client, listener. Any failure before the
//! listener is bound is fatal, except the telemetry store, which degrades.

use std::path::PathBuf;

use tokio::net::TcpListener;

use crate::config::{validate_config, ProxyConfig, ValidationError};
use crate::http::{HttpServer, ServerError};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid configuration: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    InvalidConfig(Vec<ValidationError>),
    #[error("invalid metrics address `{0}`")]
    MetricsAddress(String),
    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Validate, build the server and bind its listener without serving yet.
pub async fn bind(
    config: ProxyConfig,
    config_path: Option<PathBuf>,
) -> Result<(HttpServer, TcpListener), StartupError> {
    validate_config(&config).map_err(StartupError::InvalidConfig)?;

    if config.observability.metrics_enabled {
        let addr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(addr)?;
    }

    let address = config.listener.bind_address();
    let mut server = HttpServer::new(config)?;
    if let Some(path) = config_path {
        server = server.with_config_path(path);
    }

    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address, source })?;
    Ok((server, listener))
}

/// Bring the relay up and serve until `shutdown` fires.
pub async fn launch(
    config: ProxyConfig,
    config_path: Option<PathBuf>,
    shutdown: &Shutdown,
) -> Result<(), StartupError> {
    let (server, listener) = bind(config, config_path).await?;
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(address = %addr, "Listening for connections");
    }
    server.run(listener, shutdown.subscribe()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_credential_never_binds() {
        let mut config = ProxyConfig::default();
        config.listener.host = "127.0.0.1".into();
        config.listener.port = 0;
        config.upstream.api_key = String::new();

        match bind(config, None).await {
            Err(StartupError::InvalidConfig(errors)) => {
                assert!(errors.contains(&ValidationError::MissingApiKey));
            }
            other => panic!("expected invalid config, got {:?}", other.map(|_| ())),
        }
    }
}
