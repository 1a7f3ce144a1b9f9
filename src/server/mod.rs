//! HTTP server module
//!
//! Runs the GraphQL listener and, when enabled, the metrics endpoint until
//! the process is asked to stop.

use crate::config::Config;
use crate::metrics::server::MetricsServer;
use std::net::SocketAddr;
use thiserror::Error;
use tracing::info;

pub mod http;

use self::http::HttpServer;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),

    #[error("Server error: {0}")]
    RuntimeError(String),
}

/// Top-level server: GraphQL listener plus metrics endpoint
pub struct Server {
    http: HttpServer,
    metrics: Option<MetricsServer>,
}

impl Server {
    /// Bind the GraphQL listener and prepare the metrics server
    pub async fn new(config: Config) -> Result<Self, ServerError> {
        let metrics = config
            .metrics
            .enabled
            .then(|| MetricsServer::from_config(&config.metrics));
        let http = HttpServer::new(config).await?;

        Ok(Self { http, metrics })
    }

    /// Address of the GraphQL listener
    pub fn local_addr(&self) -> SocketAddr {
        self.http.local_addr()
    }

    /// Run until Ctrl-C
    pub async fn run(self) -> Result<(), ServerError> {
        let Server { http, metrics } = self;

        let mut metrics = metrics;
        if let Some(server) = metrics.as_mut() {
            server
                .start()
                .await
                .map_err(|e| ServerError::BindError(format!("Metrics server: {}", e)))?;
        }

        let result = tokio::select! {
            result = http.run() => result,
            signal = tokio::signal::ctrl_c() => {
                info!("Shutting down server");
                signal.map_err(|e| ServerError::RuntimeError(e.to_string()))
            }
        };

        if let Some(server) = metrics.as_mut() {
            server.shutdown().await;
        }

        result
    }
}
