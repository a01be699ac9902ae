//! TCP listener binding.
//!
//! # Responsibilities
//! - Bind one listener per multiplexed port on the configured interface
//! - Report the bound address (useful when the port is 0)
//!
//! # Design Decisions
//! - Concurrency limits live in the HTTP middleware stack, not here
//! - Bind failures are fatal at startup

use std::net::{IpAddr, SocketAddr};

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ServerConfig;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The configured bind IP is not an address.
    #[error("invalid bind address `{0}`")]
    Address(String),

    /// Failed to bind to address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// A bound TCP listener for one port.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    port: u16,
}

impl Listener {
    /// Bind `port` on the configured interface.
    pub async fn bind(config: &ServerConfig, port: u16) -> Result<Self, ListenerError> {
        let ip: IpAddr = config
            .bind_ip
            .parse()
            .map_err(|_| ListenerError::Address(config.bind_ip.clone()))?;
        let addr = SocketAddr::new(ip, port);

        let inner = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind { addr, source })?;

        let local_addr = inner
            .local_addr()
            .map_err(|source| ListenerError::Bind { addr, source })?;

        tracing::info!(
            address = %local_addr,
            max_connections = config.max_connections,
            "Listener bound"
        );

        Ok(Self { inner, port })
    }

    /// The port this listener multiplexes, as declared by its domains.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    pub fn into_inner(self) -> TcpListener {
        self.inner
    }
}
