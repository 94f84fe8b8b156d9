/*
 * server.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Vassoio, an asynchronous HTTP origin server.
 *
 * Vassoio is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Vassoio is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Vassoio.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Accept loop: bind each registered endpoint, perform the TLS handshake for
//! encrypted hosts, select the host by SNI name (or listener address), and
//! run one Connection per socket.

use std::io;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

use crate::error::HttpError;
use crate::host::HostRegistry;
use crate::protocol::http::connection::{Connection, ConnectionConfig, ServerStream};

/// The listening server: a host registry plus per-connection configuration.
pub struct Server {
    registry: HostRegistry,
    config: ConnectionConfig,
}

impl Server {
    pub fn new(registry: HostRegistry) -> Self {
        Self::with_config(registry, ConnectionConfig::default())
    }

    pub fn with_config(registry: HostRegistry, config: ConnectionConfig) -> Self {
        Self { registry, config }
    }

    /// Bind every distinct `(address, port)` endpoint and serve until a
    /// listener fails. Connection-level failures only log.
    pub async fn serve(self) -> Result<(), HttpError> {
        if self.registry.is_empty() {
            return Err(HttpError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "no hosts registered",
            )));
        }
        let registry = Arc::new(self.registry);
        let mut tasks = tokio::task::JoinSet::new();
        let mut bound: Vec<String> = Vec::new();
        for host in registry.iter() {
            let addr = if host.address() == "*" {
                "0.0.0.0".to_string()
            } else {
                host.address().to_string()
            };
            let endpoint = format!("{}:{}", addr, host.port());
            if bound.contains(&endpoint) {
                continue;
            }
            let listener = TcpListener::bind(&endpoint).await.map_err(HttpError::Io)?;
            info!(%endpoint, encrypted = host.is_encrypted(), "listening");
            bound.push(endpoint);
            tasks.spawn(accept_loop(
                listener,
                addr,
                host.port(),
                registry.clone(),
                self.config.clone(),
            ));
        }
        while let Some(joined) = tasks.join_next().await {
            joined.map_err(|e| HttpError::Io(io::Error::other(e)))??;
        }
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    addr: String,
    port: u16,
    registry: Arc<HostRegistry>,
    config: ConnectionConfig,
) -> Result<(), HttpError> {
    // One acceptor per endpoint; SNI-based host selection happens after the
    // handshake against the registry.
    let acceptor = registry
        .iter()
        .find(|h| h.port() == port && h.is_encrypted())
        .and_then(|h| h.tls_context())
        .map(|ctx| TlsAcceptor::from(ctx.server_config()));

    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        debug!(%peer, "accepted");
        let registry = registry.clone();
        let config = config.clone();
        let acceptor = acceptor.clone();
        let addr = addr.clone();
        tokio::spawn(async move {
            let result = serve_socket(socket, addr, port, acceptor, registry, config).await;
            if let Err(e) = result {
                if e.is_client_gone() {
                    debug!(%peer, "client disconnected");
                } else {
                    warn!(%peer, error = %e, "connection failed");
                }
            }
        });
    }
}

async fn serve_socket(
    socket: TcpStream,
    addr: String,
    port: u16,
    acceptor: Option<TlsAcceptor>,
    registry: Arc<HostRegistry>,
    config: ConnectionConfig,
) -> Result<(), HttpError> {
    let (stream, identity) = match acceptor {
        Some(acceptor) => {
            let tls = acceptor.accept(socket).await.map_err(HttpError::from)?;
            let sni = tls.get_ref().1.server_name().map(|s| s.to_string());
            let identity = format!("{}:{}", sni.as_deref().unwrap_or("*"), port);
            (ServerStream::Tls(tls), identity)
        }
        None => (ServerStream::Plain(socket), format!("{}:{}", addr, port)),
    };
    let host = registry
        .select(&identity)
        .or_else(|| registry.select(&format!("*:{}", port)))
        .ok_or_else(|| {
            HttpError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no host matches {}", identity),
            ))
        })?;
    Connection::with_config(stream, host.app(), config).run().await
}
