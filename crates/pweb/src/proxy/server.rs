//! ProxyServer and its accept loop.
//!
//! Inbound connections are plain HTTP/1.1, one task per connection. Upgrades
//! are never enabled on the connection, so upgrade requests are answered as
//! ordinary requests.

use super::network::create_listener;
use super::MirrorProxy;
use anyhow::Context;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Serves a [`MirrorProxy`] over TCP.
#[derive(Debug, Clone)]
pub struct ProxyServer {
    proxy: Arc<MirrorProxy>,
}

impl ProxyServer {
    pub fn new(proxy: Arc<MirrorProxy>) -> Self {
        Self { proxy }
    }

    /// Open the listening socket.
    pub fn bind(addr: SocketAddr) -> Result<TcpListener, anyhow::Error> {
        create_listener(addr).with_context(|| format!("Failed to listen on {addr}"))
    }

    /// Accept connections until accepting fails.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), anyhow::Error> {
        if let Ok(addr) = listener.local_addr() {
            info!("Listening on http://{}", addr);
        }
        info!("Proxying to {}", self.proxy.config().origin());
        info!("Loaded {} response listeners", self.proxy.listeners().len());

        loop {
            let (stream, remote_addr) = listener.accept().await.context("Failed to accept connection")?;
            let proxy = Arc::clone(&self.proxy);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let proxy = Arc::clone(&proxy);
                    async move { Ok::<_, Infallible>(proxy.handle(req).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Error serving HTTP connection from {}: {}", remote_addr, err);
                }
            });
        }
    }

    /// Bind `addr` and serve.
    pub async fn run(&self, addr: SocketAddr) -> Result<(), anyhow::Error> {
        let listener = Self::bind(addr)?;
        self.serve(listener).await
    }
}
