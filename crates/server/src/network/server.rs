//! TCP bridge server
//!
//! Binds the listening socket, accepts client connections, and spawns a
//! connection handler task per peer. Every handler shares the one USB
//! worker through a cloned `UsbBridge` handle.

use anyhow::{Context, Result};
use common::UsbBridge;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::connection::ClientConnection;
use crate::config::ServerConfig;

/// TCP server relaying command envelopes to the USB subsystem
pub struct BridgeServer {
    listener: TcpListener,
    usb_bridge: UsbBridge,
}

impl BridgeServer {
    /// Bind the listening socket
    ///
    /// A bind failure is fatal to the whole service; there is no point
    /// running a bridge nobody can reach.
    pub async fn new(config: &ServerConfig, usb_bridge: UsbBridge) -> Result<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind TCP listener on {addr}"))?;

        info!("Server listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            usb_bridge,
        })
    }

    /// The bound local address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until a fatal accept error
    ///
    /// Spawns one handler task per accepted connection. Per-connection
    /// errors stay inside their task; only an accept failure takes the
    /// service down.
    pub async fn run(self) -> Result<()> {
        info!("Server running, waiting for connections...");

        loop {
            let (stream, peer) = self.listener.accept().await.context("accept failed")?;

            info!("Received a connection from {peer}");

            let usb_bridge = self.usb_bridge.clone();
            tokio::spawn(async move {
                let mut connection = ClientConnection::new(stream, peer, usb_bridge);
                if let Err(e) = connection.run().await {
                    error!("Connection error from {peer}: {e:#}");
                }
            });
        }
    }
}
