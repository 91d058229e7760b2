//! wisa-bridge server
//!
//! Relays fixed-format speaker commands from TCP clients to the WISA
//! transmitter module over USB control transfers, returning response
//! payloads to the caller, and advertises itself on the local network over
//! mDNS so apps can find it without a configured address.

mod config;
mod discovery;
mod network;
mod service;
mod usb;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use common::{UsbCommand, create_usb_bridge, setup_logging};
use network::BridgeServer;
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info, warn};
use usb::{UsbDevice, spawn_usb_worker};

#[derive(Parser, Debug)]
#[command(name = "wisa-bridge-server")]
#[command(
    author,
    version,
    about = "WISA Bridge - relay speaker commands from the network to USB"
)]
#[command(long_about = "
Accepts TCP connections from control apps, relays their command messages to
the attached WISA transmitter module as USB control transfers, and sends
response payloads back. The bridge advertises itself as a _wisa._tcp
service on the local network.

EXAMPLES:
    # Run with default config
    wisa-bridge-server

    # Listen on a different port, advertised as the living room bridge
    wisa-bridge-server --port 9100 --name \"Living Room\"

    # Run with debug logging
    wisa-bridge-server --log-level debug

CONFIGURATION:
    The server looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/wisa-bridge/server.toml
    3. /etc/wisa-bridge/server.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// TCP port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Advertised service instance name, e.g. the room name (overrides config)
    #[arg(short, long)]
    name: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = config::ServerConfig::default();
        let path = config::ServerConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let mut config = if let Some(ref path) = args.config {
        let path = PathBuf::from(shellexpand::tilde(path).as_ref());
        config::ServerConfig::load(Some(path)).context("Failed to load configuration")?
    } else {
        config::ServerConfig::load_or_default()
    };

    // CLI overrides take precedence over config values
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(ref name) = args.name {
        config.discovery.service_name = name.clone();
    }
    config.validate()?;

    let log_level = args.log_level.as_deref().unwrap_or(&config.server.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("wisa-bridge server v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    // The device handle is a process-lifetime resource; not finding the
    // device is fatal, there is nothing to bridge to.
    let device = UsbDevice::open(config.usb.vendor_id, config.usb.product_id).with_context(
        || {
            format!(
                "cannot open USB device {:04x}:{:04x}",
                config.usb.vendor_id, config.usb.product_id
            )
        },
    )?;
    info!(
        "Opened USB device {:04x}:{:04x}",
        device.vendor_id(),
        device.product_id()
    );

    let (usb_bridge, worker) = create_usb_bridge();
    let usb_worker_handle = spawn_usb_worker(worker, device, config.usb.transfer_timeout());

    let server = BridgeServer::new(&config, usb_bridge.clone())
        .await
        .context("Failed to start TCP listener")?;

    let advertiser = if config.discovery.enabled {
        match discovery::ServiceAdvertiser::register(
            &config.discovery.service_name,
            config.server.port,
        ) {
            Ok(advertiser) => Some(advertiser),
            Err(e) => {
                // The bridge still serves direct connections without mDNS.
                warn!("Service discovery unavailable: {e:#}");
                None
            }
        }
    } else {
        None
    };

    let watchdog_handle = service::spawn_watchdog_task()
        .await
        .context("Failed to spawn watchdog task")?;
    service::notify_ready().context("Failed to notify systemd ready")?;
    let status = match advertiser {
        Some(ref advertiser) => format!("Running - advertising '{}'", advertiser.instance_name()),
        None => "Running - waiting for connections".to_string(),
    };
    service::notify_status(&status).context("Failed to send status to systemd")?;

    info!("Press Ctrl+C to shutdown");

    let mut server_handle = tokio::spawn(server.run());
    let mut server_result: Result<()> = Ok(());

    tokio::select! {
        join = &mut server_handle => {
            server_result = match join {
                Ok(result) => result.context("server terminated"),
                Err(e) => Err(anyhow!("server task panicked: {e}")),
            };
        }
        signal = signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
                Err(e) => error!("Error waiting for Ctrl+C: {}", e),
            }
            server_handle.abort();
        }
    }

    service::notify_stopping().context("Failed to notify systemd stopping")?;
    watchdog_handle.abort();

    if let Some(advertiser) = advertiser {
        advertiser.shutdown();
    }

    info!("Shutting down USB subsystem...");
    if let Err(e) = usb_bridge.send_command(UsbCommand::Shutdown).await {
        error!("Error shutting down USB worker: {e:#}");
    }
    if let Err(e) = usb_worker_handle.join() {
        error!("USB worker thread panicked: {:?}", e);
    }

    info!("Server shutdown complete");
    server_result
}
