//! Systemd service integration
//!
//! The bridge runs as a long-lived daemon; under systemd with `Type=notify`
//! it reports lifecycle transitions over the sd-notify protocol and feeds
//! the watchdog when one is configured. Everything here is a no-op when
//! `NOTIFY_SOCKET` is not set.

use anyhow::{Context, Result};
use std::env;
use std::os::unix::net::UnixDatagram;
use tracing::{debug, error, info};

/// Send one sd-notify state string, if running under systemd
fn sd_notify(state: &str) -> Result<()> {
    let Ok(socket_path) = env::var("NOTIFY_SOCKET") else {
        debug!("NOTIFY_SOCKET not set, skipping systemd notification");
        return Ok(());
    };

    let socket = UnixDatagram::unbound().context("Failed to create notify socket")?;
    socket
        .send_to(state.as_bytes(), &socket_path)
        .with_context(|| format!("Failed to send '{state}' to systemd"))?;
    Ok(())
}

/// Notify systemd that the service finished initializing
pub fn notify_ready() -> Result<()> {
    sd_notify("READY=1")?;
    if is_systemd() {
        info!("Notified systemd: service ready");
    }
    Ok(())
}

/// Notify systemd that the shutdown sequence started
pub fn notify_stopping() -> Result<()> {
    sd_notify("STOPPING=1")?;
    if is_systemd() {
        info!("Notified systemd: service stopping");
    }
    Ok(())
}

/// Send a status line visible in `systemctl status`
pub fn notify_status(status: &str) -> Result<()> {
    sd_notify(&format!("STATUS={status}"))
}

/// Send a watchdog keepalive
pub fn notify_watchdog() -> Result<()> {
    sd_notify("WATCHDOG=1")
}

/// Watchdog timeout configured by systemd, in microseconds
pub fn get_watchdog_timeout() -> Option<u64> {
    env::var("WATCHDOG_USEC").ok().and_then(|s| s.parse().ok())
}

/// Check if running under systemd
pub fn is_systemd() -> bool {
    env::var("NOTIFY_SOCKET").is_ok()
}

/// Spawn a task feeding the systemd watchdog
///
/// Sends keepalives at half the configured watchdog interval. Returns a
/// completed no-op task when the watchdog is not enabled.
pub async fn spawn_watchdog_task() -> Result<tokio::task::JoinHandle<()>> {
    let Some(timeout_usec) = get_watchdog_timeout() else {
        debug!("Systemd watchdog not enabled, skipping watchdog task");
        return Ok(tokio::spawn(async {}));
    };

    let interval_secs = (timeout_usec / 1_000_000) / 2;
    let interval = std::time::Duration::from_secs(interval_secs.max(1));

    info!(
        "Systemd watchdog enabled, interval: {}s (timeout: {}s)",
        interval.as_secs(),
        timeout_usec / 1_000_000
    );

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if let Err(e) = notify_watchdog() {
                error!("Failed to send watchdog keepalive: {:#}", e);
            }
        }
    });

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_systemd_without_socket() {
        unsafe {
            env::remove_var("NOTIFY_SOCKET");
        }
        assert!(!is_systemd());
    }

    #[test]
    fn test_notify_functions_without_socket() {
        // When NOTIFY_SOCKET is not set, notifications succeed but do nothing
        unsafe {
            env::remove_var("NOTIFY_SOCKET");
        }

        assert!(notify_ready().is_ok());
        assert!(notify_stopping().is_ok());
        assert!(notify_watchdog().is_ok());
        assert!(notify_status("test").is_ok());
    }

    #[test]
    fn test_get_watchdog_timeout() {
        unsafe {
            env::remove_var("WATCHDOG_USEC");
        }
        assert!(get_watchdog_timeout().is_none());

        unsafe {
            env::set_var("WATCHDOG_USEC", "30000000");
        }
        assert_eq!(get_watchdog_timeout(), Some(30_000_000));

        unsafe {
            env::set_var("WATCHDOG_USEC", "invalid");
        }
        assert!(get_watchdog_timeout().is_none());

        unsafe {
            env::remove_var("WATCHDOG_USEC");
        }
    }
}
