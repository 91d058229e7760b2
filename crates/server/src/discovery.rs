//! mDNS/DNS-SD service advertisement
//!
//! Publishes the bridge as a `_wisa._tcp` service instance so mobile apps
//! can find it without a configured address. The instance name is the room
//! name the operator picked; if registration fails under that name, an
//! alternative name with a numeric suffix is tried, the way Avahi renames
//! colliding services.

use anyhow::{Context, Result};
use mdns_sd::{ServiceDaemon, ServiceInfo};
use tracing::{info, warn};

/// DNS-SD service type registered for the bridge
pub const SERVICE_TYPE: &str = "_wisa._tcp.local.";

/// Bound on collision renames before giving up
const MAX_RENAME_ATTEMPTS: u32 = 8;

/// Handle to a registered service advertisement
pub struct ServiceAdvertiser {
    daemon: ServiceDaemon,
    fullname: String,
    instance_name: String,
}

impl ServiceAdvertiser {
    /// Register the service under `name` on the given port
    ///
    /// Addresses are auto-detected per interface; a `version` TXT record
    /// carries the bridge version. On a name collision the instance is
    /// renamed (`Living Room` → `Living Room #2` → ...) and registration is
    /// retried a bounded number of times.
    pub fn register(name: &str, port: u16) -> Result<Self> {
        let daemon = ServiceDaemon::new().context("failed to start mDNS responder")?;
        let host_name = local_host_name();

        let mut instance = name.to_string();
        let mut attempts = 0;
        loop {
            let service = ServiceInfo::new(
                SERVICE_TYPE,
                &instance,
                &host_name,
                "",
                port,
                &[("version", env!("CARGO_PKG_VERSION"))][..],
            )
            .context("invalid service parameters")?
            .enable_addr_auto();
            let fullname = service.get_fullname().to_string();

            match daemon.register(service) {
                Ok(()) => {
                    if instance != name {
                        info!("Service name collision, renamed service to '{instance}'");
                    }
                    info!("Advertising '{instance}' as {SERVICE_TYPE} on port {port}");
                    return Ok(Self {
                        daemon,
                        fullname,
                        instance_name: instance,
                    });
                }
                Err(e) if attempts < MAX_RENAME_ATTEMPTS => {
                    attempts += 1;
                    instance = alternative_service_name(&instance);
                    warn!("mDNS registration failed ({e}), retrying as '{instance}'");
                }
                Err(e) => {
                    return Err(e).context("failed to register mDNS service");
                }
            }
        }
    }

    /// The instance name the service ended up registered under
    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// Withdraw the advertisement and stop the responder
    pub fn shutdown(self) {
        if let Err(e) = self.daemon.unregister(&self.fullname) {
            warn!("Failed to unregister mDNS service: {e}");
        }
        if let Err(e) = self.daemon.shutdown() {
            warn!("Failed to shut down mDNS responder: {e}");
        }
    }
}

/// Advertised mDNS host name for this machine
fn local_host_name() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|host| host.into_string().ok())
        .filter(|host| !host.is_empty())
        .map(|host| format!("{host}.local."))
        .unwrap_or_else(|| "wisa-bridge.local.".to_string())
}

/// Pick an alternative instance name after a collision
///
/// Appends ` #2`, or bumps an existing numeric suffix.
pub fn alternative_service_name(name: &str) -> String {
    if let Some((base, suffix)) = name.rsplit_once(" #")
        && let Ok(n) = suffix.parse::<u32>()
    {
        return format!("{base} #{}", n + 1);
    }
    format!("{name} #2")
}
