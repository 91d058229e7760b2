//! Server configuration management

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default listening port when no config or CLI override is given
pub const DEFAULT_PORT: u16 = 8889;

/// USB vendor ID of the speaker transmitter module
pub const DEFAULT_VENDOR_ID: u16 = 0x2495;

/// USB product ID of the speaker transmitter module
pub const DEFAULT_PRODUCT_ID: u16 = 0x0016;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub server: ServerSettings,
    pub usb: UsbSettings,
    #[serde(default)]
    pub discovery: DiscoverySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// TCP port to listen on (1024..=65535)
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbSettings {
    /// Vendor ID of the bridged device
    pub vendor_id: u16,
    /// Product ID of the bridged device
    pub product_id: u16,
    /// Control transfer timeout in milliseconds; 0 waits indefinitely
    #[serde(default = "UsbSettings::default_timeout_ms")]
    pub transfer_timeout_ms: u64,
}

impl UsbSettings {
    fn default_timeout_ms() -> u64 {
        5000
    }

    /// Transfer timeout as a Duration (zero = indefinite, per libusb)
    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySettings {
    /// Advertise the bridge over mDNS/DNS-SD
    #[serde(default = "DiscoverySettings::default_enabled")]
    pub enabled: bool,
    /// Advertised service instance name; renamed on collision
    #[serde(default = "DiscoverySettings::default_service_name")]
    pub service_name: String,
}

impl DiscoverySettings {
    fn default_enabled() -> bool {
        true
    }

    fn default_service_name() -> String {
        "WISA Bridge".to_string()
    }
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            service_name: Self::default_service_name(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                port: DEFAULT_PORT,
                log_level: "info".to_string(),
            },
            usb: UsbSettings {
                vendor_id: DEFAULT_VENDOR_ID,
                product_id: DEFAULT_PRODUCT_ID,
                transfer_timeout_ms: UsbSettings::default_timeout_ms(),
            },
            discovery: DiscoverySettings::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/wisa-bridge/server.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: ServerConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("wisa-bridge").join("server.toml")
        } else {
            PathBuf::from(".config/wisa-bridge/server.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Ports below 1024 require privileges the bridge should not have
        if self.server.port < 1024 {
            return Err(anyhow!(
                "Invalid port number {}, must be 1024..=65535",
                self.server.port
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.server.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.server.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.discovery.enabled && self.discovery.service_name.trim().is_empty() {
            return Err(anyhow!("Discovery enabled with an empty service name"));
        }

        Ok(())
    }
}
