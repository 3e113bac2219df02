//! Port forwarding configuration

use crate::{Error, Result};
use crate::mapping::types::{PortSet, RefreshPolicy};
use serde::{Deserialize, Serialize};

/// Port forwarding configuration
///
/// Declares which ports the server wants forwarded on the gateway and how
/// often the mappings should be re-asserted. Stored in JSON format and read
/// once at server start.
///
/// # Example
/// ```rust,no_run
/// use portkeeper::config::PortsConfig;
///
/// // Load configuration (returns defaults if the file doesn't exist)
/// let config = PortsConfig::load("portkeeper.json").expect("Failed to load");
///
/// println!("TCP ports: {:?}", config.tcp_ports);
/// println!("Refresh every {} minutes", config.refresh_interval_minutes);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortsConfig {
    /// TCP ports to forward, in the order they should be opened
    pub tcp_ports: Vec<u16>,
    /// UDP ports to forward, in the order they should be opened
    pub udp_ports: Vec<u16>,
    /// Minutes between refresh passes; 0 disables periodic refresh
    pub refresh_interval_minutes: u32,
    /// Description attached to each mapping (shown in the router UI)
    pub mapping_description: String,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            tcp_ports: vec![25565],
            udp_ports: Vec::new(),
            refresh_interval_minutes: 0,
            mapping_description: "Dedicated Server (portkeeper)".to_string(),
        }
    }
}

impl PortsConfig {
    /// Load configuration from a JSON file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// The loaded configuration, or defaults if the file doesn't exist
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)?;

        // Handle empty file (return defaults)
        if data.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Check that every configured port is a valid port number
    pub fn validate(&self) -> Result<()> {
        for &port in self.tcp_ports.iter().chain(self.udp_ports.iter()) {
            if port == 0 {
                return Err(Error::Config("Port 0 is not a valid port".to_string()));
            }
        }
        Ok(())
    }

    /// The configured ports as an ordered set (TCP group, then UDP group)
    pub fn port_set(&self) -> PortSet {
        PortSet::new(self.tcp_ports.clone(), self.udp_ports.clone())
    }

    /// The configured refresh policy
    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy::new(self.refresh_interval_minutes)
    }
}
