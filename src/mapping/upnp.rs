//! UPnP IGD (Internet Gateway Device) implementation of [`GatewayClient`]
//!
//! Uses SSDP (Simple Service Discovery Protocol) to discover an IGD device on
//! the local network, then SOAP to drive its WANIPConnection service. The
//! discovered gateway is cached so repeated calls during a pass don't redo
//! the multicast search.

use super::gateway::GatewayClient;
use super::types::Protocol;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for the SSDP gateway search
const SEARCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Lease duration requested for each mapping, in seconds (0 = until reboot)
const LEASE_DURATION_SECS: u32 = 0;

/// Upper bound on the port mapping table walk in [`GatewayClient::is_mapped`]
const MAX_MAPPING_ENTRIES: u32 = 1024;

/// Get the local IP address used to reach the gateway
///
/// Connects a UDP socket to a public address to learn which local interface
/// routes outward. No data is sent; the socket only resolves a local address.
fn local_ip_for_gateway() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .map_err(|e| debug!("Failed to create socket for local IP detection: {}", e))
        .ok()?;

    socket
        .connect("8.8.8.8:80")
        .map_err(|e| debug!("Failed to connect socket for local IP detection: {}", e))
        .ok()?;

    socket.local_addr().ok().map(|addr| addr.ip())
}

fn to_igd_protocol(protocol: Protocol) -> igd_next::PortMappingProtocol {
    match protocol {
        Protocol::Tcp => igd_next::PortMappingProtocol::TCP,
        Protocol::Udp => igd_next::PortMappingProtocol::UDP,
    }
}

/// Real gateway client backed by `igd-next`
///
/// All operations are blocking network I/O; callers running inside an async
/// runtime should wrap them in `tokio::task::spawn_blocking` (the lifecycle
/// manager does this for every pass).
pub struct UpnpGateway {
    cached: Mutex<Option<igd_next::Gateway>>,
    search_timeout: Duration,
}

impl UpnpGateway {
    /// Create a gateway client with the default search timeout
    pub fn new() -> Self {
        Self::with_timeout(SEARCH_TIMEOUT)
    }

    /// Create a gateway client with a custom SSDP search timeout
    pub fn with_timeout(search_timeout: Duration) -> Self {
        Self {
            cached: Mutex::new(None),
            search_timeout,
        }
    }

    /// The discovered gateway, searching for one on first use
    fn gateway(&self) -> Option<igd_next::Gateway> {
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());

        if cached.is_none() {
            debug!("Searching for UPnP IGD gateway...");
            match igd_next::search_gateway(igd_next::SearchOptions {
                timeout: Some(self.search_timeout),
                ..Default::default()
            }) {
                Ok(gateway) => {
                    debug!("Found UPnP gateway at {}", gateway.addr);
                    *cached = Some(gateway);
                }
                Err(e) => {
                    debug!("UPnP gateway search failed: {}", e);
                }
            }
        }

        cached.clone()
    }
}

impl Default for UpnpGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayClient for UpnpGateway {
    fn is_available(&self) -> bool {
        self.gateway().is_some()
    }

    fn external_address(&self) -> Option<IpAddr> {
        let gateway = self.gateway()?;
        match gateway.get_external_ip() {
            Ok(addr) => Some(addr),
            Err(e) => {
                warn!("GetExternalIPAddress failed: {}", e);
                None
            }
        }
    }

    fn is_mapped(&self, protocol: Protocol, port: u16) -> bool {
        let Some(gateway) = self.gateway() else {
            return false;
        };
        let igd_protocol = to_igd_protocol(protocol);

        // Walk the gateway's mapping table; the table end is signalled by an
        // error response (SpecifiedArrayIndexInvalid on conforming devices).
        for index in 0..MAX_MAPPING_ENTRIES {
            match gateway.get_generic_port_mapping_entry(index) {
                Ok(entry) => {
                    if entry.protocol == igd_protocol && entry.external_port == port {
                        return true;
                    }
                }
                Err(_) => break,
            }
        }
        false
    }

    fn open(&self, protocol: Protocol, port: u16, description: &str) -> bool {
        let Some(gateway) = self.gateway() else {
            return false;
        };
        let Some(local_ip) = local_ip_for_gateway() else {
            warn!("Could not determine local address for port mapping");
            return false;
        };
        let local_addr = SocketAddr::new(local_ip, port);

        match gateway.add_port(
            to_igd_protocol(protocol),
            port,
            local_addr,
            LEASE_DURATION_SECS,
            description,
        ) {
            Ok(()) => true,
            Err(e) => {
                warn!("AddPortMapping failed for {} {}: {}", protocol, port, e);
                false
            }
        }
    }

    fn close(&self, protocol: Protocol, port: u16) -> bool {
        let Some(gateway) = self.gateway() else {
            return false;
        };

        match gateway.remove_port(to_igd_protocol(protocol), port) {
            Ok(()) => true,
            Err(e) => {
                debug!("DeletePortMapping failed for {} {}: {}", protocol, port, e);
                false
            }
        }
    }
}
