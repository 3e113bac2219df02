//! Common types for the port mapping module

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

/// Transport protocols a mapping can forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    /// TCP protocol
    Tcp,
    /// UDP protocol
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
        }
    }
}

/// A single configured forwarding entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortSpec {
    /// Transport protocol of the mapping
    pub protocol: Protocol,
    /// External port to forward
    pub port: u16,
}

impl PortSpec {
    /// Create a TCP port spec
    pub fn tcp(port: u16) -> Self {
        Self { protocol: Protocol::Tcp, port }
    }

    /// Create a UDP port spec
    pub fn udp(port: u16) -> Self {
        Self { protocol: Protocol::Udp, port }
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.protocol, self.port)
    }
}

/// The configured ordered list of ports to manage
///
/// Ports are visited in a fixed deterministic order: the TCP group first, then
/// the UDP group, each in configured order. Duplicate entries are not
/// deduplicated; every configured entry is visited once, independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSet {
    tcp: Vec<u16>,
    udp: Vec<u16>,
}

impl PortSet {
    /// Create a port set from the TCP and UDP port lists
    pub fn new(tcp: Vec<u16>, udp: Vec<u16>) -> Self {
        Self { tcp, udp }
    }

    /// Iterate over every configured entry, TCP group first
    pub fn iter(&self) -> impl Iterator<Item = PortSpec> + '_ {
        self.tcp
            .iter()
            .map(|&port| PortSpec::tcp(port))
            .chain(self.udp.iter().map(|&port| PortSpec::udp(port)))
    }

    /// Total number of configured entries
    pub fn len(&self) -> usize {
        self.tcp.len() + self.udp.len()
    }

    /// Whether no ports are configured
    pub fn is_empty(&self) -> bool {
        self.tcp.is_empty() && self.udp.is_empty()
    }
}

/// How often mappings are re-asserted against the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshPolicy {
    /// Minutes between refresh passes; 0 disables periodic refresh
    pub interval_minutes: u32,
}

impl RefreshPolicy {
    /// Periodic refresh disabled
    pub const DISABLED: Self = Self { interval_minutes: 0 };

    /// Create a refresh policy with the given interval in minutes
    pub fn new(interval_minutes: u32) -> Self {
        Self { interval_minutes }
    }

    /// Whether periodic refresh is enabled
    pub fn is_enabled(&self) -> bool {
        self.interval_minutes > 0
    }

    /// The refresh period as a duration
    pub fn period(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_minutes) * 60)
    }
}

/// Per-port result of an open/close/refresh attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingOutcome {
    /// The port the attempt was made for
    pub spec: PortSpec,
    /// Whether the gateway accepted the attempt
    pub succeeded: bool,
    /// Whether the port was found already mapped (startup pass only)
    pub already_mapped: bool,
}

/// The manager's lifecycle state
///
/// The manager is single-use: once Stopped there is no transition back to
/// Idle or Active, and a new instance is required to restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Constructed, `start` not yet called
    Idle,
    /// Initial pass complete; refresh schedule armed if enabled
    Active,
    /// `stop` in progress: schedule cancelled, unmap pass running
    ShuttingDown,
    /// Terminal state
    Stopped,
}

/// Mapped state of a single configured port, as reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortStatus {
    /// The configured port
    pub spec: PortSpec,
    /// Whether the gateway currently holds a mapping for it
    pub mapped: bool,
}

/// Read-only snapshot of gateway and mapping state
///
/// Ports appear in configured order: the TCP group first, then the UDP group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Whether a UPnP gateway was reachable
    pub gateway_available: bool,
    /// External address reported by the gateway, if it could be queried
    pub external_address: Option<IpAddr>,
    /// The host's own non-loopback, non-link-local IPv6 addresses
    pub local_ipv6: Vec<std::net::Ipv6Addr>,
    /// Per-port mapped state; empty when the gateway is unavailable
    pub ports: Vec<PortStatus>,
}

impl StatusSnapshot {
    /// Number of configured ports the gateway reports as mapped
    pub fn mapped_count(&self) -> usize {
        self.ports.iter().filter(|p| p.mapped).count()
    }
}
