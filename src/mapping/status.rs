//! Human-readable rendering of status snapshots
//!
//! Consumes the read-only [`StatusSnapshot`] produced by
//! [`query_status`](super::manager::query_status) and renders it as the lines
//! shown to the invoking operator. Any permission check on the status command
//! belongs to the host, not this crate.

use super::types::StatusSnapshot;
use std::net::{IpAddr, Ipv6Addr};
use tracing::debug;

/// Check if an IPv6 address is link-local (fe80::/10)
pub(crate) fn is_ipv6_link_local(addr: &Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}

/// Whether a host IPv6 address is worth reporting to the operator
///
/// Keeps globally meaningful addresses only; loopback, unspecified, and
/// link-local addresses can't be reached from outside. There is no way to
/// tell temporary from stable addresses here, so both are reported.
pub(crate) fn is_reportable_ipv6(addr: &Ipv6Addr) -> bool {
    !addr.is_loopback() && !addr.is_unspecified() && !is_ipv6_link_local(addr)
}

/// Enumerate the host's reportable IPv6 addresses
///
/// Skips loopback and tunnel interfaces, matching what an operator would
/// expect to hand out to players connecting over IPv6.
pub(crate) fn local_ipv6_addresses() -> Vec<Ipv6Addr> {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            debug!("Failed to enumerate network interfaces: {}", e);
            return Vec::new();
        }
    };

    interfaces
        .into_iter()
        .filter(|iface| !iface.is_loopback() && !iface.name.starts_with("tunnel"))
        .filter_map(|iface| match iface.ip() {
            IpAddr::V6(addr) if is_reportable_ipv6(&addr) => Some(addr),
            _ => None,
        })
        .collect()
}

/// Render a status snapshot as a sequence of output lines
///
/// Ports are listed in configured order, TCP group first. When the gateway is
/// unavailable a single line says so; when it is available but nothing is
/// mapped, that is reported explicitly.
pub fn render_status(snapshot: &StatusSnapshot) -> Vec<String> {
    if !snapshot.gateway_available {
        return vec!["UPnP is not available on this network.".to_string()];
    }

    let mut lines = Vec::new();

    if let Some(address) = snapshot.external_address {
        lines.push(format!("IPv4 Address: {}", address));
    }

    for address in &snapshot.local_ipv6 {
        lines.push(format!("IPv6 address: {}", address));
    }

    lines.push("The following ports are mapped:".to_string());
    for port in snapshot.ports.iter().filter(|p| p.mapped) {
        lines.push(port.spec.to_string());
    }

    if snapshot.mapped_count() == 0 {
        lines.push("No ports are mapped.".to_string());
    }

    lines
}
