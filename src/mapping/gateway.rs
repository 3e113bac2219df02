//! Gateway capability consumed by the lifecycle manager

use super::types::Protocol;
use std::net::IpAddr;

/// The set of gateway operations the lifecycle manager needs.
///
/// Every call is blocking network I/O and individually fallible. Failure is
/// reported by returning `false` or `None` rather than an error: against a
/// best-effort protocol like UPnP IGD, a refused or unanswered request is a
/// normal, expected outcome, and the caller decides what to do with it per
/// port. Implementations should bound their own latency; the manager does not
/// impose a deadline on individual calls.
pub trait GatewayClient: Send + Sync {
    /// Whether a gateway is present and answering on this network
    fn is_available(&self) -> bool;

    /// The external (public) address of the gateway, if it can be queried
    fn external_address(&self) -> Option<IpAddr>;

    /// Whether the gateway currently holds a mapping for this port
    fn is_mapped(&self, protocol: Protocol, port: u16) -> bool;

    /// Request a mapping for this port; `description` is shown in the router UI
    fn open(&self, protocol: Protocol, port: u16, description: &str) -> bool;

    /// Remove the mapping for this port
    fn close(&self, protocol: Protocol, port: u16) -> bool;
}
