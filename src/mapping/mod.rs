//! Port mapping lifecycle management
//!
//! This module owns the open/refresh/close state machine for a configured set
//! of TCP and UDP ports against one UPnP gateway:
//! - `GatewayClient` - capability trait the core consumes
//! - `UpnpGateway` - real IGD-backed implementation
//! - `MappingLifecycleManager` - the lifecycle state machine
//!
//! The gateway is treated as best-effort: any call may fail, and failures are
//! reported per port without aborting the enclosing pass.

// Submodules
pub mod gateway;
pub mod hooks;
pub mod manager;
pub mod status;
pub mod types;
pub mod upnp;

// Re-export commonly used types
pub use types::{
    LifecycleState, MappingOutcome, PortSet, PortSpec, PortStatus, Protocol, RefreshPolicy,
    StatusSnapshot,
};

// Re-export main entry points
pub use gateway::GatewayClient;
pub use hooks::ServerHooks;
pub use manager::{query_status, MappingLifecycleManager};
pub use status::render_status;
pub use upnp::UpnpGateway;
