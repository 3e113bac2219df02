//! Host lifecycle hooks
//!
//! Thin glue between a host server process and the lifecycle manager: the
//! host calls [`ServerHooks::on_start`] once it is ready to serve and
//! [`ServerHooks::on_stopping`] when it begins shutdown. Both are no-ops when
//! the host is not running in dedicated (managed) mode, so embedded or
//! single-player style hosts can keep the hooks wired unconditionally.

use super::gateway::GatewayClient;
use super::manager::{query_status, MappingLifecycleManager};
use super::status::render_status;
use super::upnp::UpnpGateway;
use crate::config::PortsConfig;
use crate::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Lifecycle hooks for a host server process
pub struct ServerHooks {
    dedicated: bool,
    config_path: PathBuf,
    gateway: Arc<dyn GatewayClient>,
    manager: Option<MappingLifecycleManager>,
}

impl ServerHooks {
    /// Create hooks backed by the real UPnP gateway
    ///
    /// # Arguments
    /// * `config_path` - Path to the JSON port configuration
    /// * `dedicated` - Whether the host runs in dedicated (managed) mode
    pub fn new(config_path: impl Into<PathBuf>, dedicated: bool) -> Self {
        Self::with_gateway(config_path, dedicated, Arc::new(UpnpGateway::new()))
    }

    /// Create hooks with a custom gateway client
    pub fn with_gateway(
        config_path: impl Into<PathBuf>,
        dedicated: bool,
        gateway: Arc<dyn GatewayClient>,
    ) -> Self {
        Self {
            dedicated,
            config_path: config_path.into(),
            gateway,
            manager: None,
        }
    }

    /// Invoked once when the host process becomes ready to serve
    ///
    /// Reads the configuration and runs the initial mapping pass. No-op when
    /// not in dedicated mode.
    pub async fn on_start(&mut self) -> Result<()> {
        if !self.dedicated {
            return Ok(());
        }

        let config = PortsConfig::load(&self.config_path)?;
        let mut manager = MappingLifecycleManager::new(
            self.gateway.clone(),
            config.port_set(),
            config.refresh_policy(),
            config.mapping_description.clone(),
        );
        manager.start().await?;
        self.manager = Some(manager);
        Ok(())
    }

    /// Invoked once when the host process begins shutdown
    ///
    /// Cancels the refresh schedule and unmaps the configured ports. No-op
    /// when not in dedicated mode or when `on_start` never ran.
    pub async fn on_stopping(&mut self) -> Result<()> {
        if let Some(mut manager) = self.manager.take() {
            manager.stop().await?;
            info!("UPnP port mapping stopped");
        }
        Ok(())
    }

    /// Render the current mapping status for the invoking operator
    ///
    /// Backs the host's read-only status command; the host performs any
    /// permission gating before calling this.
    pub async fn status_lines(&self) -> Result<Vec<String>> {
        let Some(manager) = &self.manager else {
            return Ok(vec!["UPnP port mapping is not running.".to_string()]);
        };

        let gateway = self.gateway.clone();
        let ports = manager.ports().clone();
        let snapshot =
            tokio::task::spawn_blocking(move || query_status(gateway.as_ref(), &ports))
                .await
                .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?;

        Ok(render_status(&snapshot))
    }
}
