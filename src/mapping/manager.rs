//! Port mapping lifecycle manager
//!
//! The manager owns the open/refresh/close state machine for the full
//! configured port set against one gateway:
//! - `start` runs the initial mapping pass and arms the refresh schedule
//! - a background task re-asserts mappings at a fixed period
//! - `stop` cancels the schedule, waits for quiescence, then unmaps
//!
//! Gateway failures are per-port and never abort a pass; the manager reports
//! them through outcomes and logging rather than escalating.

use super::gateway::GatewayClient;
use super::types::{
    LifecycleState, MappingOutcome, PortSet, RefreshPolicy, StatusSnapshot,
};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long `stop` waits for an in-flight refresh pass before force-cancelling
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Ownership token for the background refresh task
///
/// Exists only while the manager is Active and refresh is enabled; at most
/// one exists at a time.
struct ScheduleHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Lifecycle state machine for a configured set of port mappings
///
/// Single-use per process lifetime: `start` may be called once, and after
/// `stop` the manager stays Stopped. A new instance is required to restart.
///
/// # Example
/// ```rust,no_run
/// use std::sync::Arc;
/// use portkeeper::mapping::{MappingLifecycleManager, PortSet, RefreshPolicy, UpnpGateway};
///
/// # async fn example() -> portkeeper::Result<()> {
/// let gateway = Arc::new(UpnpGateway::new());
/// let ports = PortSet::new(vec![25565], vec![]);
/// let mut manager = MappingLifecycleManager::new(
///     gateway,
///     ports,
///     RefreshPolicy::new(30),
///     "Dedicated Server (portkeeper)",
/// );
///
/// let outcomes = manager.start().await?;
/// for outcome in &outcomes {
///     println!("{}: ok={}", outcome.spec, outcome.succeeded);
/// }
/// // ... serve ...
/// manager.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct MappingLifecycleManager {
    gateway: Arc<dyn GatewayClient>,
    ports: PortSet,
    policy: RefreshPolicy,
    description: String,
    state: LifecycleState,
    schedule: Option<ScheduleHandle>,
}

impl MappingLifecycleManager {
    /// Create a manager for the given gateway, port set, and refresh policy
    pub fn new(
        gateway: Arc<dyn GatewayClient>,
        ports: PortSet,
        policy: RefreshPolicy,
        description: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            ports,
            policy,
            description: description.into(),
            state: LifecycleState::Idle,
            schedule: None,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// The port set this manager was configured with
    pub fn ports(&self) -> &PortSet {
        &self.ports
    }

    /// Whether a background refresh schedule is currently armed
    pub fn has_schedule(&self) -> bool {
        self.schedule.is_some()
    }

    /// Run the initial mapping pass and arm the refresh schedule
    ///
    /// If no gateway answers, the manager transitions straight to Stopped and
    /// returns an empty outcome list: the condition is fatal for port
    /// forwarding but the host process continues without it. Otherwise every
    /// configured port is visited exactly once (TCP group first, configured
    /// order): a port found already mapped produces a warning outcome and is
    /// not re-opened; any other port gets one `open` attempt. Per-port
    /// failures never abort the pass.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] if the manager is not Idle.
    pub async fn start(&mut self) -> Result<Vec<MappingOutcome>> {
        if self.state != LifecycleState::Idle {
            return Err(Error::InvalidState("start requires an Idle manager"));
        }

        info!("Attempting UPnP port forwarding...");

        let gateway = self.gateway.clone();
        let available = tokio::task::spawn_blocking(move || gateway.is_available())
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?;

        if !available {
            error!(
                "UPnP is not available on this network. If you are an admin please check the \
                 settings on your router/hub"
            );
            self.state = LifecycleState::Stopped;
            return Ok(Vec::new());
        }

        let gateway = self.gateway.clone();
        let ports = self.ports.clone();
        let description = self.description.clone();
        let outcomes = tokio::task::spawn_blocking(move || {
            run_initial_pass(gateway.as_ref(), &ports, &description)
        })
        .await
        .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?;

        if self.policy.is_enabled() {
            info!(
                "Scheduling UPnP refresh every {} minutes",
                self.policy.interval_minutes
            );
            self.schedule = Some(self.arm_schedule());
        } else {
            info!("Periodic UPnP refresh is disabled (refresh interval is 0)");
        }

        self.state = LifecycleState::Active;
        Ok(outcomes)
    }

    /// Re-assert every configured mapping once
    ///
    /// Unlike the startup pass this is a blind re-assert: `open` is attempted
    /// for every port regardless of its current mapped state, because the goal
    /// is lease renewal. An unreachable gateway yields an all-failed outcome
    /// list and leaves the lifecycle state untouched; the next scheduled
    /// attempt proceeds unaffected. Idempotent and safe to invoke repeatedly.
    pub async fn refresh_pass(&self) -> Result<Vec<MappingOutcome>> {
        let gateway = self.gateway.clone();
        let ports = self.ports.clone();
        let description = self.description.clone();

        tokio::task::spawn_blocking(move || {
            run_refresh_pass(gateway.as_ref(), &ports, &description)
        })
        .await
        .map_err(|e| Error::Internal(format!("Task join error: {}", e)))
    }

    /// Cancel the refresh schedule and unmap every configured port
    ///
    /// An in-flight refresh pass is allowed to finish, bounded by a grace
    /// period; if it doesn't stop in time the task is aborted and the unmap
    /// pass proceeds anyway. Closing is advisory: every `close` failure is
    /// logged and ignored, and the manager always ends up Stopped. Calling
    /// `stop` again is a no-op.
    pub async fn stop(&mut self) -> Result<()> {
        if matches!(
            self.state,
            LifecycleState::Stopped | LifecycleState::ShuttingDown
        ) {
            return Ok(());
        }
        self.state = LifecycleState::ShuttingDown;

        if let Some(handle) = self.schedule.take() {
            info!("Stopping UPnP refresh scheduler...");
            if handle.shutdown.send(true).is_err() {
                debug!("UPnP refresh task already exited");
            }
            let mut task = handle.task;
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!("UPnP refresh task did not stop within the grace period; aborting it");
                task.abort();
            }
        }

        info!("Closing UPnP ports...");
        let gateway = self.gateway.clone();
        let ports = self.ports.clone();
        if let Err(e) =
            tokio::task::spawn_blocking(move || run_close_pass(gateway.as_ref(), &ports)).await
        {
            // Advisory only: a failed close pass must never block shutdown.
            warn!("UPnP close pass failed: {}", e);
        }

        self.state = LifecycleState::Stopped;
        Ok(())
    }

    /// Spawn the recurring refresh task
    ///
    /// The first refresh fires one full period after `start`; the initial pass
    /// has already asserted the mappings. Cancellation only prevents future
    /// ticks: a pass that is already running completes before the task sees
    /// the shutdown signal.
    fn arm_schedule(&self) -> ScheduleHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let gateway = self.gateway.clone();
        let ports = self.ports.clone();
        let description = self.description.clone();
        let period = self.policy.period();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // An interval's first tick completes immediately; consume it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let gateway = gateway.clone();
                        let ports = ports.clone();
                        let description = description.clone();
                        let pass = tokio::task::spawn_blocking(move || {
                            run_refresh_pass(gateway.as_ref(), &ports, &description)
                        });
                        if let Err(e) = pass.await {
                            warn!("UPnP refresh task failed: {}", e);
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            debug!("UPnP refresh task exited");
        });

        ScheduleHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

impl Drop for MappingLifecycleManager {
    fn drop(&mut self) {
        // Cancel the refresh task on drop; the unmap pass needs an async
        // context and only happens through stop().
        if let Some(handle) = self.schedule.take() {
            handle.task.abort();
        }
    }
}

/// Query the gateway for a read-only status snapshot
///
/// Reports gateway availability, the external address, the host's own
/// reportable IPv6 addresses, and for each configured port whether it is
/// currently mapped, in configured order (TCP group first).
/// Mutates nothing and is safe to call concurrently with a refresh pass; no
/// atomicity is promised between the two.
pub fn query_status(gateway: &dyn GatewayClient, ports: &PortSet) -> StatusSnapshot {
    if !gateway.is_available() {
        return StatusSnapshot {
            gateway_available: false,
            external_address: None,
            local_ipv6: Vec::new(),
            ports: Vec::new(),
        };
    }

    StatusSnapshot {
        gateway_available: true,
        external_address: gateway.external_address(),
        local_ipv6: super::status::local_ipv6_addresses(),
        ports: ports
            .iter()
            .map(|spec| super::types::PortStatus {
                spec,
                mapped: gateway.is_mapped(spec.protocol, spec.port),
            })
            .collect(),
    }
}

/// The startup pass: check-then-open for every configured port
fn run_initial_pass(
    gateway: &dyn GatewayClient,
    ports: &PortSet,
    description: &str,
) -> Vec<MappingOutcome> {
    ports
        .iter()
        .map(|spec| {
            if gateway.is_mapped(spec.protocol, spec.port) {
                warn!(
                    "{} port {} is already mapped. (Either another service is using it or your \
                     server did not shut down correctly!)",
                    spec.protocol, spec.port
                );
                MappingOutcome {
                    spec,
                    succeeded: false,
                    already_mapped: true,
                }
            } else if gateway.open(spec.protocol, spec.port, description) {
                info!("UPnP opened {} port {}", spec.protocol, spec.port);
                MappingOutcome {
                    spec,
                    succeeded: true,
                    already_mapped: false,
                }
            } else {
                error!("UPnP failed to open {} port {}", spec.protocol, spec.port);
                MappingOutcome {
                    spec,
                    succeeded: false,
                    already_mapped: false,
                }
            }
        })
        .collect()
}

/// The periodic pass: blind re-assert of every configured port
fn run_refresh_pass(
    gateway: &dyn GatewayClient,
    ports: &PortSet,
    description: &str,
) -> Vec<MappingOutcome> {
    info!("Refreshing UPnP port mappings...");

    if !gateway.is_available() {
        error!("UPnP is not available. Refresh failed.");
        return ports
            .iter()
            .map(|spec| MappingOutcome {
                spec,
                succeeded: false,
                already_mapped: false,
            })
            .collect();
    }

    let outcomes: Vec<MappingOutcome> = ports
        .iter()
        .map(|spec| {
            let succeeded = gateway.open(spec.protocol, spec.port, description);
            if !succeeded {
                warn!("Failed to refresh {} port {}", spec.protocol, spec.port);
            }
            MappingOutcome {
                spec,
                succeeded,
                already_mapped: false,
            }
        })
        .collect();

    let successes = outcomes.iter().filter(|o| o.succeeded).count();
    info!(
        "UPnP refresh complete: {}/{} ports refreshed successfully",
        successes,
        outcomes.len()
    );
    outcomes
}

/// The shutdown pass: best-effort close of every configured port
fn run_close_pass(gateway: &dyn GatewayClient, ports: &PortSet) {
    for spec in ports.iter() {
        if gateway.close(spec.protocol, spec.port) {
            info!("Closed {} port {}", spec.protocol, spec.port);
        } else {
            debug!("Failed to close {} port {}", spec.protocol, spec.port);
        }
    }
}
