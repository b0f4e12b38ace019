//! Instance manager
//!
//! Maps the endpoint's leader/follower roles onto primary/secondary
//! instance semantics and applies the single-instance exit policy: when
//! only one copy of the application may run, a secondary launch forwards
//! its invocation arguments to the primary and then terminates (or asks
//! the application to).

use crate::common::{ExitPolicy, Identity, ManagerConfig, Mode};
use crate::endpoint::{Endpoint, EndpointEvent, PeerId, Role};
use bytes::Bytes;
use std::time::Duration;
use tokio::sync::mpsc;

/// Notifications from the instance manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceEvent {
    /// This process changed between primary, secondary, and undecided.
    RoleChanged,
    /// A message from the primary instance (received on secondaries).
    MessageFromPrimary(Bytes),
    /// A message from a secondary instance (received on the primary).
    MessageFromSecondary(PeerId, Bytes),
    /// Single-instance mode with [`ExitPolicy::Manual`]: this redundant
    /// secondary has forwarded its arguments and should now exit.
    ExitRequested,
}

/// Receiver half for [`InstanceEvent`]s.
pub type InstanceEventReceiver = mpsc::UnboundedReceiver<InstanceEvent>;

/// Delay between queueing the forwarded arguments and terminating under
/// [`ExitPolicy::Auto`], giving the writer task time to flush. Delivery
/// stays best-effort; there are no acknowledgements to wait for.
const AUTO_EXIT_FLUSH: Duration = Duration::from_millis(100);

/// High-level facade over [`Endpoint`] with single-instance enforcement.
#[derive(Debug)]
pub struct InstanceManager {
    endpoint: Endpoint,
    mode: Mode,
    exit_policy: ExitPolicy,
}

impl InstanceManager {
    /// Start the manager and the underlying endpoint.
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn(config: ManagerConfig) -> (InstanceManager, InstanceEventReceiver) {
        let identity = Identity::resolve(&config.organization, &config.application, &config.version);
        let (endpoint, mut endpoint_events) = Endpoint::spawn(identity);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let manager = InstanceManager {
            endpoint: endpoint.clone(),
            mode: config.mode,
            exit_policy: config.exit_policy,
        };

        let forward_payload = config.resolve_forward_payload();
        tokio::spawn(async move {
            while let Some(event) = endpoint_events.recv().await {
                match event {
                    EndpointEvent::RoleChanged(_) => {
                        let _ = event_tx.send(InstanceEvent::RoleChanged);
                    }
                    EndpointEvent::AssignedId(_) => {
                        // The leader link just became ready: this is the
                        // earliest point a forwarded message cannot be
                        // dropped for want of a handshake.
                        if config.mode == Mode::SingleInstance {
                            endpoint.send_to_leader(forward_payload.clone());
                            match config.exit_policy {
                                ExitPolicy::Auto => {
                                    tokio::time::sleep(AUTO_EXIT_FLUSH).await;
                                    tracing::info!(
                                        "redundant secondary instance exiting (single-instance mode)"
                                    );
                                    std::process::exit(0);
                                }
                                ExitPolicy::Manual => {
                                    let _ = event_tx.send(InstanceEvent::ExitRequested);
                                }
                            }
                        }
                    }
                    EndpointEvent::MessageFromLeader(data) => {
                        let _ = event_tx.send(InstanceEvent::MessageFromPrimary(data));
                    }
                    EndpointEvent::MessageFromFollower(id, data) => {
                        let _ = event_tx.send(InstanceEvent::MessageFromSecondary(id, data));
                    }
                    // Surfaced through secondary_instance_count() instead.
                    EndpointEvent::FollowerCountChanged(_) => {}
                }
            }
        });

        (manager, event_rx)
    }

    pub fn is_primary_instance(&self) -> bool {
        self.endpoint.role() == Role::Leader
    }

    pub fn is_secondary_instance(&self) -> bool {
        self.endpoint.role() == Role::Follower
    }

    /// Number of secondary instances currently connected to this
    /// (primary) instance.
    pub fn secondary_instance_count(&self) -> usize {
        self.endpoint.follower_count()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn exit_policy(&self) -> ExitPolicy {
        self.exit_policy
    }

    /// Send a message to the primary instance. Only meaningful on a
    /// secondary; silently dropped otherwise.
    pub fn send_to_primary(&self, data: impl Into<Bytes>) {
        if self.is_secondary_instance() {
            self.endpoint.send_to_leader(data);
        }
    }

    /// Send a message to one secondary instance. Only meaningful on the
    /// primary; silently dropped otherwise.
    pub fn send_to_secondary(&self, id: PeerId, data: impl Into<Bytes>) {
        if self.is_primary_instance() {
            self.endpoint.send_to_follower(id, data);
        }
    }

    /// Send a message to every connected secondary except those listed.
    pub fn broadcast_to_secondaries(&self, data: impl Into<Bytes>, exclude: &[PeerId]) {
        if self.is_primary_instance() {
            self.endpoint.broadcast(data, exclude);
        }
    }

    /// Access the underlying endpoint (role waits, assigned id, ...).
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn close(&self) {
        self.endpoint.close();
    }
}
