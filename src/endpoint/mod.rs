//! Endpoint role coordination
//!
//! The endpoint actor owns the election: it tries to create the
//! leadership token, becomes leader or follower accordingly, runs the
//! matching sub-endpoint, and re-runs the whole sequence whenever a
//! follower's link to the leader breaks. All state lives in one task;
//! connection reader/writer tasks talk to it over channels, and public
//! [`Endpoint`] handles are cheap clones of the command sender plus
//! watch receivers for the observable state.

pub mod parser;
pub mod token;
pub mod wire;

mod follower;
mod leader;

use crate::common::{Error, Identity, Result};
use bytes::Bytes;
use parser::{FrameParser, ParseEvent};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Identifies one follower connection on the leader. Ids are assigned
/// from a process-local counter and are never reused within the life of
/// a leader, but a new leader starts counting again.
pub type PeerId = u64;

/// The endpoint's place in the instance group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    /// Election not yet decided (initial state, and transiently after a
    /// follower loses its leader).
    #[default]
    Unknown,
    /// Holds the leadership token and the listening socket.
    Leader,
    /// Connected (or connecting) to the leader.
    Follower,
}

/// Notifications from the endpoint actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointEvent {
    RoleChanged(Role),
    /// The leader's handshake reply arrived; the leader link is now
    /// ready and `send_to_leader` will go through.
    AssignedId(PeerId),
    MessageFromLeader(Bytes),
    MessageFromFollower(PeerId, Bytes),
    FollowerCountChanged(usize),
}

/// Receiver half for [`EndpointEvent`]s, returned by [`Endpoint::spawn`].
pub type EventReceiver = mpsc::UnboundedReceiver<EndpointEvent>;

pub(crate) enum Command {
    SendToLeader(Bytes),
    SendToFollower(PeerId, Bytes),
    Broadcast { payload: Bytes, exclude: Vec<PeerId> },
    Close,
}

/// What a connection reader task observed.
pub(crate) enum ReaderEvent {
    Parsed(ParseEvent),
    Closed,
    Failed(Error),
}

/// Handle to a running endpoint actor. Clones share the same actor.
///
/// Dropping every handle closes the endpoint.
#[derive(Debug, Clone)]
pub struct Endpoint {
    cmd_tx: mpsc::UnboundedSender<Command>,
    role_rx: watch::Receiver<Role>,
    count_rx: watch::Receiver<usize>,
    assigned_rx: watch::Receiver<Option<PeerId>>,
}

impl Endpoint {
    /// Start an endpoint for `identity` and run its election.
    ///
    /// Must be called within a tokio runtime. The role decision is
    /// deferred to the actor task, so no event can fire while the
    /// caller is still constructing its own state.
    pub fn spawn(identity: Identity) -> (Endpoint, EventReceiver) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (role_tx, role_rx) = watch::channel(Role::Unknown);
        let (count_tx, count_rx) = watch::channel(0);
        let (assigned_tx, assigned_rx) = watch::channel(None);

        let emitter = Emitter {
            events: event_tx,
            role: role_tx,
            count: count_tx,
            assigned: assigned_tx,
        };
        tokio::spawn(run(identity, cmd_rx, emitter));

        (
            Endpoint {
                cmd_tx,
                role_rx,
                count_rx,
                assigned_rx,
            },
            event_rx,
        )
    }

    pub fn role(&self) -> Role {
        *self.role_rx.borrow()
    }

    /// Number of post-handshake followers. Zero unless this endpoint is
    /// the leader.
    pub fn follower_count(&self) -> usize {
        *self.count_rx.borrow()
    }

    /// The id the leader assigned to this endpoint, once the handshake
    /// reply has arrived. `None` on the leader and while disconnected.
    pub fn assigned_id(&self) -> Option<PeerId> {
        *self.assigned_rx.borrow()
    }

    /// Send a payload to the leader. Best-effort: silently dropped
    /// unless this endpoint is a follower with a completed handshake.
    pub fn send_to_leader(&self, payload: impl Into<Bytes>) {
        let _ = self.cmd_tx.send(Command::SendToLeader(payload.into()));
    }

    /// Send a payload to one follower. Best-effort: silently dropped
    /// for an unknown, still-handshaking, or disconnected id.
    pub fn send_to_follower(&self, id: PeerId, payload: impl Into<Bytes>) {
        let _ = self.cmd_tx.send(Command::SendToFollower(id, payload.into()));
    }

    /// Send a payload to every post-handshake follower not listed in
    /// `exclude`.
    pub fn broadcast(&self, payload: impl Into<Bytes>, exclude: &[PeerId]) {
        let _ = self.cmd_tx.send(Command::Broadcast {
            payload: payload.into(),
            exclude: exclude.to_vec(),
        });
    }

    /// Shut the endpoint down: unregister all connections, release the
    /// token (if leader), and end the actor task.
    pub fn close(&self) {
        let _ = self.cmd_tx.send(Command::Close);
    }

    /// Wait until the endpoint reports `role`.
    pub async fn wait_for_role(&self, role: Role) -> Result<()> {
        let mut rx = self.role_rx.clone();
        rx.wait_for(|current| *current == role)
            .await
            .map(|_| ())
            .map_err(|_| Error::EndpointClosed)
    }

    /// Wait until the follower count reaches exactly `count`.
    pub async fn wait_for_follower_count(&self, count: usize) -> Result<()> {
        let mut rx = self.count_rx.clone();
        rx.wait_for(|current| *current == count)
            .await
            .map(|_| ())
            .map_err(|_| Error::EndpointClosed)
    }

    /// Wait until the leader link is ready and return the assigned id.
    pub async fn wait_for_assigned_id(&self) -> Result<PeerId> {
        let mut rx = self.assigned_rx.clone();
        let value = rx
            .wait_for(|current| current.is_some())
            .await
            .map_err(|_| Error::EndpointClosed)?;
        (*value).ok_or(Error::EndpointClosed)
    }
}

/// Owned by the actor; fans observable state out to the event channel
/// and the watch channels, de-duplicating unchanged values.
pub(crate) struct Emitter {
    events: mpsc::UnboundedSender<EndpointEvent>,
    role: watch::Sender<Role>,
    count: watch::Sender<usize>,
    assigned: watch::Sender<Option<PeerId>>,
}

impl Emitter {
    pub(crate) fn set_role(&self, role: Role) {
        let previous = self.role.send_replace(role);
        if previous != role {
            let _ = self.events.send(EndpointEvent::RoleChanged(role));
        }
    }

    pub(crate) fn set_follower_count(&self, count: usize) {
        let previous = self.count.send_replace(count);
        if previous != count {
            let _ = self.events.send(EndpointEvent::FollowerCountChanged(count));
        }
    }

    pub(crate) fn set_assigned_id(&self, id: PeerId) {
        self.assigned.send_replace(Some(id));
        let _ = self.events.send(EndpointEvent::AssignedId(id));
    }

    pub(crate) fn clear_assigned_id(&self) {
        self.assigned.send_replace(None);
    }

    pub(crate) fn message_from_leader(&self, payload: Bytes) {
        let _ = self.events.send(EndpointEvent::MessageFromLeader(payload));
    }

    pub(crate) fn message_from_follower(&self, id: PeerId, payload: Bytes) {
        let _ = self
            .events
            .send(EndpointEvent::MessageFromFollower(id, payload));
    }
}

/// The endpoint actor: the election loop.
async fn run(identity: Identity, mut cmd_rx: mpsc::UnboundedReceiver<Command>, emitter: Emitter) {
    loop {
        // Defer each attempt by one scheduler tick. This keeps role
        // decisions off the caller's stack and paces retry loops
        // without ever blocking the runtime.
        tokio::task::yield_now().await;

        if drain_pending_close(&mut cmd_rx) {
            break;
        }

        match token::acquire(&identity.lock_path()) {
            token::Acquire::Held(token) => {
                let leader_endpoint = match leader::LeaderEndpoint::bind(&identity) {
                    Ok(endpoint) => endpoint,
                    Err(err) => {
                        tracing::warn!("failed to bind leader socket: {err}");
                        drop(token);
                        continue;
                    }
                };
                emitter.set_role(Role::Leader);
                leader_endpoint.run(&mut cmd_rx, &emitter).await;
                // A live process never gives up leadership; run returns
                // only when the endpoint is closed.
                drop(token);
                break;
            }
            token::Acquire::Attached(token_ref) => {
                emitter.set_role(Role::Follower);
                let exit = follower::run(&identity, &mut cmd_rx, &emitter).await;
                // Detach before re-running the election, so this
                // process may win creation of the next token.
                drop(token_ref);
                match exit {
                    follower::FollowerExit::Closed => break,
                    follower::FollowerExit::Restart => {
                        emitter.clear_assigned_id();
                        emitter.set_role(Role::Unknown);
                    }
                }
            }
            token::Acquire::Retry => {}
        }
    }
    tracing::debug!(identity = %identity, "endpoint actor stopped");
}

/// Between election attempts there is no link, so queued best-effort
/// sends are no-ops; only a close request matters.
fn drain_pending_close(cmd_rx: &mut mpsc::UnboundedReceiver<Command>) -> bool {
    loop {
        match cmd_rx.try_recv() {
            Ok(Command::Close) => return true,
            Ok(_) => {}
            Err(mpsc::error::TryRecvError::Empty) => return false,
            Err(mpsc::error::TryRecvError::Disconnected) => return true,
        }
    }
}

/// Read side of one connection: fill the parser, forward every decoded
/// item, and report EOF or failure. `id` tags events for the owner (the
/// follower side passes 0; it has only one connection).
pub(crate) fn spawn_reader(
    mut read: OwnedReadHalf,
    id: PeerId,
    tx: mpsc::UnboundedSender<(PeerId, ReaderEvent)>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut parser = FrameParser::new();
        let mut chunk = [0u8; 8192];
        loop {
            match read.read(&mut chunk).await {
                Ok(0) => {
                    let _ = tx.send((id, ReaderEvent::Closed));
                    break;
                }
                Ok(n) => {
                    let events = match parser.feed(&chunk[..n]) {
                        Ok(events) => events,
                        Err(err) => {
                            let _ = tx.send((id, ReaderEvent::Failed(err)));
                            break;
                        }
                    };
                    let mut owner_gone = false;
                    for event in events {
                        if tx.send((id, ReaderEvent::Parsed(event))).is_err() {
                            owner_gone = true;
                            break;
                        }
                    }
                    if owner_gone {
                        break;
                    }
                }
                Err(err) => {
                    let _ = tx.send((id, ReaderEvent::Failed(err.into())));
                    break;
                }
            }
        }
    })
}

/// Write side of one connection: drain queued chunks until the queue
/// closes or the peer goes away.
pub(crate) fn spawn_writer(
    mut write: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            if write.write_all(&chunk).await.is_err() {
                break;
            }
        }
        let _ = write.shutdown().await;
    })
}
