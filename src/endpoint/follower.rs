//! Follower endpoint
//!
//! One outbound connection to the leader's socket. Connect failures
//! during leader startup or teardown churn, and any later disconnect,
//! hand control back to the coordinator so the whole election re-runs —
//! the disconnect path is how a surviving follower becomes the next
//! leader.

use crate::common::{Error, Identity};
use crate::endpoint::parser::ParseEvent;
use crate::endpoint::wire;
use crate::endpoint::{spawn_reader, spawn_writer, Command, Emitter, PeerId, ReaderEvent};
use bytes::Bytes;
use tokio::net::UnixStream;
use tokio::sync::mpsc;

/// Why the follower stopped.
pub(crate) enum FollowerExit {
    /// Link lost or never established; re-run the election.
    Restart,
    /// The endpoint was closed.
    Closed,
}

pub(crate) async fn run(
    identity: &Identity,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    emitter: &Emitter,
) -> FollowerExit {
    let stream = match UnixStream::connect(identity.socket_path()).await {
        Ok(stream) => stream,
        Err(err) => {
            let err = Error::from(err);
            if err.is_transient_connect() {
                tracing::debug!("leader endpoint not reachable yet, re-running election: {err}");
            } else {
                tracing::warn!("connect to leader failed, re-running election: {err}");
            }
            return FollowerExit::Restart;
        }
    };
    tracing::debug!(identity = %identity, "connected to leader");

    let (read_half, write_half) = stream.into_split();
    let (conn_tx, mut conn_rx) = mpsc::unbounded_channel();
    let reader = spawn_reader(read_half, 0, conn_tx);
    let (writer_tx, writer_rx) = mpsc::unbounded_channel();
    let writer = spawn_writer(write_half, writer_rx);

    // Announce ourselves; the reply carries the id the leader assigned.
    let _ = writer_tx.send(Bytes::copy_from_slice(&wire::encode_handshake(
        std::process::id() as u64,
    )));

    let mut assigned: Option<PeerId> = None;
    let exit = loop {
        tokio::select! {
            event = conn_rx.recv() => match event {
                Some((_, ReaderEvent::Parsed(ParseEvent::Handshake(id)))) => {
                    tracing::debug!(id, "leader assigned us an id");
                    assigned = Some(id);
                    emitter.set_assigned_id(id);
                }
                Some((_, ReaderEvent::Parsed(ParseEvent::Frame(payload)))) => {
                    emitter.message_from_leader(payload);
                }
                Some((_, ReaderEvent::Closed)) => {
                    tracing::debug!("leader link closed, re-running election");
                    break FollowerExit::Restart;
                }
                Some((_, ReaderEvent::Failed(err))) => {
                    tracing::warn!("leader link failed: {err}");
                    break FollowerExit::Restart;
                }
                None => break FollowerExit::Restart,
            },
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::SendToLeader(payload)) => {
                    if assigned.is_some() {
                        let _ = writer_tx.send(wire::encode_frame(&payload));
                    } else {
                        tracing::trace!("send to leader before handshake dropped");
                    }
                }
                // Leader-only operations; silent no-ops on a follower.
                Some(Command::SendToFollower(..)) | Some(Command::Broadcast { .. }) => {}
                Some(Command::Close) | None => break FollowerExit::Closed,
            },
        }
    };

    reader.abort();
    writer.abort();
    exit
}
