//! Leader endpoint
//!
//! Owns the listening socket and the registry of follower connections.
//! Anyone may connect; equivalent application identity is assumed, not
//! verified. Each connection runs its own reader and writer task; all
//! registry mutation happens here, driven by the select loop.

use crate::common::{Identity, Result};
use crate::endpoint::parser::ParseEvent;
use crate::endpoint::wire;
use crate::endpoint::{spawn_reader, spawn_writer, Command, Emitter, PeerId, ReaderEvent};
use bytes::Bytes;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct ConnectionRecord {
    writer_tx: mpsc::UnboundedSender<Bytes>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    /// Peer identifier from the handshake. Informational only; the
    /// assigned id, not the pid, addresses the connection.
    pid: Option<u64>,
    /// Past the handshake and eligible for sends.
    ready: bool,
}

pub(crate) struct LeaderEndpoint {
    listener: UnixListener,
    socket_path: PathBuf,
    registry: HashMap<PeerId, ConnectionRecord>,
    next_id: PeerId,
    conn_tx: mpsc::UnboundedSender<(PeerId, ReaderEvent)>,
    conn_rx: mpsc::UnboundedReceiver<(PeerId, ReaderEvent)>,
}

impl LeaderEndpoint {
    /// Bind the identity-derived socket. A stale socket file from a
    /// crashed leader is removed first; this cannot race a live leader
    /// because the token lock serializes us.
    pub(crate) fn bind(identity: &Identity) -> Result<Self> {
        let socket_path = identity.socket_path();
        let _ = std::fs::remove_file(&socket_path);
        let listener = UnixListener::bind(&socket_path)?;
        tracing::debug!(identity = %identity, "listening as leader");

        let (conn_tx, conn_rx) = mpsc::unbounded_channel();
        Ok(Self {
            listener,
            socket_path,
            registry: HashMap::new(),
            next_id: 1,
            conn_tx,
            conn_rx,
        })
    }

    /// Serve until the endpoint is closed. The leader never demotes
    /// while alive, so this returns only on close (or when every public
    /// handle has been dropped).
    pub(crate) async fn run(
        mut self,
        cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
        emitter: &Emitter,
    ) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _addr)) => self.register(stream),
                    Err(err) => tracing::warn!("accept failed: {err}"),
                },
                Some((id, event)) = self.conn_rx.recv() => {
                    self.on_reader_event(id, event, emitter);
                }
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::SendToFollower(id, payload)) => self.send_to(id, &payload),
                    Some(Command::Broadcast { payload, exclude }) => {
                        self.broadcast(&payload, &exclude);
                    }
                    // A leader has no upstream; silent no-op.
                    Some(Command::SendToLeader(_)) => {}
                    Some(Command::Close) | None => break,
                },
            }
        }
        self.shutdown();
    }

    fn register(&mut self, stream: UnixStream) {
        let id = self.next_id;
        self.next_id += 1;

        let (read_half, write_half) = stream.into_split();
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let writer = spawn_writer(write_half, writer_rx);
        let reader = spawn_reader(read_half, id, self.conn_tx.clone());

        self.registry.insert(
            id,
            ConnectionRecord {
                writer_tx,
                reader,
                writer,
                pid: None,
                ready: false,
            },
        );
        tracing::debug!(id, "follower connected, awaiting handshake");
    }

    fn on_reader_event(&mut self, id: PeerId, event: ReaderEvent, emitter: &Emitter) {
        match event {
            ReaderEvent::Parsed(ParseEvent::Handshake(pid)) => {
                if let Some(record) = self.registry.get_mut(&id) {
                    record.pid = Some(pid);
                    // Reply immediately with the assigned id; the
                    // connection is message-ready from here on.
                    let _ = record
                        .writer_tx
                        .send(Bytes::copy_from_slice(&wire::encode_handshake(id)));
                    record.ready = true;
                    tracing::debug!(id, pid, "follower handshake complete");
                    emitter.set_follower_count(self.ready_count());
                }
            }
            ReaderEvent::Parsed(ParseEvent::Frame(payload)) => {
                emitter.message_from_follower(id, payload);
            }
            ReaderEvent::Closed => {
                tracing::debug!(id, "follower disconnected");
                self.remove(id, emitter);
            }
            ReaderEvent::Failed(err) => {
                tracing::warn!(id, "dropping follower connection: {err}");
                self.remove(id, emitter);
            }
        }
    }

    fn remove(&mut self, id: PeerId, emitter: &Emitter) {
        if let Some(record) = self.registry.remove(&id) {
            record.reader.abort();
            // Dropping the queue lets the writer flush and exit.
            drop(record.writer_tx);
            drop(record.writer);
            if record.ready {
                emitter.set_follower_count(self.ready_count());
            }
        }
    }

    fn send_to(&self, id: PeerId, payload: &[u8]) {
        match self.registry.get(&id) {
            Some(record) if record.ready => {
                let _ = record.writer_tx.send(wire::encode_frame(payload));
            }
            _ => tracing::trace!(id, "send to unknown or still-handshaking follower dropped"),
        }
    }

    fn broadcast(&self, payload: &[u8], exclude: &[PeerId]) {
        let frame = wire::encode_frame(payload);
        for (id, record) in &self.registry {
            if record.ready && !exclude.contains(id) {
                let _ = record.writer_tx.send(frame.clone());
            }
        }
    }

    fn ready_count(&self) -> usize {
        self.registry.values().filter(|r| r.ready).count()
    }

    fn shutdown(mut self) {
        for (_, record) in self.registry.drain() {
            record.reader.abort();
            record.writer.abort();
        }
        let _ = std::fs::remove_file(&self.socket_path);
        tracing::debug!("leader endpoint shut down");
    }
}
