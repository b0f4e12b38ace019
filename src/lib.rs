//! # instance-bus
//!
//! Single-instance coordination and inter-instance messaging for desktop
//! and command-line applications:
//! - Leader election via an advisory file lock (released by the OS when
//!   the holder exits, crash included)
//! - Length-framed byte messaging over a Unix domain socket
//! - Automatic re-election when the leader goes away
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              Leader process              │
//! │  holds the lock, owns the listening      │
//! │  socket, tracks connected followers      │
//! └───────────┬───────────────┬──────────────┘
//!             │ frames        │ frames
//!   ┌─────────▼────┐   ┌──────▼───────┐
//!   │  Follower 1  │   │  Follower 2  │
//!   │  (same app,  │   │  (same app,  │
//!   │   later run) │   │   later run) │
//!   └──────────────┘   └──────────────┘
//! ```
//!
//! All processes constructed with the same `(organization, application,
//! version)` triple resolve the same [`Identity`], race for the same lock
//! file, and rendezvous on the same socket. Exactly one wins and becomes
//! the leader; the rest connect to it as followers. When the leader exits,
//! the fastest surviving follower takes over.
//!
//! ## Usage
//!
//! ```no_run
//! use instance_bus::{Endpoint, EndpointEvent, Identity, Role};
//!
//! #[tokio::main]
//! async fn main() {
//!     let identity = Identity::resolve("acme", "my-app", "1.0.0");
//!     let (endpoint, mut events) = Endpoint::spawn(identity);
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             EndpointEvent::RoleChanged(Role::Leader) => {
//!                 println!("this process is now the primary instance");
//!             }
//!             EndpointEvent::MessageFromFollower(id, data) => {
//!                 println!("follower {id} sent {} bytes", data.len());
//!                 endpoint.send_to_follower(id, &b"ack"[..]);
//!             }
//!             _ => {}
//!         }
//!     }
//! }
//! ```
//!
//! For single-instance enforcement (forward the arguments of a second
//! launch to the running copy, then exit), see
//! [`manager::InstanceManager`].
//!
//! Unix only: the transport is `tokio::net::UnixListener`/`UnixStream`.

pub mod common;
pub mod endpoint;
pub mod manager;

// Re-export commonly used types
pub use common::{Error, ExitPolicy, Identity, ManagerConfig, Mode, Result};
pub use endpoint::{Endpoint, EndpointEvent, EventReceiver, PeerId, Role};
pub use manager::{InstanceEvent, InstanceEventReceiver, InstanceManager};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
