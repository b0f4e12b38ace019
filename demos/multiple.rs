//! Multiple-instances demo: every launch keeps running; lines typed on
//! any follower are relayed through the leader to all other instances.
//!
//! Run it in several terminals at once and watch the role changes as
//! you close the leader.

use instance_bus::{Endpoint, EndpointEvent, Identity, Role};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let identity = Identity::resolve("instance-bus", "multiple-demo", "1.0");
    let (endpoint, mut events) = Endpoint::spawn(identity);

    let stdin_endpoint = endpoint.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            stdin_endpoint.send_to_leader(line.into_bytes());
        }
    });

    while let Some(event) = events.recv().await {
        match event {
            EndpointEvent::RoleChanged(role) => match role {
                Role::Leader => println!("* now the leader"),
                Role::Follower => println!("* now a follower, type to chat"),
                Role::Unknown => println!("* leader lost, re-electing..."),
            },
            EndpointEvent::MessageFromFollower(id, data) => {
                println!("[{id}] {}", String::from_utf8_lossy(&data));
                // Relay to everyone else.
                endpoint.broadcast(data, &[id]);
            }
            EndpointEvent::MessageFromLeader(data) => {
                println!("{}", String::from_utf8_lossy(&data));
            }
            EndpointEvent::FollowerCountChanged(count) => {
                println!("* {count} follower(s) connected");
            }
            _ => {}
        }
    }
}
