//! Single-instance demo: the first launch stays running as the primary
//! and prints whatever later launches forward; every later launch hands
//! its arguments over and exits.
//!
//! ```bash
//! cargo run --example single            # terminal 1: primary
//! cargo run --example single -- a b c   # terminal 2: forwards "a b c", exits
//! ```

use instance_bus::{ExitPolicy, InstanceEvent, InstanceManager, ManagerConfig, Mode};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = ManagerConfig::new("instance-bus", "single-demo", "1.0")
        .with_mode(Mode::SingleInstance)
        .with_exit_policy(ExitPolicy::Auto);
    let (manager, mut events) = InstanceManager::spawn(config);

    // A secondary instance never reaches the loop below: the manager
    // forwards its arguments to the primary and exits the process.
    while let Some(event) = events.recv().await {
        match event {
            InstanceEvent::RoleChanged => {
                if manager.is_primary_instance() {
                    println!("primary instance up, waiting for forwarded arguments...");
                }
            }
            InstanceEvent::MessageFromSecondary(id, data) => {
                println!(
                    "launch #{id} forwarded: {:?}",
                    String::from_utf8_lossy(&data)
                );
            }
            _ => {}
        }
    }
}
