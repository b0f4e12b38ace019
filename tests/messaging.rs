//! Messaging tests: framing round trips, dispatch, broadcast, and the
//! instance-manager facade.

use bytes::Bytes;
use instance_bus::{
    Endpoint, EndpointEvent, EventReceiver, ExitPolicy, Identity, InstanceEvent, InstanceManager,
    ManagerConfig, Mode, PeerId, Role,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

static NEXT: AtomicU64 = AtomicU64::new(0);

fn unique_tag() -> String {
    format!(
        "{} {} {}",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    )
}

fn test_identity(tag: &str) -> Identity {
    Identity::resolve("instance-bus-tests", tag, &unique_tag())
}

/// Next message the leader receives, skipping lifecycle events.
async fn next_from_follower(rx: &mut EventReceiver) -> (PeerId, Bytes) {
    loop {
        let event = timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for follower message")
            .expect("endpoint closed");
        if let EndpointEvent::MessageFromFollower(id, data) = event {
            return (id, data);
        }
    }
}

/// Next message a follower receives from the leader.
async fn next_from_leader(rx: &mut EventReceiver) -> Bytes {
    loop {
        let event = timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for leader message")
            .expect("endpoint closed");
        if let EndpointEvent::MessageFromLeader(data) = event {
            return data;
        }
    }
}

async fn spawn_leader(identity: &Identity) -> (Endpoint, EventReceiver) {
    let (endpoint, events) = Endpoint::spawn(identity.clone());
    timeout(WAIT, endpoint.wait_for_role(Role::Leader))
        .await
        .expect("timed out")
        .unwrap();
    (endpoint, events)
}

async fn spawn_follower(identity: &Identity) -> (Endpoint, EventReceiver, PeerId) {
    let (endpoint, events) = Endpoint::spawn(identity.clone());
    let id = timeout(WAIT, endpoint.wait_for_assigned_id())
        .await
        .expect("timed out")
        .unwrap();
    (endpoint, events, id)
}

#[tokio::test]
async fn request_response_round_trip() {
    let identity = test_identity("request-response");
    let (leader, mut leader_events) = spawn_leader(&identity).await;
    let (follower, mut follower_events, follower_id) = spawn_follower(&identity).await;

    follower.send_to_leader(&b"request"[..]);

    let (from_id, actual_request) = next_from_follower(&mut leader_events).await;
    assert_eq!(from_id, follower_id);
    assert_eq!(actual_request, Bytes::from_static(b"request"));

    leader.send_to_follower(from_id, &b"response"[..]);

    let actual_response = next_from_leader(&mut follower_events).await;
    assert_eq!(actual_response, Bytes::from_static(b"response"));

    leader.close();
    follower.close();
}

#[tokio::test]
async fn payload_shapes_survive_byte_exact() {
    let identity = test_identity("payload-shapes");
    let (leader, mut leader_events) = spawn_leader(&identity).await;
    let (follower, mut follower_events, follower_id) = spawn_follower(&identity).await;

    let payloads: Vec<Vec<u8>> = vec![
        Vec::new(),
        vec![0xAB],
        (0..64 * 1024).map(|i| (i % 251) as u8).collect(),
    ];

    // Back-to-back in both directions, no waiting between sends: frame
    // boundaries must neither merge nor split.
    for payload in &payloads {
        follower.send_to_leader(payload.clone());
    }
    for payload in &payloads {
        leader.send_to_follower(follower_id, payload.clone());
    }

    for expected in &payloads {
        let (_, data) = next_from_follower(&mut leader_events).await;
        assert_eq!(&data[..], &expected[..]);
    }
    for expected in &payloads {
        let data = next_from_leader(&mut follower_events).await;
        assert_eq!(&data[..], &expected[..]);
    }

    leader.close();
    follower.close();
}

#[tokio::test]
async fn broadcast_skips_excluded_follower() {
    let identity = test_identity("broadcast-exclude");
    let (leader, _leader_events) = spawn_leader(&identity).await;

    let (f1, mut e1, _id1) = spawn_follower(&identity).await;
    let (f2, mut e2, id2) = spawn_follower(&identity).await;
    let (f3, mut e3, _id3) = spawn_follower(&identity).await;
    timeout(WAIT, leader.wait_for_follower_count(3))
        .await
        .expect("timed out")
        .unwrap();

    leader.broadcast(&b"everyone but two"[..], &[id2]);

    assert_eq!(
        next_from_leader(&mut e1).await,
        Bytes::from_static(b"everyone but two")
    );
    assert_eq!(
        next_from_leader(&mut e3).await,
        Bytes::from_static(b"everyone but two")
    );
    // The excluded follower must stay silent.
    assert!(
        timeout(Duration::from_millis(300), next_from_leader(&mut e2))
            .await
            .is_err()
    );

    // An empty exclusion list reaches all three.
    leader.broadcast(&b"everyone"[..], &[]);
    for events in [&mut e1, &mut e2, &mut e3] {
        assert_eq!(next_from_leader(events).await, Bytes::from_static(b"everyone"));
    }

    leader.close();
    f1.close();
    f2.close();
    f3.close();
}

#[tokio::test]
async fn send_to_unknown_follower_is_a_noop() {
    let identity = test_identity("unknown-id");
    let (leader, mut leader_events) = spawn_leader(&identity).await;
    let (follower, mut follower_events, follower_id) = spawn_follower(&identity).await;

    // Neither an unknown id nor a stale one may disturb the endpoint.
    leader.send_to_follower(9999, &b"nobody home"[..]);

    follower.send_to_leader(&b"still alive?"[..]);
    let (from_id, data) = next_from_follower(&mut leader_events).await;
    assert_eq!(from_id, follower_id);
    assert_eq!(data, Bytes::from_static(b"still alive?"));

    leader.send_to_follower(follower_id, &b"yes"[..]);
    assert_eq!(
        next_from_leader(&mut follower_events).await,
        Bytes::from_static(b"yes")
    );

    leader.close();
    follower.close();
}

#[tokio::test]
async fn send_to_leader_from_leader_is_a_noop() {
    let identity = test_identity("leader-upstream");
    let (leader, mut leader_events) = spawn_leader(&identity).await;
    let (follower, _follower_events, follower_id) = spawn_follower(&identity).await;

    // A leader has no upstream; this must vanish silently.
    leader.send_to_leader(&b"to nobody"[..]);

    follower.send_to_leader(&b"ping"[..]);
    let (from_id, _) = next_from_follower(&mut leader_events).await;
    assert_eq!(from_id, follower_id);

    leader.close();
    follower.close();
}

#[tokio::test]
async fn manager_single_instance_manual_exit() {
    let config = ManagerConfig::new("instance-bus-tests", "manager-manual", unique_tag())
        .with_mode(Mode::SingleInstance)
        .with_exit_policy(ExitPolicy::Manual)
        .with_forward_payload(&b"--open file.txt"[..]);

    let (primary, mut primary_events) = InstanceManager::spawn(config.clone());
    timeout(WAIT, primary.endpoint().wait_for_role(Role::Leader))
        .await
        .expect("timed out")
        .unwrap();
    assert!(primary.is_primary_instance());
    assert!(!primary.is_secondary_instance());

    let (secondary, mut secondary_events) = InstanceManager::spawn(config);
    timeout(WAIT, secondary.endpoint().wait_for_role(Role::Follower))
        .await
        .expect("timed out")
        .unwrap();
    assert!(secondary.is_secondary_instance());

    // The secondary forwards its arguments and asks to exit.
    loop {
        let event = timeout(WAIT, secondary_events.recv())
            .await
            .expect("timed out waiting for exit request")
            .expect("manager closed");
        if event == InstanceEvent::ExitRequested {
            break;
        }
    }
    loop {
        let event = timeout(WAIT, primary_events.recv())
            .await
            .expect("timed out waiting for forwarded arguments")
            .expect("manager closed");
        if let InstanceEvent::MessageFromSecondary(_, data) = event {
            assert_eq!(data, Bytes::from_static(b"--open file.txt"));
            break;
        }
    }

    secondary.close();
    primary.close();
}

#[tokio::test]
async fn manager_multiple_instances_messaging() {
    let config = ManagerConfig::new("instance-bus-tests", "manager-multi", unique_tag());

    let (primary, mut primary_events) = InstanceManager::spawn(config.clone());
    timeout(WAIT, primary.endpoint().wait_for_role(Role::Leader))
        .await
        .expect("timed out")
        .unwrap();

    let (secondary, mut secondary_events) = InstanceManager::spawn(config);
    let id = timeout(WAIT, secondary.endpoint().wait_for_assigned_id())
        .await
        .expect("timed out")
        .unwrap();
    assert_eq!(primary.secondary_instance_count(), 1);

    secondary.send_to_primary(&b"ping"[..]);
    loop {
        let event = timeout(WAIT, primary_events.recv())
            .await
            .expect("timed out")
            .expect("manager closed");
        if let InstanceEvent::MessageFromSecondary(from_id, data) = event {
            assert_eq!(from_id, id);
            assert_eq!(data, Bytes::from_static(b"ping"));
            break;
        }
    }

    primary.send_to_secondary(id, &b"pong"[..]);
    loop {
        let event = timeout(WAIT, secondary_events.recv())
            .await
            .expect("timed out")
            .expect("manager closed");
        if let InstanceEvent::MessageFromPrimary(data) = event {
            assert_eq!(data, Bytes::from_static(b"pong"));
            break;
        }
    }

    primary.broadcast_to_secondaries(&b"all hands"[..], &[]);
    loop {
        let event = timeout(WAIT, secondary_events.recv())
            .await
            .expect("timed out")
            .expect("manager closed");
        if let InstanceEvent::MessageFromPrimary(data) = event {
            assert_eq!(data, Bytes::from_static(b"all hands"));
            break;
        }
    }

    secondary.close();
    primary.close();
}
