use cucumber::{given, then, when};
use rallypoint_core::keys;
use rallypoint_session::{AuthorizationStatus, RelayAuthorizationCoordinator, RelayNotification};
use rallypoint_tests::RallyWorld;
use std::sync::Arc;

fn relay<'a>(world: &'a RallyWorld, name: &str) -> &'a RelayAuthorizationCoordinator {
    world
        .relays
        .get(name)
        .unwrap_or_else(|| panic!("Relay for '{}' not found", name))
}

// ===== Given Steps =====

#[given("every peer follows the relay")]
async fn every_peer_follows_relay(world: &mut RallyWorld) {
    let peers: Vec<_> = world
        .peers
        .iter()
        .map(|(name, peer)| (name.clone(), peer.clone()))
        .collect();

    for (name, peer) in peers {
        let relay = RelayAuthorizationCoordinator::new(peer, Arc::new(world.relay.clone()));
        assert!(relay.attach());
        world.relay_notifications.insert(name.clone(), relay.subscribe());
        world.relays.insert(name, relay);
    }
}

#[given(expr = "{string} publishes IP {string}")]
async fn peer_publishes_ip(world: &mut RallyWorld, name: String, ip: String) {
    let peer = world.peer(&name).clone();
    peer.set_player_data_values([(keys::PUBLIC_IP, ip)])
        .await
        .expect("Failed to publish IP");
    world.settle().await;
}

// ===== When Steps =====

#[when(expr = "{string} starts a relay session")]
async fn host_starts_relay_session(world: &mut RallyWorld, name: String) {
    let relay = relay(world, &name).clone();
    relay
        .start_session(Vec::new())
        .await
        .expect("Failed to start relay session");
    world.settle().await;
}

// ===== Then Steps =====

#[then(expr = "{string} is ready to connect")]
async fn peer_ready_to_connect(world: &mut RallyWorld, name: String) {
    assert_eq!(
        relay(world, &name).authorization_status(),
        AuthorizationStatus::Ready
    );

    let ready = world
        .take_relay_notifications(&name)
        .iter()
        .filter(|n| matches!(n, RelayNotification::ClientReadyToConnect { .. }))
        .count();
    assert_eq!(ready, 1);
}

#[then(expr = "{string} failed relay authorization")]
async fn peer_failed_authorization(world: &mut RallyWorld, name: String) {
    assert_eq!(
        relay(world, &name).authorization_status(),
        AuthorizationStatus::Failed
    );
}

#[then(expr = "{string} was never ready to connect")]
async fn peer_never_ready(world: &mut RallyWorld, name: String) {
    let notifications = world.take_relay_notifications(&name);
    assert!(!notifications
        .iter()
        .any(|n| matches!(n, RelayNotification::ClientReadyToConnect { .. })));
    assert!(notifications
        .iter()
        .any(|n| matches!(n, RelayNotification::ClientAuthorizationFailed { .. })));
}

#[then(expr = "the relay authorized {int} user(s)")]
async fn relay_authorized_users(world: &mut RallyWorld, count: usize) {
    assert_eq!(world.relay.call_count("authorize_user").await, count);
}

#[then(expr = "the relay revoked {int} user(s)")]
async fn relay_revoked_users(world: &mut RallyWorld, count: usize) {
    assert_eq!(world.relay.call_count("remove_user").await, count);
}
