use cucumber::{given, then, when};
use rallypoint_core::PlayerId;
use rallypoint_session::{LobbyNotification, SessionRole};
use rallypoint_tests::RallyWorld;

// ===== Given Steps =====

#[given(expr = "a lobby hosted by {string}")]
async fn lobby_hosted_by(world: &mut RallyWorld, name: String) {
    let host = world.add_peer(&name);
    let lobby = host
        .host_lobby(Default::default(), false)
        .await
        .expect("Failed to host lobby");

    world.lobby_id = Some(lobby.id().clone());
    world.settle().await;
}

#[given(expr = "{string} joins the lobby")]
async fn peer_joins_lobby(world: &mut RallyWorld, name: String) {
    let lobby_id = world.lobby_id();
    let peer = world.add_peer(&name);
    peer.join_lobby_by_id(&lobby_id)
        .await
        .expect("Failed to join lobby");
    world.settle().await;
}

#[given(expr = "{string} misses the next lobby event")]
async fn peer_misses_next_event(world: &mut RallyWorld, name: String) {
    world
        .service
        .drop_events_for(&PlayerId::new(name), 1)
        .await;
}

// ===== When Steps =====

#[when(expr = "{string} sets lobby data {string} to {string}")]
async fn peer_sets_lobby_data(world: &mut RallyWorld, name: String, key: String, value: String) {
    let peer = world.peer(&name).clone();
    let result = peer.set_lobby_data_values([(key, value)]).await;
    world.last_error = result.err().map(|e| e.to_string());
    world.settle().await;
}

#[when(expr = "{string} leaves the lobby")]
async fn peer_leaves_lobby(world: &mut RallyWorld, name: String) {
    let peer = world.peer(&name).clone();
    peer.leave_joined_lobby().await.expect("Failed to leave lobby");
    world.settle().await;
}

#[when(expr = "{string} closes the lobby")]
async fn host_closes_lobby(world: &mut RallyWorld, name: String) {
    let peer = world.peer(&name).clone();
    peer.stop_hosting(true).await.expect("Failed to close lobby");
    world.settle().await;
}

// ===== Then Steps =====

#[then("every peer caches the same lobby version")]
async fn same_version_everywhere(world: &mut RallyWorld) {
    let expected = world
        .service
        .lobby(&world.lobby_id())
        .await
        .expect("Lobby gone from directory")
        .version();

    for (name, peer) in &world.peers {
        if let Some(lobby) = peer.lobby() {
            assert_eq!(lobby.version(), expected, "Peer '{}' is out of date", name);
        }
    }
}

#[then(expr = "every peer sees {int} players")]
async fn every_peer_sees_players(world: &mut RallyWorld, count: usize) {
    for (name, peer) in &world.peers {
        let lobby = peer.lobby().unwrap_or_else(|| panic!("Peer '{}' has no lobby", name));
        assert_eq!(lobby.players().len(), count, "Peer '{}'", name);
    }
}

#[then(expr = "{string} sees lobby data {string} as {string}")]
async fn peer_sees_lobby_data(world: &mut RallyWorld, name: String, key: String, value: String) {
    assert_eq!(world.peer(&name).lobby_data_value(&key), Some(value));
}

#[then(expr = "the directory served {int} lobby fetch(es)")]
async fn directory_served_fetches(world: &mut RallyWorld, count: usize) {
    assert_eq!(world.service.call_count("get_lobby").await, count);
}

#[then(expr = "the last call failed with {string}")]
async fn last_call_failed_with(world: &mut RallyWorld, fragment: String) {
    let error = world.last_error.as_deref().expect("Last call succeeded");
    assert!(
        error.contains(&fragment),
        "Expected '{}' in '{}'",
        fragment,
        error
    );
}

#[then(expr = "{string} is hosting")]
async fn peer_is_hosting(world: &mut RallyWorld, name: String) {
    let peer = world.peer(&name);
    assert_eq!(peer.role(), SessionRole::Hosting);
    assert!(peer.is_local_player_host());
}

#[then(expr = "{string} took over as host once")]
async fn peer_took_over_once(world: &mut RallyWorld, name: String) {
    let migrations = world
        .take_notifications(&name)
        .iter()
        .filter(|n| matches!(n, LobbyNotification::Hosted { migrated: true, .. }))
        .count();
    assert_eq!(migrations, 1);
}

#[then(expr = "{string} is a member")]
async fn peer_is_member(world: &mut RallyWorld, name: String) {
    assert_eq!(world.peer(&name).role(), SessionRole::Joined);
}

#[then(expr = "{string} is not in a lobby")]
async fn peer_not_in_lobby(world: &mut RallyWorld, name: String) {
    let peer = world.peer(&name);
    assert_eq!(peer.role(), SessionRole::Idle);
    assert!(peer.lobby().is_none());
}

#[then("the lobby no longer exists")]
async fn lobby_no_longer_exists(world: &mut RallyWorld) {
    assert!(world.service.lobby(&world.lobby_id()).await.is_none());
}
