use cucumber::{given, then, when};
use rallypoint_core::{keys, DataObject, Player, PlayerId};
use rallypoint_session::LobbyDirectory;
use rallypoint_tests::{RallyWorld, START_EPOCH};

/// Join a player straight through the directory; it never beats
async fn join_silent(world: &mut RallyWorld, player: Player) {
    let lobby_id = world.lobby_id();
    world
        .service
        .directory(player.id())
        .join_lobby_by_id(&lobby_id, player.clone())
        .await
        .expect("Failed to join silent player");
    world.settle().await;
}

// ===== Given Steps =====

#[given(expr = "a silent player {string} who last beat at the start")]
async fn silent_player(world: &mut RallyWorld, name: String) {
    let player = Player::new(PlayerId::new(name))
        .with_data(keys::HEARTBEAT_EPOCH, DataObject::member(START_EPOCH.to_string()));
    join_silent(world, player).await;
}

#[given(expr = "a sleeping player {string} who last beat at the start")]
async fn sleeping_player(world: &mut RallyWorld, name: String) {
    let player = Player::new(PlayerId::new(name))
        .with_data(keys::HEARTBEAT_EPOCH, DataObject::member(START_EPOCH.to_string()))
        .with_data(keys::IS_SLEEPING, DataObject::member(keys::sleeping_flag(true)));
    join_silent(world, player).await;
}

#[given(expr = "a player {string} without heartbeat data")]
async fn player_without_heartbeat(world: &mut RallyWorld, name: String) {
    join_silent(world, Player::new(PlayerId::new(name))).await;
}

// ===== When Steps =====

#[when(expr = "{int} seconds pass")]
async fn seconds_pass(world: &mut RallyWorld, secs: u64) {
    world.pass_secs(secs).await;
    world.settle().await;
}

// ===== Then Steps =====

#[then(expr = "{string} is no longer in the lobby")]
async fn player_gone(world: &mut RallyWorld, name: String) {
    let lobby = world
        .service
        .lobby(&world.lobby_id())
        .await
        .expect("Lobby gone from directory");
    assert!(lobby.player(&PlayerId::new(name)).is_none());
}

#[then(expr = "{string} is still in the lobby")]
async fn player_still_there(world: &mut RallyWorld, name: String) {
    let lobby = world
        .service
        .lobby(&world.lobby_id())
        .await
        .expect("Lobby gone from directory");
    assert!(lobby.player(&PlayerId::new(name)).is_some());
}

#[then(expr = "the directory removed {int} player(s)")]
async fn directory_removed_players(world: &mut RallyWorld, count: usize) {
    assert_eq!(world.service.call_count("remove_player").await, count);
}
