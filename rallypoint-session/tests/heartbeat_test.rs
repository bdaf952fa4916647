mod support;

use rallypoint_core::{keys, DataObject, LobbyId, Player, PlayerId};
use rallypoint_session::infrastructure::LobbyUpdate;
use rallypoint_session::{LobbyDirectory, LobbyNotification, SessionRole};
use support::{advance_secs, drain, settle, LobbyFixture, START_EPOCH};

/// Join a raw player (no coordinator, so it never beats)
async fn join_ghost(fixture: &LobbyFixture, lobby_id: &LobbyId, player: Player) {
    fixture
        .service
        .directory(player.id())
        .join_lobby_by_id(lobby_id, player.clone())
        .await
        .unwrap();
    settle().await;
}

fn ghost() -> Player {
    Player::new(PlayerId::new("ghost"))
}

#[tokio::test(start_paused = true)]
async fn test_members_publish_heartbeats() {
    let fixture = LobbyFixture::new();
    let (host, clients) = fixture.hosted(1).await;
    let client_id = clients[0].local_player_id().clone();

    assert_eq!(
        host.player_data_value(&client_id, keys::HEARTBEAT_EPOCH),
        Some(START_EPOCH.to_string())
    );

    fixture.advance_clock(5);
    advance_secs(5).await;
    settle().await;

    assert_eq!(
        host.player_data_value(&client_id, keys::HEARTBEAT_EPOCH),
        Some((START_EPOCH + 5).to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_pings_directory() {
    let fixture = LobbyFixture::new();
    let (_host, _clients) = fixture.hosted(0).await;

    // Ticks at 0s, 5s and 10s
    advance_secs(11).await;

    assert_eq!(fixture.service.call_count("send_heartbeat_ping").await, 3);
}

#[tokio::test(start_paused = true)]
async fn test_stale_player_is_evicted_once() {
    let fixture = LobbyFixture::new();
    let (host, _clients) = fixture.hosted(0).await;
    let lobby_id = host.lobby_id().unwrap();
    join_ghost(
        &fixture,
        &lobby_id,
        ghost().with_data(keys::HEARTBEAT_EPOCH, DataObject::member(START_EPOCH.to_string())),
    )
    .await;
    assert_eq!(host.lobby().unwrap().players().len(), 2);

    // Timeout is 15s
    fixture.advance_clock(16);
    advance_secs(3).await;
    settle().await;

    assert_eq!(fixture.service.call_count("remove_player").await, 1);
    assert_eq!(fixture.player_count(&lobby_id).await, 1);
    assert_eq!(host.lobby().unwrap().players().len(), 1);

    advance_secs(9).await;
    assert_eq!(fixture.service.call_count("remove_player").await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_eviction_is_retried() {
    let fixture = LobbyFixture::new();
    let (host, _clients) = fixture.hosted(0).await;
    let lobby_id = host.lobby_id().unwrap();
    join_ghost(
        &fixture,
        &lobby_id,
        ghost().with_data(keys::HEARTBEAT_EPOCH, DataObject::member(START_EPOCH.to_string())),
    )
    .await;
    fixture.service.fail_next("remove_player", 1).await;

    fixture.advance_clock(20);
    advance_secs(3).await;
    assert_eq!(fixture.player_count(&lobby_id).await, 2);

    advance_secs(3).await;
    settle().await;

    assert_eq!(fixture.service.call_count("remove_player").await, 2);
    assert_eq!(fixture.player_count(&lobby_id).await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_player_without_heartbeat_is_kept() {
    let fixture = LobbyFixture::new();
    let (host, _clients) = fixture.hosted(0).await;
    let lobby_id = host.lobby_id().unwrap();
    join_ghost(&fixture, &lobby_id, ghost()).await;

    fixture.advance_clock(1_000);
    advance_secs(7).await;

    assert_eq!(fixture.service.call_count("remove_player").await, 0);
    assert_eq!(fixture.player_count(&lobby_id).await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_sleeping_player_is_kept() {
    let fixture = LobbyFixture::new();
    let (host, _clients) = fixture.hosted(0).await;
    let lobby_id = host.lobby_id().unwrap();
    join_ghost(
        &fixture,
        &lobby_id,
        ghost()
            .with_data(keys::HEARTBEAT_EPOCH, DataObject::member("0"))
            .with_data(keys::IS_SLEEPING, DataObject::member("true")),
    )
    .await;

    fixture.advance_clock(1_000);
    advance_secs(7).await;

    assert_eq!(fixture.service.call_count("remove_player").await, 0);
    assert_eq!(fixture.player_count(&lobby_id).await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_clients_never_evict() {
    let fixture = LobbyFixture::new();
    let (host, clients) = fixture.hosted(1).await;
    let lobby_id = host.lobby_id().unwrap();

    // Host goes silent but stays in the lobby
    drop(host);
    fixture.advance_clock(60);
    advance_secs(7).await;

    assert!(!clients[0].is_watchdog_running());
    assert_eq!(fixture.service.call_count("remove_player").await, 0);
    assert_eq!(fixture.player_count(&lobby_id).await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_host_transfer_moves_host_loops() {
    let fixture = LobbyFixture::new();
    let (host, clients) = fixture.hosted(1).await;
    let client = &clients[0];
    let lobby_id = host.lobby_id().unwrap();
    let mut host_notifications = host.subscribe();

    let update = LobbyUpdate {
        host_id: Some(client.local_player_id().clone()),
        ..Default::default()
    };
    fixture
        .service
        .directory(host.local_player_id())
        .update_lobby(&lobby_id, update)
        .await
        .unwrap();
    settle().await;

    assert_eq!(host.role(), SessionRole::Joined);
    assert!(!host.is_keepalive_running());
    assert!(!host.is_watchdog_running());
    assert!(host.is_heartbeat_running());
    assert!(drain(&mut host_notifications)
        .iter()
        .any(|n| matches!(n, LobbyNotification::HostEnded { .. })));

    assert_eq!(client.role(), SessionRole::Hosting);
    assert!(client.is_keepalive_running());
    assert!(client.is_watchdog_running());
}
