//! Heartbeat bookkeeping stored in player metadata.

use crate::domain::{keys, Lobby, Player, PlayerId};

/// Last heartbeat written by `player`
///
/// `None` when the key was never written. A present but unparsable value is
/// reported as epoch 0 so the player reads as long dead.
pub fn last_heartbeat(player: &Player) -> Option<u64> {
    player
        .data_value(keys::HEARTBEAT_EPOCH)
        .map(|raw| raw.trim().parse::<u64>().unwrap_or(0))
}

/// Whether the player flagged itself as paused
pub fn is_sleeping(player: &Player) -> bool {
    player
        .data_value(keys::IS_SLEEPING)
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

/// Whether `player` missed its heartbeats at time `now` (unix seconds)
///
/// Sleeping players and players without any heartbeat are never stale.
/// A heartbeat from the future counts as fresh.
pub fn is_stale(player: &Player, now: u64, timeout_secs: u64) -> bool {
    if is_sleeping(player) {
        return false;
    }

    match last_heartbeat(player) {
        None => false,
        Some(last) => now.saturating_sub(last) >= timeout_secs,
    }
}

/// Every stale player of `lobby` except `local_id`
pub fn stale_players(
    lobby: &Lobby,
    local_id: &PlayerId,
    now: u64,
    timeout_secs: u64,
) -> Vec<PlayerId> {
    lobby
        .players()
        .iter()
        .filter(|p| p.id() != local_id)
        .filter(|p| is_stale(p, now, timeout_secs))
        .map(|p| p.id().clone())
        .collect()
}
