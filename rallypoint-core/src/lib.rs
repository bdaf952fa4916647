pub mod domain;

pub use domain::{
    keys, liveness, Clock, CoreError, DataObject, Lobby, LobbyChange, LobbyEvent, LobbyId,
    LobbyIpLookupState, LobbyQuery, LobbySummary, ManualClock, Player, PlayerId, RelaySession,
    SessionUser, SubscriptionState, SystemClock, Visibility,
};
