pub mod change;
pub mod clock;
pub mod events;
pub mod ids;
pub mod ip_lookup_state;
pub mod keys;
pub mod liveness;
pub mod lobby;
pub mod player;
pub mod query;
pub mod relay_session;

pub use change::LobbyChange;
pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{LobbyEvent, SubscriptionState};
pub use ids::{LobbyId, PlayerId};
pub use ip_lookup_state::LobbyIpLookupState;
pub use lobby::{CoreError, Lobby, DEFAULT_MAX_PLAYERS};
pub use player::{DataObject, Player, Visibility};
pub use query::{LobbyQuery, LobbySummary};
pub use relay_session::{RelaySession, SessionUser};
