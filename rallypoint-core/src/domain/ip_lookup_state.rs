use crate::domain::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Progress of the host-driven public IP collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LobbyIpLookupState {
    #[default]
    Idle,
    /// Members must publish their public IP
    RequestingInfo,
    Complete,
}

impl LobbyIpLookupState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LobbyIpLookupState::Idle => "Idle",
            LobbyIpLookupState::RequestingInfo => "RequestingInfo",
            LobbyIpLookupState::Complete => "Complete",
        }
    }
}

impl fmt::Display for LobbyIpLookupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LobbyIpLookupState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Idle" => Ok(LobbyIpLookupState::Idle),
            "RequestingInfo" => Ok(LobbyIpLookupState::RequestingInfo),
            "Complete" => Ok(LobbyIpLookupState::Complete),
            other => Err(CoreError::InvalidLookupState(other.to_string())),
        }
    }
}
