use crate::domain::PlayerId;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Who may read a metadata entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Visibility {
    /// Readable by anyone browsing the directory
    Public,
    /// Readable by lobby members only
    Member,
    /// Readable by the owning player only
    Private,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Public => write!(f, "Public"),
            Visibility::Member => write!(f, "Member"),
            Visibility::Private => write!(f, "Private"),
        }
    }
}

/// Single entry of a lobby or player metadata bag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DataObject {
    pub value: String,
    pub visibility: Visibility,
}

impl DataObject {
    pub fn new(value: impl Into<String>, visibility: Visibility) -> Self {
        Self {
            value: value.into(),
            visibility,
        }
    }

    /// Member-visible entry (the visibility of every well-known key)
    pub fn member(value: impl Into<String>) -> Self {
        Self::new(value, Visibility::Member)
    }
}

/// Lobby member as seen through the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Player {
    id: PlayerId,
    #[serde(default)]
    data: HashMap<String, DataObject>,
}

impl Player {
    pub fn new(id: PlayerId) -> Self {
        Self {
            id,
            data: HashMap::new(),
        }
    }

    /// Builder-style metadata seed
    pub fn with_data(mut self, key: impl Into<String>, data: DataObject) -> Self {
        self.data.insert(key.into(), data);
        self
    }

    pub fn id(&self) -> &PlayerId {
        &self.id
    }

    pub fn data(&self) -> &HashMap<String, DataObject> {
        &self.data
    }

    /// Value stored under `key`, if any
    pub fn data_value(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(|d| d.value.as_str())
    }

    /// Set or remove (`None`) a metadata entry
    pub(crate) fn set_data(&mut self, key: &str, data: Option<DataObject>) {
        match data {
            Some(data) => {
                self.data.insert(key.to_string(), data);
            }
            None => {
                self.data.remove(key);
            }
        }
    }
}
