// Entity identity - which user or group a profile operation applies to

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ProfileError;

/// Strongly-typed entity ID - prevents confusion with other numeric types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub i64);

impl EntityId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<EntityId> for i64 {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

/// Domain object types that carry custom profile fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    User,
    Group,
}

impl EntityKind {
    pub const ALL: [EntityKind; 2] = [EntityKind::User, EntityKind::Group];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Group => "group",
        }
    }

    /// Name of the field-definition source for this kind
    pub fn schema_key(&self) -> &'static str {
        match self {
            EntityKind::User => "user_fields",
            EntityKind::Group => "group_fields",
        }
    }

    /// Key the schema cache stores this kind's document under
    pub fn cache_key(&self) -> String {
        format!("profile_fields:{}", self.as_str())
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(EntityKind::User),
            "group" => Ok(EntityKind::Group),
            other => Err(ProfileError::Configuration(format!(
                "Unknown entity kind '{}'",
                other
            ))),
        }
    }
}

/// Anything that owns a profile: a user row, a group row, or a bare reference
pub trait ProfileEntity {
    fn entity_id(&self) -> EntityId;
    fn entity_kind(&self) -> EntityKind;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub id: EntityId,
    pub kind: EntityKind,
}

impl EntityRef {
    pub fn user(id: i64) -> Self {
        Self {
            id: EntityId(id),
            kind: EntityKind::User,
        }
    }

    pub fn group(id: i64) -> Self {
        Self {
            id: EntityId(id),
            kind: EntityKind::Group,
        }
    }
}

impl ProfileEntity for EntityRef {
    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn entity_kind(&self) -> EntityKind {
        self.kind
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
