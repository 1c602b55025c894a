//! Event role types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Role a registrant holds at the event. A registrant may hold several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventRole {
    Participant,
    Judge,
    Mentor,
}

impl EventRole {
    pub const ALL: [EventRole; 3] = [Self::Participant, Self::Judge, Self::Mentor];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Participant => "participant",
            Self::Judge => "judge",
            Self::Mentor => "mentor",
        }
    }
}

impl fmt::Display for EventRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for EventRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "participant" => Ok(Self::Participant),
            "judge" => Ok(Self::Judge),
            "mentor" => Ok(Self::Mentor),
            other => Err(UnknownRole(other.to_owned())),
        }
    }
}

/// Non-exclusive role flags stored on a registrant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleFlags {
    pub participant: bool,
    pub judge: bool,
    pub mentor: bool,
}

impl RoleFlags {
    pub fn from_roles<I>(roles: I) -> Self
    where
        I: IntoIterator<Item = EventRole>,
    {
        roles.into_iter().fold(Self::default(), |flags, role| flags.with(role))
    }

    pub fn with(mut self, role: EventRole) -> Self {
        match role {
            EventRole::Participant => self.participant = true,
            EventRole::Judge => self.judge = true,
            EventRole::Mentor => self.mentor = true,
        }
        self
    }

    pub fn contains(&self, role: EventRole) -> bool {
        match role {
            EventRole::Participant => self.participant,
            EventRole::Judge => self.judge,
            EventRole::Mentor => self.mentor,
        }
    }

    /// Set union: a role held by either side is held by the result.
    pub fn union(self, other: Self) -> Self {
        Self {
            participant: self.participant || other.participant,
            judge: self.judge || other.judge,
            mentor: self.mentor || other.mentor,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.participant || self.judge || self.mentor)
    }

    /// Held roles in declaration order.
    pub fn roles(&self) -> Vec<EventRole> {
        EventRole::ALL
            .into_iter()
            .filter(|role| self.contains(*role))
            .collect()
    }
}
