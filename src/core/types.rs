//! Core type definitions used throughout the codebase

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wall-clock time in UTC milliseconds since the Unix epoch
pub type Millis = u64;

/// Unique identifier for wars
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WarId(pub Uuid);

impl WarId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Stable 64-bit fold of the id, used to derive per-war RNG seeds
    pub fn fold(&self) -> u64 {
        let (hi, lo) = self.0.as_u64_pair();
        hi ^ lo
    }
}

impl Default for WarId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Guild identifier, owned by the external guild directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuildId(pub u64);

impl fmt::Display for GuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Member identifier, owned by the external member directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub u64);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Territory identifier: index into the per-war territory arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TerritoryId(pub u32);

impl fmt::Display for TerritoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for war events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// Which side of a war a guild fights on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Challenger,
    Defender,
}

impl Side {
    pub fn opponent(&self) -> Side {
        match self {
            Side::Challenger => Side::Defender,
            Side::Defender => Side::Challenger,
        }
    }
}

/// The two guilds of a war
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarSides {
    pub challenger: GuildId,
    pub defender: GuildId,
}

impl WarSides {
    pub fn new(challenger: GuildId, defender: GuildId) -> Self {
        Self { challenger, defender }
    }

    pub fn side_of(&self, guild: GuildId) -> Option<Side> {
        if guild == self.challenger {
            Some(Side::Challenger)
        } else if guild == self.defender {
            Some(Side::Defender)
        } else {
            None
        }
    }

    pub fn guild(&self, side: Side) -> GuildId {
        match side {
            Side::Challenger => self.challenger,
            Side::Defender => self.defender,
        }
    }

    pub fn contains(&self, guild: GuildId) -> bool {
        self.side_of(guild).is_some()
    }

    pub fn guilds(&self) -> [GuildId; 2] {
        [self.challenger, self.defender]
    }
}

/// Normalized 2D map position, both axes in [0, 1]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_normalized(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }
}

/// Reference to the member who performed an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorRef {
    pub member_id: MemberId,
    pub display_name: String,
    pub guild_id: GuildId,
}

impl ActorRef {
    /// The guild acting as a whole, e.g. for holding income
    ///
    /// Member id 0 is never issued to a real member.
    pub fn guild(guild_id: GuildId, name: impl Into<String>) -> Self {
        Self {
            member_id: MemberId(0),
            display_name: name.into(),
            guild_id,
        }
    }
}

/// An authenticated caller, as handed to us by the session layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub member_id: MemberId,
    pub guild_id: GuildId,
}

impl Actor {
    pub fn new(member_id: MemberId, guild_id: GuildId) -> Self {
        Self { member_id, guild_id }
    }
}
