//! Collaborators owned by other services: guild and member directories

pub mod settlement;

pub use settlement::{
    ChannelSettlement, NullSettlement, SettlementEvent, SettlementSink, WebhookSettlement,
};

use std::sync::RwLock;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::core::error::{Result, WarError};
use crate::core::sync;
use crate::core::types::{GuildId, MemberId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildProfile {
    pub id: GuildId,
    pub name: String,
    pub emblem: Option<String>,
    pub level: u32,
    pub active_members: usize,
    pub roster: Vec<MemberId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberProfile {
    pub id: MemberId,
    pub username: String,
    pub level: u32,
    pub guild_id: Option<GuildId>,
}

pub trait GuildDirectory: Send + Sync {
    fn guild(&self, id: GuildId) -> Result<GuildProfile>;
}

pub trait MemberDirectory: Send + Sync {
    fn member(&self, id: MemberId) -> Result<MemberProfile>;
}

/// Directory backed by in-process maps
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    guilds: RwLock<AHashMap<GuildId, GuildProfile>>,
    members: RwLock<AHashMap<MemberId, MemberProfile>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_guild(&self, guild: GuildProfile) {
        sync::write(&self.guilds).insert(guild.id, guild);
    }

    /// Insert a member and add them to their guild's roster
    pub fn insert_member(&self, member: MemberProfile) {
        if let Some(guild_id) = member.guild_id {
            if let Some(guild) = sync::write(&self.guilds).get_mut(&guild_id) {
                if !guild.roster.contains(&member.id) {
                    guild.roster.push(member.id);
                }
            }
        }
        sync::write(&self.members).insert(member.id, member);
    }

    /// A guild with `size` active members at `member_level`
    ///
    /// Member ids are `guild_id * 1000 + n` for `n` in `1..=size`.
    pub fn seed_guild(&self, id: GuildId, name: &str, level: u32, size: usize, member_level: u32) {
        self.insert_guild(GuildProfile {
            id,
            name: name.to_string(),
            emblem: None,
            level,
            active_members: size,
            roster: Vec::new(),
        });
        for n in 1..=size as u64 {
            let member_id = MemberId(id.0 * 1000 + n);
            self.insert_member(MemberProfile {
                id: member_id,
                username: format!("{}-{}", name.to_lowercase().replace(' ', "-"), n),
                level: member_level,
                guild_id: Some(id),
            });
        }
    }
}

impl GuildDirectory for InMemoryDirectory {
    fn guild(&self, id: GuildId) -> Result<GuildProfile> {
        sync::read(&self.guilds)
            .get(&id)
            .cloned()
            .ok_or(WarError::GuildNotFound(id))
    }
}

impl MemberDirectory for InMemoryDirectory {
    fn member(&self, id: MemberId) -> Result<MemberProfile> {
        sync::read(&self.members)
            .get(&id)
            .cloned()
            .ok_or(WarError::MemberNotFound(id))
    }
}
