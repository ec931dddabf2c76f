//! Per-war roster of members allowed to act

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::core::error::{Result, WarError};
use crate::core::sync;
use crate::core::types::{Actor, ActorRef, GuildId, MemberId, Millis, WarSides};
use crate::directory::MemberProfile;

/// A registered member and what they contributed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantEntry {
    pub member_id: MemberId,
    pub guild_id: GuildId,
    pub display_name: String,
    pub registered_at: Millis,
    pub points: u64,
    pub kills: u32,
    pub boss_defeats: u32,
    pub captures: u32,
    pub attacks: u32,
    /// Total troops added through reinforcement
    pub reinforcements: u64,
}

impl ParticipantEntry {
    fn new(profile: &MemberProfile, guild_id: GuildId, registered_at: Millis) -> Self {
        Self {
            member_id: profile.id,
            guild_id,
            display_name: profile.username.clone(),
            registered_at,
            points: 0,
            kills: 0,
            boss_defeats: 0,
            captures: 0,
            attacks: 0,
            reinforcements: 0,
        }
    }

    pub fn actor_ref(&self) -> ActorRef {
        ActorRef {
            member_id: self.member_id,
            display_name: self.display_name.clone(),
            guild_id: self.guild_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Registered,
    AlreadyRegistered,
}

#[derive(Debug)]
pub struct ParticipantRegistry {
    sides: WarSides,
    max_per_guild: usize,
    min_member_level: u32,
    entries: RwLock<BTreeMap<MemberId, ParticipantEntry>>,
}

impl ParticipantRegistry {
    pub fn new(sides: WarSides, max_per_guild: usize, min_member_level: u32) -> Self {
        Self {
            sides,
            max_per_guild,
            min_member_level,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn max_per_guild(&self) -> usize {
        self.max_per_guild
    }

    /// Register `member` for `guild`
    ///
    /// The capacity check and insert happen under one write lock, so a full
    /// roster can never be overfilled by concurrent registrations.
    pub fn register(&self, guild: GuildId, member: &MemberProfile, now: Millis) -> Result<Registration> {
        if !self.sides.contains(guild) {
            return Err(WarError::NotEligible(format!(
                "guild {} is not a party to this war",
                guild
            )));
        }
        if member.guild_id != Some(guild) {
            return Err(WarError::NotEligible(format!(
                "member {} does not belong to guild {}",
                member.id, guild
            )));
        }
        if member.level < self.min_member_level {
            return Err(WarError::NotEligible(format!(
                "member {} is level {}, wars require level {}",
                member.id, member.level, self.min_member_level
            )));
        }

        let mut entries = sync::write(&self.entries);
        if entries.contains_key(&member.id) {
            return Ok(Registration::AlreadyRegistered);
        }
        let count = entries.values().filter(|e| e.guild_id == guild).count();
        if count >= self.max_per_guild {
            return Err(WarError::CapacityExceeded {
                guild,
                max: self.max_per_guild,
            });
        }
        entries.insert(member.id, ParticipantEntry::new(member, guild, now));
        Ok(Registration::Registered)
    }

    pub fn is_participant(&self, guild: GuildId, member: MemberId) -> bool {
        sync::read(&self.entries)
            .get(&member)
            .is_some_and(|e| e.guild_id == guild)
    }

    /// Resolve an authenticated caller to a registered participant
    pub fn require(&self, actor: Actor) -> Result<ActorRef> {
        sync::read(&self.entries)
            .get(&actor.member_id)
            .filter(|e| e.guild_id == actor.guild_id)
            .map(ParticipantEntry::actor_ref)
            .ok_or(WarError::NotParticipant(actor.member_id))
    }

    pub fn get(&self, member: MemberId) -> Option<ParticipantEntry> {
        sync::read(&self.entries).get(&member).cloned()
    }

    /// Update a participant's stats in place
    pub fn record(&self, member: MemberId, update: impl FnOnce(&mut ParticipantEntry)) {
        if let Some(entry) = sync::write(&self.entries).get_mut(&member) {
            update(entry);
        }
    }

    pub fn count(&self, guild: GuildId) -> usize {
        sync::read(&self.entries)
            .values()
            .filter(|e| e.guild_id == guild)
            .count()
    }

    pub fn entries(&self, guild: GuildId) -> Vec<ParticipantEntry> {
        sync::read(&self.entries)
            .values()
            .filter(|e| e.guild_id == guild)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<ParticipantEntry> {
        sync::read(&self.entries).values().cloned().collect()
    }

    /// Member ids per guild, both guilds always present
    pub fn rosters(&self) -> BTreeMap<GuildId, Vec<MemberId>> {
        let mut rosters: BTreeMap<GuildId, Vec<MemberId>> = self
            .sides
            .guilds()
            .into_iter()
            .map(|g| (g, Vec::new()))
            .collect();
        for entry in sync::read(&self.entries).values() {
            rosters.entry(entry.guild_id).or_default().push(entry.member_id);
        }
        rosters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: u64, guild: u64, level: u32) -> MemberProfile {
        MemberProfile {
            id: MemberId(id),
            username: format!("m{}", id),
            level,
            guild_id: Some(GuildId(guild)),
        }
    }

    fn registry(max: usize) -> ParticipantRegistry {
        ParticipantRegistry::new(WarSides::new(GuildId(1), GuildId(2)), max, 30)
    }

    #[test]
    fn test_register_and_lookup() {
        let reg = registry(50);
        assert_eq!(
            reg.register(GuildId(1), &member(10, 1, 30), 0).unwrap(),
            Registration::Registered
        );
        assert!(reg.is_participant(GuildId(1), MemberId(10)));
        assert!(!reg.is_participant(GuildId(2), MemberId(10)));
        let actor_ref = reg.require(Actor::new(MemberId(10), GuildId(1))).unwrap();
        assert_eq!(actor_ref.display_name, "m10");
    }

    #[test]
    fn test_register_twice_is_noop() {
        let reg = registry(1);
        reg.register(GuildId(1), &member(10, 1, 40), 0).unwrap();
        assert_eq!(
            reg.register(GuildId(1), &member(10, 1, 40), 5).unwrap(),
            Registration::AlreadyRegistered
        );
        assert_eq!(reg.count(GuildId(1)), 1);
    }

    #[test]
    fn test_capacity_is_per_guild() {
        let reg = registry(2);
        reg.register(GuildId(1), &member(10, 1, 40), 0).unwrap();
        reg.register(GuildId(1), &member(11, 1, 40), 0).unwrap();
        let err = reg.register(GuildId(1), &member(12, 1, 40), 0).unwrap_err();
        assert!(matches!(err, WarError::CapacityExceeded { max: 2, .. }));
        assert!(reg.register(GuildId(2), &member(20, 2, 40), 0).is_ok());
    }

    #[test]
    fn test_eligibility() {
        let reg = registry(50);
        assert_eq!(
            reg.register(GuildId(1), &member(10, 1, 29), 0).unwrap_err().code(),
            "NOT_ELIGIBLE"
        );
        assert_eq!(
            reg.register(GuildId(1), &member(10, 2, 50), 0).unwrap_err().code(),
            "NOT_ELIGIBLE"
        );
        assert_eq!(
            reg.register(GuildId(3), &member(10, 3, 50), 0).unwrap_err().code(),
            "NOT_ELIGIBLE"
        );
    }

    #[test]
    fn test_require_rejects_wrong_guild() {
        let reg = registry(50);
        reg.register(GuildId(1), &member(10, 1, 40), 0).unwrap();
        assert!(matches!(
            reg.require(Actor::new(MemberId(10), GuildId(2))),
            Err(WarError::NotParticipant(MemberId(10)))
        ));
    }

    #[test]
    fn test_concurrent_registration_respects_capacity() {
        use std::sync::Arc;
        let reg = Arc::new(registry(5));
        let handles: Vec<_> = (0..20u64)
            .map(|i| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || reg.register(GuildId(1), &member(100 + i, 1, 40), 0).is_ok())
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 5);
        assert_eq!(reg.count(GuildId(1)), 5);
    }

    #[test]
    fn test_record_updates_stats() {
        let reg = registry(50);
        reg.register(GuildId(1), &member(10, 1, 40), 0).unwrap();
        reg.record(MemberId(10), |e| {
            e.kills += 1;
            e.points += 10;
        });
        let entry = reg.get(MemberId(10)).unwrap();
        assert_eq!((entry.kills, entry.points), (1, 10));
        assert_eq!(reg.rosters()[&GuildId(2)], Vec::<MemberId>::new());
    }
}
