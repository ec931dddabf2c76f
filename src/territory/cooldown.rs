//! Per-territory action cooldowns
//!
//! A lock-by-expiry: once an action resolves, the territory refuses further
//! actions until the window passes. Callers hold the territory's mutex while
//! checking and locking, which is what makes "first to pass the check wins"
//! hold for simultaneous arrivals.

use std::sync::Mutex;

use ahash::AHashMap;

use crate::core::config::CooldownScope;
use crate::core::error::{Result, WarError};
use crate::core::sync;
use crate::core::types::{GuildId, Millis, TerritoryId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CooldownKey {
    territory: TerritoryId,
    /// Only set for per-guild scope
    guild: Option<GuildId>,
}

#[derive(Debug)]
pub struct CooldownTracker {
    scope: CooldownScope,
    expiries: Mutex<AHashMap<CooldownKey, Millis>>,
}

impl CooldownTracker {
    pub fn new(scope: CooldownScope) -> Self {
        Self {
            scope,
            expiries: Mutex::new(AHashMap::new()),
        }
    }

    pub fn scope(&self) -> CooldownScope {
        self.scope
    }

    fn key(&self, territory: TerritoryId, guild: GuildId) -> CooldownKey {
        CooldownKey {
            territory,
            guild: match self.scope {
                CooldownScope::Territory => None,
                CooldownScope::PerGuild => Some(guild),
            },
        }
    }

    /// Milliseconds left on the lock, if any
    pub fn remaining(&self, territory: TerritoryId, guild: GuildId, now: Millis) -> Option<Millis> {
        let key = self.key(territory, guild);
        sync::lock(&self.expiries)
            .get(&key)
            .filter(|&&expires| expires > now)
            .map(|&expires| expires - now)
    }

    pub fn is_locked(&self, territory: TerritoryId, guild: GuildId, now: Millis) -> bool {
        self.remaining(territory, guild, now).is_some()
    }

    /// Fail with `CooldownActive` while the territory is locked
    pub fn check(&self, territory: TerritoryId, guild: GuildId, now: Millis) -> Result<()> {
        match self.remaining(territory, guild, now) {
            Some(remaining_ms) => Err(WarError::CooldownActive {
                territory,
                remaining_ms,
            }),
            None => Ok(()),
        }
    }

    pub fn lock(&self, territory: TerritoryId, guild: GuildId, now: Millis, duration: Millis) {
        let key = self.key(territory, guild);
        sync::lock(&self.expiries).insert(key, now.saturating_add(duration));
    }

    /// Drop expired entries; returns how many were removed
    pub fn purge(&self, now: Millis) -> usize {
        let mut expiries = sync::lock(&self.expiries);
        let before = expiries.len();
        expiries.retain(|_, expires| *expires > now);
        before - expiries.len()
    }

    pub fn len(&self) -> usize {
        sync::lock(&self.expiries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIVE_MIN: Millis = 300_000;

    #[test]
    fn test_lock_blocks_every_guild_by_default() {
        let tracker = CooldownTracker::new(CooldownScope::Territory);
        tracker.lock(TerritoryId(1), GuildId(1), 1_000, FIVE_MIN);

        assert!(tracker.is_locked(TerritoryId(1), GuildId(1), 1_001));
        assert!(tracker.is_locked(TerritoryId(1), GuildId(2), 1_001));
        assert!(!tracker.is_locked(TerritoryId(2), GuildId(1), 1_001));

        let err = tracker.check(TerritoryId(1), GuildId(2), 2_000).unwrap_err();
        assert!(matches!(
            err,
            WarError::CooldownActive { remaining_ms, .. } if remaining_ms == FIVE_MIN - 1_000
        ));
    }

    #[test]
    fn test_lock_expires() {
        let tracker = CooldownTracker::new(CooldownScope::Territory);
        tracker.lock(TerritoryId(1), GuildId(1), 0, FIVE_MIN);
        assert!(tracker.is_locked(TerritoryId(1), GuildId(1), FIVE_MIN - 1));
        assert!(!tracker.is_locked(TerritoryId(1), GuildId(1), FIVE_MIN));
    }

    #[test]
    fn test_per_guild_scope() {
        let tracker = CooldownTracker::new(CooldownScope::PerGuild);
        tracker.lock(TerritoryId(1), GuildId(1), 0, FIVE_MIN);
        assert!(tracker.is_locked(TerritoryId(1), GuildId(1), 10));
        assert!(!tracker.is_locked(TerritoryId(1), GuildId(2), 10));
    }

    #[test]
    fn test_purge_removes_expired() {
        let tracker = CooldownTracker::new(CooldownScope::Territory);
        tracker.lock(TerritoryId(1), GuildId(1), 0, 100);
        tracker.lock(TerritoryId(2), GuildId(1), 0, 1_000);
        assert_eq!(tracker.purge(500), 1);
        assert_eq!(tracker.len(), 1);
    }
}
