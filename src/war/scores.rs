//! Lock-free per-guild score accumulation

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::types::{GuildId, Side, WarSides};

#[derive(Debug)]
pub struct Scores {
    sides: WarSides,
    challenger: AtomicU64,
    defender: AtomicU64,
}

impl Scores {
    pub fn new(sides: WarSides) -> Self {
        Self {
            sides,
            challenger: AtomicU64::new(0),
            defender: AtomicU64::new(0),
        }
    }

    fn counter(&self, guild: GuildId) -> Option<&AtomicU64> {
        match self.sides.side_of(guild)? {
            Side::Challenger => Some(&self.challenger),
            Side::Defender => Some(&self.defender),
        }
    }

    /// Returns the new total, or `None` for a guild not in this war
    pub fn add(&self, guild: GuildId, points: u64) -> Option<u64> {
        let counter = self.counter(guild)?;
        Some(counter.fetch_add(points, Ordering::SeqCst).saturating_add(points))
    }

    pub fn get(&self, guild: GuildId) -> u64 {
        self.counter(guild)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn reset(&self) {
        self.challenger.store(0, Ordering::SeqCst);
        self.defender.store(0, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> BTreeMap<GuildId, u64> {
        self.sides.guilds().into_iter().map(|g| (g, self.get(g))).collect()
    }
}
