//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use guild_war::archive::{MemoryArchiveStore, MemoryJournal};
use guild_war::core::clock::{Clock, ManualClock};
use guild_war::core::config::WarConfig;
use guild_war::core::types::{Actor, GuildId, MemberId, Millis, WarId};
use guild_war::directory::{ChannelSettlement, InMemoryDirectory, SettlementEvent};
use guild_war::war::{RngFactory, WarManager};
use rand::rngs::mock::StepRng;
use rand::RngCore;
use tokio::sync::mpsc::UnboundedReceiver;

pub const START: Millis = 1_700_000_000_000;
pub const HOUR: Millis = 3600 * 1000;
pub const DAY: Millis = 24 * HOUR;
pub const COOLDOWN: Millis = 300 * 1000;
/// Default spacing of holding passes
pub const HOLDING: Millis = 300 * 1000;

pub const RED: GuildId = GuildId(1);
pub const BLUE: GuildId = GuildId(2);
pub const MEMBERS: u64 = 12;

/// Every roll is 0.0, so every attack succeeds
pub fn always_succeed() -> RngFactory {
    Arc::new(|_: WarId| -> Box<dyn RngCore + Send> { Box::new(StepRng::new(0, 0)) })
}

/// Every roll is just below 1.0, so every attack fails
pub fn always_fail() -> RngFactory {
    Arc::new(|_: WarId| -> Box<dyn RngCore + Send> { Box::new(StepRng::new(u64::MAX, 0)) })
}

/// Rolls 0.0 while the switch is off and just under 1.0 while it is on
pub struct SwitchRng {
    fail: Arc<AtomicBool>,
}

impl RngCore for SwitchRng {
    fn next_u32(&mut self) -> u32 {
        self.next_u64() as u32
    }

    fn next_u64(&mut self) -> u64 {
        if self.fail.load(Ordering::SeqCst) {
            u64::MAX
        } else {
            0
        }
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let byte = if self.fail.load(Ordering::SeqCst) { 0xFF } else { 0 };
        dest.fill(byte);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

/// Attacks succeed until the returned switch is set
pub fn switchable() -> (RngFactory, Arc<AtomicBool>) {
    let fail = Arc::new(AtomicBool::new(false));
    let switch = Arc::clone(&fail);
    let factory: RngFactory = Arc::new(move |_: WarId| -> Box<dyn RngCore + Send> {
        Box::new(SwitchRng {
            fail: Arc::clone(&fail),
        })
    });
    (factory, switch)
}

pub fn red(n: u64) -> Actor {
    Actor::new(MemberId(RED.0 * 1000 + n), RED)
}

pub fn blue(n: u64) -> Actor {
    Actor::new(MemberId(BLUE.0 * 1000 + n), BLUE)
}

pub struct Harness {
    pub manager: Arc<WarManager>,
    pub clock: Arc<ManualClock>,
    pub directory: Arc<InMemoryDirectory>,
    pub journal: Arc<MemoryJournal>,
    pub archives: Arc<MemoryArchiveStore>,
    pub settlement: UnboundedReceiver<SettlementEvent>,
}

impl Harness {
    pub fn new(config: WarConfig, rng: RngFactory) -> Self {
        let directory = Arc::new(InMemoryDirectory::new());
        directory.seed_guild(RED, "Red Banner", 12, MEMBERS as usize, 40);
        directory.seed_guild(BLUE, "Blue Tide", 14, MEMBERS as usize, 40);
        let clock = Arc::new(ManualClock::new(START));
        let journal = Arc::new(MemoryJournal::new());
        let archives = Arc::new(MemoryArchiveStore::new());
        let (sink, settlement) = ChannelSettlement::channel();
        let manager = WarManager::builder(config, directory.clone(), directory.clone())
            .clock(clock.clone())
            .journal(journal.clone())
            .archive_store(archives.clone())
            .settlement(Arc::new(sink))
            .rng_factory(rng)
            .build()
            .unwrap();
        Self {
            manager: Arc::new(manager),
            clock,
            directory,
            journal,
            archives,
            settlement,
        }
    }

    pub fn now(&self) -> Millis {
        self.clock.now_ms()
    }

    pub fn tick(&self) -> guild_war::war::TickReport {
        self.manager.tick(self.clock.now_ms())
    }

    /// Declare Red on Blue and register `per_side` members of each guild
    pub fn preparing_war(&self, per_side: u64) -> WarId {
        let war = self.manager.declare(red(1), BLUE).unwrap();
        for n in 1..=per_side {
            self.manager.register(war.id, red(1), red(n).member_id).unwrap();
            self.manager.register(war.id, blue(1), blue(n).member_id).unwrap();
        }
        war.id
    }

    /// A war that has just become active
    pub fn active_war(&self, per_side: u64) -> WarId {
        let war_id = self.preparing_war(per_side);
        self.clock.advance(DAY);
        let report = self.tick();
        assert_eq!(report.activated, vec![war_id]);
        war_id
    }

    pub fn end_time(&self, war_id: WarId) -> Millis {
        self.manager.snapshot(war_id).unwrap().war.end_time.unwrap()
    }

    pub fn drain_settlement(&mut self) -> Vec<SettlementEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.settlement.try_recv() {
            out.push(event);
        }
        out
    }
}
