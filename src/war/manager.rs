//! War lifecycle manager
//!
//! Owns every live war and drives it through
//! `Declared -> Preparing -> Active -> Concluded -> Archived`.
//!
//! Each war carries a timeline `RwLock` that doubles as its admission gate:
//! actions hold a read guard for their whole duration, phase transitions take
//! the write guard. Concluding therefore waits for in-flight actions, and an
//! action that starts after the transition sees the new phase. Territory
//! mutations are linearized by the territory's own mutex, under which the
//! cooldown check, resolution, journal write and commit all happen.
//!
//! Every scoring path then takes the war's commit mutex for the span from
//! journal append to the last published message, so subscribers see events
//! in `seq` order and score snapshots that never go backwards. Lock order is
//! timeline, territory, commit.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use ahash::AHashMap;
use rand::RngCore;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::archive::{
    ArchiveFilter, ArchiveStore, ArchiveSummary, EventFilter, EventJournal, EventLog,
    MemoryArchiveStore, NewEvent, NullJournal, RetryPolicy, WarArchive, WarEvent, WarEventKind,
};
use crate::broadcast::{Broadcaster, Subscription, WarMessage};
use crate::combat::{self, AttackPreview, CombatRules};
use crate::core::clock::{Clock, SystemClock};
use crate::core::config::WarConfig;
use crate::core::error::{Result, WarError};
use crate::core::page::Page;
use crate::core::sync;
use crate::core::types::{Actor, ActorRef, GuildId, MemberId, Millis, TerritoryId, WarId, WarSides};
use crate::directory::{
    GuildDirectory, MemberDirectory, NullSettlement, SettlementEvent, SettlementSink,
};
use crate::territory::{generate_layout, CooldownTracker, Territory, TerritoryGraph};
use crate::war::participants::{ParticipantEntry, ParticipantRegistry, Registration};
use crate::war::scores::Scores;
use crate::war::stats::WarStatistics;
use crate::war::{decide_winner, War, WarPhase};

const DAY_MS: Millis = 24 * 3600 * 1000;

/// Produces the RNG a war uses for its layout and every attack roll
pub type RngFactory = Arc<dyn Fn(WarId) -> Box<dyn RngCore + Send> + Send + Sync>;

/// ChaCha8 seeded from `seed`, or from the war id when no seed is given
pub fn chacha_rng_factory(seed: Option<u64>) -> RngFactory {
    Arc::new(move |war_id: WarId| -> Box<dyn RngCore + Send> {
        Box::new(ChaCha8Rng::seed_from_u64(seed.unwrap_or_else(|| war_id.fold())))
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackReport {
    pub captured: bool,
    pub success_chance: f64,
    pub roll: f64,
    /// Points awarded by this attack, to `credited_guild`
    pub points: u64,
    pub credited_guild: GuildId,
    pub territory: Territory,
    pub event: WarEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReinforceReport {
    pub added: u32,
    pub territory: Territory,
    pub event: WarEvent,
}

/// Full-state pull used by viewers to reconcile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarSnapshot {
    pub war: War,
    pub territories: Vec<Territory>,
}

/// What one sweep pass did
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub activated: Vec<WarId>,
    pub concluded: Vec<WarId>,
    pub archived: Vec<WarId>,
    /// Holding events written across all wars
    pub holding_events: usize,
    pub purged_cooldowns: usize,
    pub failures: Vec<(WarId, String)>,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.activated.is_empty()
            && self.concluded.is_empty()
            && self.archived.is_empty()
            && self.holding_events == 0
            && self.failures.is_empty()
    }
}

/// Values fixed at conclusion
#[derive(Debug, Clone)]
struct Frozen {
    scores: BTreeMap<GuildId, u64>,
    winner: Option<GuildId>,
    statistics: WarStatistics,
}

#[derive(Debug)]
struct Timeline {
    phase: WarPhase,
    declared_at: Millis,
    prep_ends_at: Millis,
    start_time: Option<Millis>,
    end_time: Option<Millis>,
    concluded_at: Option<Millis>,
    archived_at: Option<Millis>,
    frozen: Option<Frozen>,
}

impl Timeline {
    fn advance(&mut self, war_id: WarId, next: WarPhase) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(WarError::InvalidStateTransition(format!(
                "war {} cannot go from {} to {}",
                war_id,
                self.phase.label(),
                next.label()
            )));
        }
        self.phase = next;
        Ok(())
    }

    /// Actions are admitted only while active and strictly before `end_time`
    fn ensure_accepting(&self, war_id: WarId, now: Millis) -> Result<()> {
        match (self.phase, self.end_time) {
            (WarPhase::Active, Some(end)) if now < end => Ok(()),
            _ => Err(WarError::WarNotActive(war_id)),
        }
    }

    fn elapsed_active(&self, now: Millis) -> Millis {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => now.min(end).saturating_sub(start),
            _ => 0,
        }
    }
}

struct LiveWar {
    id: WarId,
    sides: WarSides,
    timeline: RwLock<Timeline>,
    registry: ParticipantRegistry,
    /// Seeded once, on activation
    graph: OnceLock<TerritoryGraph>,
    scores: Scores,
    cooldowns: CooldownTracker,
    log: EventLog,
    /// Orders journal appends with their published messages
    commit: Mutex<()>,
    /// Holding passes already paid out
    holding_passes: Mutex<u64>,
    guild_names: BTreeMap<GuildId, String>,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl LiveWar {
    fn graph(&self) -> Result<&TerritoryGraph> {
        self.graph.get().ok_or(WarError::WarNotActive(self.id))
    }

    fn territories(&self) -> Vec<Territory> {
        self.graph.get().map(TerritoryGraph::all).unwrap_or_default()
    }

    fn statistics(&self, timeline: &Timeline, now: Millis) -> WarStatistics {
        WarStatistics::compute(
            &self.sides,
            &self.log.all(),
            &self.registry.all(),
            &self.territories(),
            timeline.elapsed_active(now),
        )
    }

    fn war(&self, timeline: &Timeline, now: Millis) -> War {
        let (scores, winner, statistics) = match &timeline.frozen {
            Some(frozen) => (frozen.scores.clone(), frozen.winner, frozen.statistics.clone()),
            None => (self.scores.snapshot(), None, self.statistics(timeline, now)),
        };
        War {
            id: self.id,
            challenger: self.sides.challenger,
            defender: self.sides.defender,
            phase: timeline.phase,
            declared_at: timeline.declared_at,
            prep_ends_at: timeline.prep_ends_at,
            start_time: timeline.start_time,
            end_time: timeline.end_time,
            concluded_at: timeline.concluded_at,
            archived_at: timeline.archived_at,
            scores,
            winner,
            participants: self.registry.rosters(),
            statistics,
        }
    }
}

pub struct WarManagerBuilder {
    config: WarConfig,
    guilds: Arc<dyn GuildDirectory>,
    members: Arc<dyn MemberDirectory>,
    clock: Option<Arc<dyn Clock>>,
    journal: Option<Arc<dyn EventJournal>>,
    archives: Option<Arc<dyn ArchiveStore>>,
    broadcaster: Option<Arc<Broadcaster>>,
    settlement: Option<Arc<dyn SettlementSink>>,
    rng_factory: Option<RngFactory>,
}

impl WarManagerBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn journal(mut self, journal: Arc<dyn EventJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn archive_store(mut self, archives: Arc<dyn ArchiveStore>) -> Self {
        self.archives = Some(archives);
        self
    }

    pub fn broadcaster(mut self, broadcaster: Arc<Broadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn settlement(mut self, settlement: Arc<dyn SettlementSink>) -> Self {
        self.settlement = Some(settlement);
        self
    }

    pub fn rng_factory(mut self, factory: RngFactory) -> Self {
        self.rng_factory = Some(factory);
        self
    }

    pub fn build(self) -> Result<WarManager> {
        self.config.validate()?;
        let seed = self.config.seed;
        Ok(WarManager {
            rules: CombatRules::from(&self.config),
            config: self.config,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            guilds: self.guilds,
            members: self.members,
            journal: self.journal.unwrap_or_else(|| Arc::new(NullJournal)),
            archives: self
                .archives
                .unwrap_or_else(|| Arc::new(MemoryArchiveStore::new())),
            broadcaster: self.broadcaster.unwrap_or_default(),
            settlement: self.settlement.unwrap_or_else(|| Arc::new(NullSettlement)),
            rng_factory: self.rng_factory.unwrap_or_else(|| chacha_rng_factory(seed)),
            wars: RwLock::new(AHashMap::new()),
        })
    }
}

pub struct WarManager {
    config: WarConfig,
    rules: CombatRules,
    clock: Arc<dyn Clock>,
    guilds: Arc<dyn GuildDirectory>,
    members: Arc<dyn MemberDirectory>,
    journal: Arc<dyn EventJournal>,
    archives: Arc<dyn ArchiveStore>,
    broadcaster: Arc<Broadcaster>,
    settlement: Arc<dyn SettlementSink>,
    rng_factory: RngFactory,
    wars: RwLock<AHashMap<WarId, Arc<LiveWar>>>,
}

impl WarManager {
    pub fn builder(
        config: WarConfig,
        guilds: Arc<dyn GuildDirectory>,
        members: Arc<dyn MemberDirectory>,
    ) -> WarManagerBuilder {
        WarManagerBuilder {
            config,
            guilds,
            members,
            clock: None,
            journal: None,
            archives: None,
            broadcaster: None,
            settlement: None,
            rng_factory: None,
        }
    }

    pub fn config(&self) -> &WarConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    pub fn archive_store(&self) -> &Arc<dyn ArchiveStore> {
        &self.archives
    }

    /// Ids of every war not yet archived
    pub fn live_war_ids(&self) -> Vec<WarId> {
        let mut ids: Vec<WarId> = sync::read(&self.wars).keys().copied().collect();
        ids.sort();
        ids
    }

    fn live(&self, war_id: WarId) -> Result<Arc<LiveWar>> {
        sync::read(&self.wars)
            .get(&war_id)
            .cloned()
            .ok_or(WarError::WarNotFound(war_id))
    }

    fn live_wars(&self) -> Vec<Arc<LiveWar>> {
        sync::read(&self.wars).values().cloned().collect()
    }

    fn publish_phase(&self, war_id: WarId, phase: WarPhase, winner: Option<GuildId>) {
        self.broadcaster.publish(
            war_id,
            WarMessage::PhaseUpdate {
                war_id,
                phase,
                winner,
            },
        );
    }

    fn publish_event(&self, war: &LiveWar, event: &WarEvent) {
        self.broadcaster.publish(
            war.id,
            WarMessage::Event {
                war_id: war.id,
                event: event.clone(),
            },
        );
    }

    /// Callers hold the war's commit mutex
    fn publish_scores(&self, war: &LiveWar) {
        self.broadcaster.publish(
            war.id,
            WarMessage::ScoreUpdate {
                war_id: war.id,
                scores: war.scores.snapshot(),
            },
        );
    }

    // ------------------------------------------------------------------
    // Declaration and registration
    // ------------------------------------------------------------------

    /// Declare war on `target` on behalf of the actor's guild
    ///
    /// A successful declaration immediately opens the preparation window.
    pub fn declare(&self, actor: Actor, target: GuildId) -> Result<War> {
        let now = self.clock.now_ms();
        let challenger = actor.guild_id;
        if challenger == target {
            return Err(WarError::NotEligible(
                "a guild cannot declare war on itself".into(),
            ));
        }

        let member = self.members.member(actor.member_id)?;
        if member.guild_id != Some(challenger) {
            return Err(WarError::NotEligible(format!(
                "member {} does not belong to guild {}",
                actor.member_id, challenger
            )));
        }

        let registry = &self.config.registry;
        let challenger_profile = self.guilds.guild(challenger)?;
        let target_profile = self.guilds.guild(target)?;
        for profile in [&challenger_profile, &target_profile] {
            if profile.level < registry.min_guild_level {
                return Err(WarError::NotEligible(format!(
                    "guild {} is level {}, wars require level {}",
                    profile.id, profile.level, registry.min_guild_level
                )));
            }
        }
        if challenger_profile.active_members < registry.min_active_members {
            return Err(WarError::NotEligible(format!(
                "guild {} has {} active members, declaring requires {}",
                challenger, challenger_profile.active_members, registry.min_active_members
            )));
        }

        let sides = WarSides::new(challenger, target);
        let war_id = WarId::new();
        let prep_ends_at = now.saturating_add(self.config.timing.prep_duration_ms());
        let war = Arc::new(LiveWar {
            id: war_id,
            sides,
            timeline: RwLock::new(Timeline {
                phase: WarPhase::Declared,
                declared_at: now,
                prep_ends_at,
                start_time: None,
                end_time: None,
                concluded_at: None,
                archived_at: None,
                frozen: None,
            }),
            registry: ParticipantRegistry::new(
                sides,
                registry.max_participants,
                registry.min_member_level,
            ),
            graph: OnceLock::new(),
            scores: Scores::new(sides),
            cooldowns: CooldownTracker::new(self.config.timing.cooldown_scope),
            // Appends run under territory and commit locks, so no backoff sleep
            log: EventLog::new(
                war_id,
                Arc::clone(&self.journal),
                RetryPolicy::immediate(self.config.archive.persistence_retries),
            ),
            commit: Mutex::new(()),
            holding_passes: Mutex::new(0),
            guild_names: BTreeMap::from([
                (challenger, challenger_profile.name.clone()),
                (target, target_profile.name.clone()),
            ]),
            rng: Mutex::new((self.rng_factory)(war_id)),
        });

        {
            let mut wars = sync::write(&self.wars);
            for existing in wars.values() {
                let busy = existing.sides.contains(challenger) || existing.sides.contains(target);
                if busy && sync::read(&existing.timeline).phase.is_ongoing() {
                    return Err(WarError::NotEligible(format!(
                        "guild {} or {} is already at war",
                        challenger, target
                    )));
                }
            }
            sync::write(&war.timeline).advance(war_id, WarPhase::Preparing)?;
            wars.insert(war_id, Arc::clone(&war));
        }

        tracing::info!(
            war_id = %war_id,
            challenger = %challenger,
            defender = %target,
            prep_ends_at,
            "war declared"
        );
        self.publish_phase(war_id, WarPhase::Preparing, None);

        let timeline = sync::read(&war.timeline);
        Ok(war.war(&timeline, now))
    }

    /// Register `member_id` for the actor's guild; open only while preparing
    pub fn register(&self, war_id: WarId, actor: Actor, member_id: MemberId) -> Result<ParticipantEntry> {
        let now = self.clock.now_ms();
        let war = self.live(war_id)?;
        let profile = self.members.member(member_id)?;

        let timeline = sync::read(&war.timeline);
        if timeline.phase != WarPhase::Preparing {
            return Err(WarError::NotEligible(format!(
                "registration for war {} is closed ({})",
                war_id,
                timeline.phase.label()
            )));
        }
        if war.registry.register(actor.guild_id, &profile, now)? == Registration::Registered {
            tracing::info!(
                war_id = %war_id,
                guild_id = %actor.guild_id,
                member_id = %member_id,
                "participant registered"
            );
        }
        war.registry
            .get(member_id)
            .ok_or(WarError::NotParticipant(member_id))
    }

    // ------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------

    pub fn attack(
        &self,
        war_id: WarId,
        actor: Actor,
        territory_id: TerritoryId,
        force: u32,
    ) -> Result<AttackReport> {
        let now = self.clock.now_ms();
        let war = self.live(war_id)?;
        let timeline = sync::read(&war.timeline);
        timeline.ensure_accepting(war_id, now)?;
        let actor_ref = war.registry.require(actor)?;
        let graph = war.graph()?;

        let mut territory = graph.lock(territory_id)?;
        war.cooldowns.check(territory_id, actor.guild_id, now)?;
        let outcome = {
            let mut rng = sync::lock(&war.rng);
            combat::resolve_attack(
                &territory,
                graph.sides(),
                actor.guild_id,
                force,
                &self.rules,
                &mut **rng,
            )?
        };

        self.broadcaster.publish(
            war_id,
            WarMessage::territory(war_id, &combat::contested_view(&territory)),
        );

        let preview = outcome.preview;
        let reward_points =
            combat::award_points(preview.estimated_reward, territory.kind, &self.rules);
        let (points, credited_guild, kind) = if outcome.captured {
            (
                reward_points,
                actor.guild_id,
                WarEventKind::Capture {
                    force,
                    success_chance: preview.success_chance,
                    reward: preview.estimated_reward,
                    previous_controller: outcome.previous_controller,
                },
            )
        } else {
            let kind = WarEventKind::Attack {
                force,
                success_chance: preview.success_chance,
                defender: territory.controller,
            };
            match territory.controller {
                Some(defender) => (reward_points, defender, kind),
                None => (0, actor.guild_id, kind),
            }
        };

        let commit = sync::lock(&war.commit);
        let appended = war.log.append(NewEvent {
            territory_id: Some(territory_id),
            timestamp: now,
            actor: actor_ref,
            points,
            credited_guild,
            kind,
        });
        let event = match appended {
            Ok(event) => event,
            Err(e) => {
                self.broadcaster
                    .publish(war_id, WarMessage::territory(war_id, &territory));
                tracing::warn!(
                    war_id = %war_id,
                    territory_id = %territory_id,
                    error = %e,
                    "attack not committed"
                );
                return Err(e);
            }
        };

        *territory = outcome.territory;
        war.cooldowns.lock(
            territory_id,
            actor.guild_id,
            now,
            self.config.timing.cooldown_ms(),
        );
        war.scores.add(credited_guild, points);
        let captured = outcome.captured;
        war.registry.record(actor.member_id, |entry| {
            entry.attacks += 1;
            if captured {
                entry.captures += 1;
                entry.points += points;
            }
        });
        let after = territory.clone();
        self.broadcaster
            .publish(war_id, WarMessage::territory(war_id, &after));
        self.publish_event(&war, &event);
        if points > 0 {
            self.publish_scores(&war);
        }
        drop(commit);
        drop(territory);

        if captured {
            self.settlement.submit(SettlementEvent::Capture {
                war_id,
                guild_id: actor.guild_id,
                member_id: actor.member_id,
                territory_id,
                points,
            });
        }

        tracing::info!(
            war_id = %war_id,
            territory_id = %territory_id,
            guild_id = %actor.guild_id,
            force,
            chance = preview.success_chance,
            captured,
            points,
            "attack resolved"
        );

        Ok(AttackReport {
            captured,
            success_chance: preview.success_chance,
            roll: outcome.roll,
            points,
            credited_guild,
            territory: after,
            event,
        })
    }

    pub fn reinforce(
        &self,
        war_id: WarId,
        actor: Actor,
        territory_id: TerritoryId,
        amount: u32,
    ) -> Result<ReinforceReport> {
        let now = self.clock.now_ms();
        let war = self.live(war_id)?;
        let timeline = sync::read(&war.timeline);
        timeline.ensure_accepting(war_id, now)?;
        let actor_ref = war.registry.require(actor)?;
        let graph = war.graph()?;

        let mut territory = graph.lock(territory_id)?;
        war.cooldowns.check(territory_id, actor.guild_id, now)?;
        let outcome = combat::resolve_reinforce(&territory, actor.guild_id, amount, &self.rules)?;
        let added = outcome.added();

        let commit = sync::lock(&war.commit);
        let event = war.log.append(NewEvent {
            territory_id: Some(territory_id),
            timestamp: now,
            actor: actor_ref,
            points: 0,
            credited_guild: actor.guild_id,
            kind: WarEventKind::Reinforce {
                amount: added,
                total: outcome.reinforcements,
            },
        })?;

        *territory = outcome.territory;
        war.cooldowns.lock(
            territory_id,
            actor.guild_id,
            now,
            self.config.timing.cooldown_ms(),
        );
        war.registry.record(actor.member_id, |entry| {
            entry.reinforcements += added as u64;
        });
        let after = territory.clone();
        self.broadcaster
            .publish(war_id, WarMessage::territory(war_id, &after));
        self.publish_event(&war, &event);
        drop(commit);
        drop(territory);

        tracing::info!(
            war_id = %war_id,
            territory_id = %territory_id,
            guild_id = %actor.guild_id,
            added,
            total = after.defense.reinforcements,
            "territory reinforced"
        );

        Ok(ReinforceReport {
            added,
            territory: after,
            event,
        })
    }

    /// Report that the actor defeated a registered member of the other guild
    pub fn report_kill(&self, war_id: WarId, actor: Actor, victim: MemberId) -> Result<WarEvent> {
        let now = self.clock.now_ms();
        let war = self.live(war_id)?;
        let timeline = sync::read(&war.timeline);
        timeline.ensure_accepting(war_id, now)?;
        let actor_ref = war.registry.require(actor)?;

        let opponent = war
            .sides
            .side_of(actor.guild_id)
            .map(|side| war.sides.guild(side.opponent()))
            .ok_or(WarError::NotParticipant(actor.member_id))?;
        if !war.registry.is_participant(opponent, victim) {
            return Err(WarError::NotParticipant(victim));
        }

        let points = self.config.points.kill;
        let event = self.credit(&war, actor_ref, now, points, WarEventKind::Kill { victim })?;
        war.registry.record(actor.member_id, |entry| {
            entry.kills += 1;
            entry.points += points;
        });
        self.settlement.submit(SettlementEvent::Kill {
            war_id,
            guild_id: actor.guild_id,
            member_id: actor.member_id,
            points,
        });
        tracing::info!(war_id = %war_id, guild_id = %actor.guild_id, victim = %victim, "kill reported");
        Ok(event)
    }

    pub fn report_boss_defeat(&self, war_id: WarId, actor: Actor, boss_name: &str) -> Result<WarEvent> {
        let boss_name = boss_name.trim();
        if boss_name.is_empty() {
            return Err(WarError::InvalidRequest("boss_name must not be empty".into()));
        }
        let now = self.clock.now_ms();
        let war = self.live(war_id)?;
        let timeline = sync::read(&war.timeline);
        timeline.ensure_accepting(war_id, now)?;
        let actor_ref = war.registry.require(actor)?;

        let points = self.config.points.boss_defeat;
        let event = self.credit(
            &war,
            actor_ref,
            now,
            points,
            WarEventKind::BossDefeat {
                boss_name: boss_name.to_string(),
            },
        )?;
        war.registry.record(actor.member_id, |entry| {
            entry.boss_defeats += 1;
            entry.points += points;
        });
        self.settlement.submit(SettlementEvent::BossDefeat {
            war_id,
            guild_id: actor.guild_id,
            member_id: actor.member_id,
            boss_name: boss_name.to_string(),
            points,
        });
        tracing::info!(war_id = %war_id, guild_id = %actor.guild_id, boss = boss_name, "boss defeat reported");
        Ok(event)
    }

    /// Journal, score and publish a territory-less event for the actor's guild
    fn credit(
        &self,
        war: &LiveWar,
        actor: ActorRef,
        now: Millis,
        points: u64,
        kind: WarEventKind,
    ) -> Result<WarEvent> {
        let guild = actor.guild_id;
        let _commit = sync::lock(&war.commit);
        let event = war.log.append(NewEvent {
            territory_id: None,
            timestamp: now,
            actor,
            points,
            credited_guild: guild,
            kind,
        })?;
        war.scores.add(guild, points);
        self.publish_event(war, &event);
        self.publish_scores(war);
        Ok(event)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn preview_attack(&self, war_id: WarId, territory_id: TerritoryId, force: u32) -> Result<AttackPreview> {
        let now = self.clock.now_ms();
        let war = self.live(war_id)?;
        let timeline = sync::read(&war.timeline);
        timeline.ensure_accepting(war_id, now)?;
        let territory = war.graph()?.get(territory_id)?;
        combat::preview_attack(&territory, force, &self.rules)
    }

    /// Authoritative territory state; empty until the war is active
    pub fn get_territories(&self, war_id: WarId) -> Result<Vec<Territory>> {
        match self.live(war_id) {
            Ok(war) => Ok(war.territories()),
            Err(WarError::WarNotFound(_)) => Ok(self.archives.load(war_id)?.territories),
            Err(e) => Err(e),
        }
    }

    pub fn neighbors(&self, war_id: WarId, territory_id: TerritoryId) -> Result<Vec<TerritoryId>> {
        self.live(war_id)?.graph()?.neighbors(territory_id)
    }

    pub fn snapshot(&self, war_id: WarId) -> Result<WarSnapshot> {
        match self.live(war_id) {
            Ok(war) => {
                let now = self.clock.now_ms();
                let timeline = sync::read(&war.timeline);
                Ok(WarSnapshot {
                    war: war.war(&timeline, now),
                    territories: war.territories(),
                })
            }
            Err(WarError::WarNotFound(_)) => {
                let archive = self.archives.load(war_id)?;
                Ok(WarSnapshot {
                    war: archive.war,
                    territories: archive.territories,
                })
            }
            Err(e) => Err(e),
        }
    }

    pub fn participants(&self, war_id: WarId, guild: GuildId) -> Result<Vec<ParticipantEntry>> {
        match self.live(war_id) {
            Ok(war) => Ok(war.registry.entries(guild)),
            Err(WarError::WarNotFound(_)) => Ok(self
                .archives
                .load(war_id)?
                .participants
                .into_iter()
                .filter(|p| p.guild_id == guild)
                .collect()),
            Err(e) => Err(e),
        }
    }

    pub fn is_participant(&self, war_id: WarId, guild: GuildId, member: MemberId) -> Result<bool> {
        Ok(self.live(war_id)?.registry.is_participant(guild, member))
    }

    /// Events in sequence order, live or archived
    pub fn list_events(&self, war_id: WarId, page: usize, page_size: usize) -> Result<Page<WarEvent>> {
        match self.live(war_id) {
            Ok(war) => war.log.list(page, page_size),
            Err(WarError::WarNotFound(_)) => {
                Page::slice(&self.archives.load(war_id)?.events, page, page_size)
            }
            Err(e) => Err(e),
        }
    }

    pub fn query_events(
        &self,
        war_id: WarId,
        filter: &EventFilter,
        page: usize,
        page_size: usize,
    ) -> Result<Page<WarEvent>> {
        match self.live(war_id) {
            Ok(war) => war.log.query_page(filter, page, page_size),
            Err(WarError::WarNotFound(_)) => {
                let archive = self.archives.load(war_id)?;
                let log = EventLog::restored(war_id, archive.events);
                log.query_page(filter, page, page_size)
            }
            Err(e) => Err(e),
        }
    }

    pub fn subscribe(&self, war_id: WarId) -> Result<Subscription> {
        self.live(war_id)?;
        Ok(self.broadcaster.subscribe(war_id))
    }

    pub fn history(
        &self,
        guild: GuildId,
        filter: &ArchiveFilter,
        page: usize,
        page_size: usize,
    ) -> Result<Page<ArchiveSummary>> {
        self.archives.history(guild, filter, page, page_size)
    }

    pub fn download_archive(&self, war_id: WarId) -> Result<String> {
        self.archives.download(war_id)
    }

    /// Remove archives past the retention window
    pub fn cleanup_archives(&self) -> Result<usize> {
        let retention = self.config.archive.retention_days.saturating_mul(DAY_MS);
        let older_than = self.clock.now_ms().saturating_sub(retention);
        self.archives.cleanup(older_than)
    }

    // ------------------------------------------------------------------
    // Phase transitions
    // ------------------------------------------------------------------

    /// Run every due transition and purge expired cooldowns
    ///
    /// Failures are reported, not raised; the affected war stays in its
    /// current phase and is retried on the next tick.
    pub fn tick(&self, now: Millis) -> TickReport {
        let mut report = TickReport::default();
        for war in self.live_wars() {
            if let Err(e) = self.advance_war(&war, now, &mut report) {
                tracing::warn!(war_id = %war.id, error = %e, "phase transition failed");
                report.failures.push((war.id, e.to_string()));
            }
            report.purged_cooldowns += war.cooldowns.purge(now);
        }
        report
    }

    fn advance_war(&self, war: &Arc<LiveWar>, now: Millis, report: &mut TickReport) -> Result<()> {
        if self.activate(war, now)? {
            report.activated.push(war.id);
        }
        // A failed holding write must not hold up conclusion
        match self.hold(war, now) {
            Ok(written) => report.holding_events += written,
            Err(e) => report.failures.push((war.id, e.to_string())),
        }
        if self.conclude(war, now)? {
            report.concluded.push(war.id);
        }
        let archive_due = {
            let timeline = sync::read(&war.timeline);
            match (timeline.phase, timeline.concluded_at, self.config.timing.auto_archive_after_ms()) {
                (WarPhase::Concluded, Some(at), Some(delay)) => now >= at.saturating_add(delay),
                _ => false,
            }
        };
        if archive_due {
            self.archive_war(war, now)?;
            report.archived.push(war.id);
        }
        Ok(())
    }

    fn activate(&self, war: &LiveWar, now: Millis) -> Result<bool> {
        let mut timeline = sync::write(&war.timeline);
        if timeline.phase != WarPhase::Preparing || now < timeline.prep_ends_at {
            return Ok(false);
        }
        timeline.advance(war.id, WarPhase::Active)?;

        let seeds = {
            let mut rng = sync::lock(&war.rng);
            generate_layout(&self.config.map, &mut **rng)
        };
        let graph = TerritoryGraph::seeded(
            war.sides,
            self.config.map.adjacency_radius,
            self.config.combat.max_reinforcements,
            seeds,
        );
        let territories = graph.len();
        if war.graph.set(graph).is_err() {
            return Err(WarError::InvalidStateTransition(format!(
                "war {} already has a territory graph",
                war.id
            )));
        }

        let end = now.saturating_add(self.config.timing.war_duration_ms());
        timeline.start_time = Some(now);
        timeline.end_time = Some(end);
        war.scores.reset();
        drop(timeline);

        tracing::info!(war_id = %war.id, territories, end_time = end, "war active");
        self.publish_phase(war.id, WarPhase::Active, None);
        Ok(true)
    }

    /// Pay holding income for every pass due by `now`
    ///
    /// Passes fall at `start + k * interval` strictly before the end time.
    /// Overdue passes are paid to the territory's current controller in one
    /// event. A territory whose event cannot be journaled forfeits the
    /// passes; the others are still paid and the failure is returned.
    fn hold(&self, war: &LiveWar, now: Millis) -> Result<usize> {
        let Some(interval) = self.config.timing.holding_interval_ms() else {
            return Ok(0);
        };
        let timeline = sync::read(&war.timeline);
        let (Some(start), Some(end)) = (timeline.start_time, timeline.end_time) else {
            return Ok(0);
        };
        if timeline.phase != WarPhase::Active {
            return Ok(0);
        }
        let due = now.min(end.saturating_sub(1)).saturating_sub(start) / interval;

        let mut paid = sync::lock(&war.holding_passes);
        if due <= *paid {
            return Ok(0);
        }
        let passes = u32::try_from(due - *paid).unwrap_or(u32::MAX);
        let at = start.saturating_add(due.saturating_mul(interval));
        *paid = due;

        let graph = war.graph()?;
        let decay = self.config.combat.reinforcement_decay;
        let mut written = 0;
        let mut failure = None;
        for territory_id in graph.ids() {
            let mut territory = graph.lock(territory_id)?;
            let Some(controller) = territory.controller else {
                continue;
            };
            let points = territory.kind.holding_points().saturating_mul(passes as u64);
            let mut defense = territory.defense;
            let reinforcements = defense.decay(decay, passes);
            let name = war.guild_names.get(&controller).cloned().unwrap_or_default();

            let _commit = sync::lock(&war.commit);
            let appended = war.log.append(NewEvent {
                territory_id: Some(territory_id),
                timestamp: at,
                actor: ActorRef::guild(controller, name),
                points,
                credited_guild: controller,
                kind: WarEventKind::Holding {
                    passes,
                    reinforcements,
                },
            });
            let event = match appended {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(
                        war_id = %war.id,
                        territory_id = %territory_id,
                        passes,
                        error = %e,
                        "holding income forfeited"
                    );
                    failure = Some(e);
                    continue;
                }
            };

            territory.defense = defense;
            war.scores.add(controller, points);
            self.broadcaster
                .publish(war.id, WarMessage::territory(war.id, &territory));
            self.publish_event(war, &event);
            self.publish_scores(war);
            written += 1;
        }

        tracing::debug!(war_id = %war.id, passes, written, "holding income paid");
        match failure {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    fn conclude(&self, war: &LiveWar, now: Millis) -> Result<bool> {
        let mut timeline = sync::write(&war.timeline);
        let due = timeline.phase == WarPhase::Active
            && timeline.end_time.is_some_and(|end| now >= end);
        if !due {
            return Ok(false);
        }
        timeline.advance(war.id, WarPhase::Concluded)?;

        let scores = war.scores.snapshot();
        let winner = decide_winner(&war.sides, &scores);
        let statistics = war.statistics(&timeline, now);
        timeline.concluded_at = Some(now);
        timeline.frozen = Some(Frozen {
            scores: scores.clone(),
            winner,
            statistics,
        });
        drop(timeline);

        tracing::info!(
            war_id = %war.id,
            winner = ?winner,
            challenger_score = scores.get(&war.sides.challenger).copied().unwrap_or(0),
            defender_score = scores.get(&war.sides.defender).copied().unwrap_or(0),
            "war concluded"
        );
        self.broadcaster.publish(
            war.id,
            WarMessage::ScoreUpdate {
                war_id: war.id,
                scores: scores.clone(),
            },
        );
        self.publish_phase(war.id, WarPhase::Concluded, winner);
        self.settlement.submit(SettlementEvent::WarResult {
            war_id: war.id,
            winner,
            scores,
        });
        Ok(true)
    }

    /// Archive a concluded war now
    pub fn archive(&self, war_id: WarId) -> Result<WarArchive> {
        let war = match self.live(war_id) {
            Ok(war) => war,
            Err(WarError::WarNotFound(_)) if self.archives.contains(war_id)? => {
                return Err(WarError::InvalidStateTransition(format!(
                    "war {} is already archived",
                    war_id
                )));
            }
            Err(e) => return Err(e),
        };
        self.archive_war(&war, self.clock.now_ms())
    }

    fn archive_war(&self, war: &Arc<LiveWar>, now: Millis) -> Result<WarArchive> {
        let mut timeline = sync::write(&war.timeline);
        if !timeline.phase.can_transition_to(WarPhase::Archived) {
            return Err(WarError::InvalidStateTransition(format!(
                "war {} is {}, only concluded wars can be archived",
                war.id,
                timeline.phase.label()
            )));
        }

        let mut record = WarArchive {
            war: war.war(&timeline, now),
            participants: war.registry.all(),
            territories: war.territories(),
            events: war.log.all(),
        };
        record.war.phase = WarPhase::Archived;
        record.war.archived_at = Some(now);

        RetryPolicy::from_config(&self.config.archive)
            .run("archive write", || self.archives.save(&record))?;

        war.log.seal();
        timeline.advance(war.id, WarPhase::Archived)?;
        timeline.archived_at = Some(now);
        drop(timeline);

        sync::write(&self.wars).remove(&war.id);
        tracing::info!(
            war_id = %war.id,
            events = record.events.len(),
            "war archived"
        );
        self.publish_phase(war.id, WarPhase::Archived, record.war.winner);
        self.broadcaster.close(war.id);
        Ok(record)
    }
}
