//! Append-only, sequence-numbered record of everything that happened in a war
//!
//! Every append is written to the journal before it becomes visible, so a
//! failed persist leaves the log untouched. Sequence numbers are dense and
//! start at 0; page `p` of size `k` always covers sequence numbers
//! `[(p-1)*k, p*k)`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::archive::journal::EventJournal;
use crate::archive::retry::RetryPolicy;
use crate::core::error::{Result, WarError};
use crate::core::page::Page;
use crate::core::sync;
use crate::core::types::{ActorRef, EventId, GuildId, MemberId, Millis, TerritoryId, WarId};

/// Event type without payload, used for filtering and breakdowns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    Attack,
    Capture,
    Reinforce,
    Kill,
    BossDefeat,
    Holding,
}

impl EventType {
    pub const ALL: [EventType; 6] = [
        EventType::Attack,
        EventType::Capture,
        EventType::Reinforce,
        EventType::Kill,
        EventType::BossDefeat,
        EventType::Holding,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            EventType::Attack => "attack",
            EventType::Capture => "capture",
            EventType::Reinforce => "reinforce",
            EventType::Kill => "kill",
            EventType::BossDefeat => "boss-defeat",
            EventType::Holding => "holding",
        }
    }
}

/// What happened, with the payload specific to each event type
///
/// A failed attack is recorded as `Attack`; a successful one as `Capture`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WarEventKind {
    Attack {
        force: u32,
        success_chance: f64,
        /// Guild that held the territory, if any
        defender: Option<GuildId>,
    },
    Capture {
        force: u32,
        success_chance: f64,
        reward: u64,
        previous_controller: Option<GuildId>,
    },
    Reinforce {
        amount: u32,
        total: u32,
    },
    Kill {
        victim: MemberId,
    },
    BossDefeat {
        boss_name: String,
    },
    /// Income for keeping a territory through one or more holding passes
    Holding {
        passes: u32,
        /// Reinforcements left after decay
        reinforcements: u32,
    },
}

impl WarEventKind {
    pub fn event_type(&self) -> EventType {
        match self {
            WarEventKind::Attack { .. } => EventType::Attack,
            WarEventKind::Capture { .. } => EventType::Capture,
            WarEventKind::Reinforce { .. } => EventType::Reinforce,
            WarEventKind::Kill { .. } => EventType::Kill,
            WarEventKind::BossDefeat { .. } => EventType::BossDefeat,
            WarEventKind::Holding { .. } => EventType::Holding,
        }
    }
}

/// Everything the caller supplies; the log fills in id and sequence number
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub territory_id: Option<TerritoryId>,
    pub timestamp: Millis,
    pub actor: ActorRef,
    pub points: u64,
    /// Guild whose score `points` went to
    pub credited_guild: GuildId,
    pub kind: WarEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarEvent {
    pub seq: u64,
    pub id: EventId,
    pub war_id: WarId,
    pub territory_id: Option<TerritoryId>,
    pub timestamp: Millis,
    pub actor: ActorRef,
    pub points: u64,
    pub credited_guild: GuildId,
    #[serde(flatten)]
    pub kind: WarEventKind,
}

impl WarEvent {
    pub fn event_type(&self) -> EventType {
        self.kind.event_type()
    }

    /// One-line human readable summary for timelines and logs
    pub fn describe(&self) -> String {
        let who = &self.actor.display_name;
        let territory = self
            .territory_id
            .map(|t| format!("territory {}", t))
            .unwrap_or_else(|| "the field".to_string());
        match &self.kind {
            WarEventKind::Attack {
                force,
                success_chance,
                ..
            } => format!(
                "{} attacked {} with {} troops and was repelled ({:.0}% chance)",
                who,
                territory,
                force,
                success_chance * 100.0
            ),
            WarEventKind::Capture { force, reward, .. } => format!(
                "{} captured {} with {} troops (+{} resources, +{} points)",
                who, territory, force, reward, self.points
            ),
            WarEventKind::Reinforce { amount, total } => format!(
                "{} reinforced {} by {} (now {})",
                who, territory, amount, total
            ),
            WarEventKind::Kill { victim } => {
                format!("{} defeated member {} (+{} points)", who, victim, self.points)
            }
            WarEventKind::BossDefeat { boss_name } => {
                format!("{} defeated {} (+{} points)", who, boss_name, self.points)
            }
            WarEventKind::Holding { passes, .. } => format!(
                "{} held {} for {} pass(es) (+{} points)",
                who, territory, passes, self.points
            ),
        }
    }
}

/// Query filter; every present field must match
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventFilter {
    /// Matches the acting guild
    pub guild: Option<GuildId>,
    #[serde(rename = "type")]
    pub event_type: Option<EventType>,
    /// Inclusive lower bound on timestamp
    pub from: Option<Millis>,
    /// Exclusive upper bound on timestamp
    pub to: Option<Millis>,
    pub territory: Option<TerritoryId>,
}

impl EventFilter {
    pub fn matches(&self, event: &WarEvent) -> bool {
        self.guild.map_or(true, |g| event.actor.guild_id == g)
            && self.event_type.map_or(true, |t| event.event_type() == t)
            && self.from.map_or(true, |from| event.timestamp >= from)
            && self.to.map_or(true, |to| event.timestamp < to)
            && self.territory.map_or(true, |t| event.territory_id == Some(t))
    }
}

pub struct EventLog {
    war_id: WarId,
    journal: Arc<dyn EventJournal>,
    retry: RetryPolicy,
    /// Serializes appends so the journal sees events in sequence order
    writer: Mutex<()>,
    events: RwLock<Vec<WarEvent>>,
    sealed: AtomicBool,
}

impl EventLog {
    pub fn new(war_id: WarId, journal: Arc<dyn EventJournal>, retry: RetryPolicy) -> Self {
        Self {
            war_id,
            journal,
            retry,
            writer: Mutex::new(()),
            events: RwLock::new(Vec::new()),
            sealed: AtomicBool::new(false),
        }
    }

    /// An already-complete log, as restored from an archive
    pub fn restored(war_id: WarId, events: Vec<WarEvent>) -> Self {
        let log = Self::new(
            war_id,
            Arc::new(crate::archive::journal::NullJournal),
            RetryPolicy::none(),
        );
        *sync::write(&log.events) = events;
        log.seal();
        log
    }

    pub fn war_id(&self) -> WarId {
        self.war_id
    }

    /// Persist then publish one event
    ///
    /// On persistence failure nothing is recorded and the error is retryable.
    pub fn append(&self, new: NewEvent) -> Result<WarEvent> {
        if self.is_sealed() {
            return Err(WarError::InvalidStateTransition(format!(
                "event log of war {} is sealed",
                self.war_id
            )));
        }

        let _writer = sync::lock(&self.writer);
        let event = WarEvent {
            seq: sync::read(&self.events).len() as u64,
            id: EventId::new(),
            war_id: self.war_id,
            territory_id: new.territory_id,
            timestamp: new.timestamp,
            actor: new.actor,
            points: new.points,
            credited_guild: new.credited_guild,
            kind: new.kind,
        };

        self.retry
            .run("journal append", || self.journal.append(&event))?;

        sync::write(&self.events).push(event.clone());
        Ok(event)
    }

    /// Reject all further appends
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::SeqCst);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        sync::read(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<WarEvent> {
        sync::read(&self.events).clone()
    }

    /// Page `page` (1-based) by sequence number
    pub fn list(&self, page: usize, page_size: usize) -> Result<Page<WarEvent>> {
        Page::slice(&sync::read(&self.events), page, page_size)
    }

    pub fn query(&self, filter: &EventFilter) -> Vec<WarEvent> {
        sync::read(&self.events)
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }

    pub fn query_page(&self, filter: &EventFilter, page: usize, page_size: usize) -> Result<Page<WarEvent>> {
        Page::slice(&self.query(filter), page, page_size)
    }

    /// Points credited per guild, summed over every event
    pub fn points_by_guild(&self) -> BTreeMap<GuildId, u64> {
        let mut totals = BTreeMap::new();
        for event in sync::read(&self.events).iter() {
            *totals.entry(event.credited_guild).or_insert(0) += event.points;
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::journal::MemoryJournal;

    fn actor(guild: u64) -> ActorRef {
        ActorRef {
            member_id: MemberId(guild * 100),
            display_name: format!("member-{}", guild),
            guild_id: GuildId(guild),
        }
    }

    fn kill(guild: u64, at: Millis) -> NewEvent {
        NewEvent {
            territory_id: None,
            timestamp: at,
            actor: actor(guild),
            points: 10,
            credited_guild: GuildId(guild),
            kind: WarEventKind::Kill { victim: MemberId(7) },
        }
    }

    fn log_with(journal: Arc<MemoryJournal>) -> EventLog {
        EventLog::new(WarId::new(), journal, RetryPolicy::immediate(3))
    }

    #[test]
    fn test_append_assigns_dense_sequence() {
        let log = log_with(Arc::new(MemoryJournal::new()));
        for i in 0..5 {
            let event = log.append(kill(1, i)).unwrap();
            assert_eq!(event.seq, i);
        }
        assert_eq!(log.len(), 5);
    }

    #[test]
    fn test_failed_persist_records_nothing() {
        let journal = Arc::new(MemoryJournal::new());
        let log = log_with(journal.clone());
        journal.fail_next(5);
        let err = log.append(kill(1, 0)).unwrap_err();
        assert!(err.is_retryable());
        assert!(log.is_empty());

        journal.fail_next(0);
        assert_eq!(log.append(kill(1, 1)).unwrap().seq, 0);
    }

    #[test]
    fn test_transient_failure_is_retried() {
        let journal = Arc::new(MemoryJournal::new());
        let log = log_with(journal.clone());
        journal.fail_next(2);
        assert!(log.append(kill(1, 0)).is_ok());
        assert_eq!(journal.len(), 1);
    }

    #[test]
    fn test_sealed_log_rejects_appends() {
        let log = log_with(Arc::new(MemoryJournal::new()));
        log.seal();
        assert_eq!(
            log.append(kill(1, 0)).unwrap_err().code(),
            "INVALID_STATE_TRANSITION"
        );
    }

    #[test]
    fn test_query_by_guild_type_and_time() {
        let log = log_with(Arc::new(MemoryJournal::new()));
        log.append(kill(1, 10)).unwrap();
        log.append(kill(2, 20)).unwrap();
        log.append(NewEvent {
            territory_id: Some(TerritoryId(3)),
            timestamp: 30,
            actor: actor(1),
            points: 0,
            credited_guild: GuildId(1),
            kind: WarEventKind::Reinforce { amount: 5, total: 5 },
        })
        .unwrap();

        let by_guild = EventFilter {
            guild: Some(GuildId(1)),
            ..EventFilter::default()
        };
        assert_eq!(log.query(&by_guild).len(), 2);

        let by_type = EventFilter {
            event_type: Some(EventType::Kill),
            from: Some(15),
            ..EventFilter::default()
        };
        let found = log.query(&by_type);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].actor.guild_id, GuildId(2));

        let window = EventFilter {
            from: Some(10),
            to: Some(30),
            ..EventFilter::default()
        };
        assert_eq!(log.query(&window).len(), 2);
    }

    #[test]
    fn test_event_wire_format() {
        let log = log_with(Arc::new(MemoryJournal::new()));
        let event = log
            .append(NewEvent {
                territory_id: None,
                timestamp: 5,
                actor: actor(1),
                points: 100,
                credited_guild: GuildId(1),
                kind: WarEventKind::BossDefeat {
                    boss_name: "Ashen Wyrm".into(),
                },
            })
            .unwrap();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "boss-defeat");
        assert_eq!(json["boss_name"], "Ashen Wyrm");
        assert_eq!(json["points"], 100);

        let back: WarEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
        assert!(back.describe().contains("Ashen Wyrm"));
    }

    #[test]
    fn test_holding_event_is_acted_by_the_guild() {
        let log = log_with(Arc::new(MemoryJournal::new()));
        let event = log
            .append(NewEvent {
                territory_id: Some(TerritoryId(3)),
                timestamp: 300_000,
                actor: ActorRef::guild(GuildId(2), "Blue Tide"),
                points: 10,
                credited_guild: GuildId(2),
                kind: WarEventKind::Holding {
                    passes: 2,
                    reinforcements: 36,
                },
            })
            .unwrap();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "holding");
        assert_eq!(json["actor"]["member_id"], 0);
        assert_eq!(json["reinforcements"], 36);
        assert_eq!(event.describe(), "Blue Tide held territory 3 for 2 pass(es) (+10 points)");
    }

    #[test]
    fn test_points_by_guild() {
        let log = log_with(Arc::new(MemoryJournal::new()));
        log.append(kill(1, 0)).unwrap();
        log.append(kill(1, 1)).unwrap();
        log.append(kill(2, 2)).unwrap();
        let totals = log.points_by_guild();
        assert_eq!(totals[&GuildId(1)], 20);
        assert_eq!(totals[&GuildId(2)], 10);
    }
}
