//! Aggregate war statistics, derived from the event log

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::archive::event_log::{EventType, WarEvent, WarEventKind};
use crate::core::types::{GuildId, MemberId, Millis, WarSides};
use crate::territory::Territory;
use crate::war::participants::ParticipantEntry;

/// How many members `top_contributors` lists
pub const TOP_CONTRIBUTORS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub member_id: MemberId,
    pub guild_id: GuildId,
    pub display_name: String,
    pub points: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WarStatistics {
    pub captures: u64,
    /// Every attack, successful or not
    pub attacks: u64,
    pub failed_attacks: u64,
    /// Total troops added through reinforcement
    pub reinforcements: u64,
    pub kills: u64,
    pub boss_defeats: u64,
    /// Sum of capture rewards
    pub resources_won: u64,
    /// Points paid out for holding territory
    #[serde(default)]
    pub holding_points: u64,
    pub total_events: u64,
    pub duration_ms: Millis,
    /// Territories held per guild
    pub territory_control: BTreeMap<GuildId, u32>,
    pub neutral_territories: u32,
    pub event_breakdown: BTreeMap<EventType, u64>,
    pub top_contributors: Vec<Contributor>,
}

impl WarStatistics {
    pub fn compute(
        sides: &WarSides,
        events: &[WarEvent],
        participants: &[ParticipantEntry],
        territories: &[Territory],
        duration_ms: Millis,
    ) -> Self {
        let mut stats = WarStatistics {
            duration_ms,
            total_events: events.len() as u64,
            ..Default::default()
        };

        for event in events {
            *stats.event_breakdown.entry(event.event_type()).or_insert(0) += 1;
            match &event.kind {
                WarEventKind::Attack { .. } => {
                    stats.attacks += 1;
                    stats.failed_attacks += 1;
                }
                WarEventKind::Capture { reward, .. } => {
                    stats.attacks += 1;
                    stats.captures += 1;
                    stats.resources_won += reward;
                }
                WarEventKind::Reinforce { amount, .. } => {
                    stats.reinforcements += *amount as u64;
                }
                WarEventKind::Kill { .. } => stats.kills += 1,
                WarEventKind::BossDefeat { .. } => stats.boss_defeats += 1,
                WarEventKind::Holding { .. } => stats.holding_points += event.points,
            }
        }

        for guild in sides.guilds() {
            stats.territory_control.insert(guild, 0);
        }
        for territory in territories {
            match territory.controller.filter(|g| sides.contains(*g)) {
                Some(guild) => *stats.territory_control.entry(guild).or_insert(0) += 1,
                None => stats.neutral_territories += 1,
            }
        }

        let mut ranked: Vec<&ParticipantEntry> =
            participants.iter().filter(|p| p.points > 0).collect();
        ranked.sort_by(|a, b| b.points.cmp(&a.points).then(a.member_id.cmp(&b.member_id)));
        stats.top_contributors = ranked
            .into_iter()
            .take(TOP_CONTRIBUTORS)
            .map(|p| Contributor {
                member_id: p.member_id,
                guild_id: p.guild_id,
                display_name: p.display_name.clone(),
                points: p.points,
            })
            .collect();

        stats
    }
}
