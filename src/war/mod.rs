//! Wars: lifecycle, participants, scoring and statistics

pub mod manager;
pub mod participants;
pub mod scores;
pub mod stats;
pub mod sweep;

pub use manager::{
    AttackReport, ReinforceReport, RngFactory, TickReport, WarManager, WarManagerBuilder,
    WarSnapshot,
};
pub use participants::{ParticipantEntry, ParticipantRegistry, Registration};
pub use scores::Scores;
pub use stats::{Contributor, WarStatistics};
pub use sweep::WarSweeper;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::types::{GuildId, MemberId, Millis, WarId, WarSides};

/// Lifecycle phase of a war
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarPhase {
    Declared,
    Preparing,
    Active,
    Concluded,
    Archived,
}

impl WarPhase {
    /// The only legal transitions, in order
    pub fn can_transition_to(&self, next: WarPhase) -> bool {
        matches!(
            (self, next),
            (WarPhase::Declared, WarPhase::Preparing)
                | (WarPhase::Preparing, WarPhase::Active)
                | (WarPhase::Active, WarPhase::Concluded)
                | (WarPhase::Concluded, WarPhase::Archived)
        )
    }

    /// Declared, preparing and active wars keep both guilds busy
    pub fn is_ongoing(&self) -> bool {
        matches!(
            self,
            WarPhase::Declared | WarPhase::Preparing | WarPhase::Active
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            WarPhase::Declared => "declared",
            WarPhase::Preparing => "preparing",
            WarPhase::Active => "active",
            WarPhase::Concluded => "concluded",
            WarPhase::Archived => "archived",
        }
    }
}

/// Outcome of a finished war from one guild's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarResult {
    Won,
    Lost,
    Draw,
}

/// The war entity as exposed to callers and stored in archives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct War {
    pub id: WarId,
    pub challenger: GuildId,
    pub defender: GuildId,
    pub phase: WarPhase,
    pub declared_at: Millis,
    pub prep_ends_at: Millis,
    /// Bounds of the active phase, set on activation
    pub start_time: Option<Millis>,
    pub end_time: Option<Millis>,
    pub concluded_at: Option<Millis>,
    pub archived_at: Option<Millis>,
    pub scores: BTreeMap<GuildId, u64>,
    /// `None` until concluded, and for a draw
    pub winner: Option<GuildId>,
    pub participants: BTreeMap<GuildId, Vec<MemberId>>,
    pub statistics: WarStatistics,
}

impl War {
    pub fn sides(&self) -> WarSides {
        WarSides::new(self.challenger, self.defender)
    }

    pub fn opponent_of(&self, guild: GuildId) -> Option<GuildId> {
        let sides = self.sides();
        sides.side_of(guild).map(|side| sides.guild(side.opponent()))
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, WarPhase::Concluded | WarPhase::Archived)
    }

    pub fn result_for(&self, guild: GuildId) -> Option<WarResult> {
        if !self.is_finished() || !self.sides().contains(guild) {
            return None;
        }
        Some(match self.winner {
            None => WarResult::Draw,
            Some(winner) if winner == guild => WarResult::Won,
            Some(_) => WarResult::Lost,
        })
    }
}

/// Winner by strictly higher score; equal scores are a draw
pub fn decide_winner(sides: &WarSides, scores: &BTreeMap<GuildId, u64>) -> Option<GuildId> {
    let challenger = scores.get(&sides.challenger).copied().unwrap_or(0);
    let defender = scores.get(&sides.defender).copied().unwrap_or(0);
    match challenger.cmp(&defender) {
        std::cmp::Ordering::Greater => Some(sides.challenger),
        std::cmp::Ordering::Less => Some(sides.defender),
        std::cmp::Ordering::Equal => None,
    }
}
