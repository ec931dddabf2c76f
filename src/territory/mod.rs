//! Territories: contestable map nodes and the graph that holds them

pub mod cooldown;
pub mod graph;
pub mod layout;

pub use cooldown::CooldownTracker;
pub use graph::TerritoryGraph;
pub use layout::{generate_layout, TerritorySeed};

use serde::{Deserialize, Serialize};

use crate::core::error::{Result, WarError};
use crate::core::types::{GuildId, Position, Side, TerritoryId, WarSides};

/// Territory type, exposed to clients and used for defense/reward tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerritoryKind {
    Gate,
    Resource,
    Stronghold,
    Outpost,
}

impl TerritoryKind {
    pub const ALL: [TerritoryKind; 4] = [
        TerritoryKind::Gate,
        TerritoryKind::Resource,
        TerritoryKind::Stronghold,
        TerritoryKind::Outpost,
    ];

    /// Multiplier applied to reinforcements when defending
    pub fn base_multiplier(&self) -> f64 {
        match self {
            TerritoryKind::Gate => 1.2,
            TerritoryKind::Resource => 1.1,
            TerritoryKind::Stronghold => 1.5,
            TerritoryKind::Outpost => 1.0,
        }
    }

    /// Multiplier applied to points earned over this territory
    pub fn reward_multiplier(&self) -> f64 {
        match self {
            TerritoryKind::Gate => 1.5,
            TerritoryKind::Resource => 1.3,
            TerritoryKind::Stronghold => 2.0,
            TerritoryKind::Outpost => 1.0,
        }
    }

    /// Points paid to the controller for each holding pass
    pub fn holding_points(&self) -> u64 {
        match self {
            TerritoryKind::Gate => 5,
            TerritoryKind::Resource => 3,
            TerritoryKind::Stronghold => 10,
            TerritoryKind::Outpost => 2,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TerritoryKind::Gate => "Gate",
            TerritoryKind::Resource => "Resource",
            TerritoryKind::Stronghold => "Stronghold",
            TerritoryKind::Outpost => "Outpost",
        }
    }
}

/// Control status of a territory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerritoryStatus {
    Neutral,
    ControlledByChallenger,
    ControlledByDefender,
    /// Transient, only while an attack is being resolved
    Contested,
}

impl TerritoryStatus {
    pub fn controlled_by(side: Side) -> Self {
        match side {
            Side::Challenger => TerritoryStatus::ControlledByChallenger,
            Side::Defender => TerritoryStatus::ControlledByDefender,
        }
    }

    pub fn controlling_side(&self) -> Option<Side> {
        match self {
            TerritoryStatus::ControlledByChallenger => Some(Side::Challenger),
            TerritoryStatus::ControlledByDefender => Some(Side::Defender),
            TerritoryStatus::Neutral | TerritoryStatus::Contested => None,
        }
    }
}

/// Defensive state of a territory
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Defense {
    pub reinforcements: u32,
    /// Always >= 1.0
    pub base_multiplier: f64,
}

impl Defense {
    pub fn new(reinforcements: u32, base_multiplier: f64) -> Self {
        Self {
            reinforcements,
            base_multiplier: base_multiplier.max(1.0),
        }
    }

    pub fn effective(&self) -> f64 {
        self.reinforcements as f64 * self.base_multiplier
    }

    /// Add reinforcements, saturating at `cap` (or `u32::MAX`)
    pub fn reinforce(&mut self, amount: u32, cap: Option<u32>) -> u32 {
        let limit = cap.unwrap_or(u32::MAX);
        self.reinforcements = self.reinforcements.saturating_add(amount).min(limit);
        self.reinforcements
    }

    /// Lose `fraction` of reinforcements `passes` times, rounding down each time
    pub fn decay(&mut self, fraction: f64, passes: u32) -> u32 {
        let keep = (1.0 - fraction).clamp(0.0, 1.0);
        for _ in 0..passes {
            if self.reinforcements == 0 {
                break;
            }
            self.reinforcements = (self.reinforcements as f64 * keep).floor() as u32;
        }
        self.reinforcements
    }
}

/// A contestable map node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Territory {
    pub id: TerritoryId,
    pub name: String,
    pub kind: TerritoryKind,
    pub position: Position,
    pub status: TerritoryStatus,
    #[serde(rename = "controller_guild_id")]
    pub controller: Option<GuildId>,
    pub defense: Defense,
}

impl Territory {
    pub fn neutral(id: TerritoryId, name: impl Into<String>, kind: TerritoryKind, position: Position) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            position,
            status: TerritoryStatus::Neutral,
            controller: None,
            defense: Defense::new(0, kind.base_multiplier()),
        }
    }

    /// Apply a status change, enforcing the status/controller invariant
    ///
    /// Settled statuses pin the controller: neutral has none, controlled-by-X
    /// has exactly X's guild. Contested keeps whatever controller the territory
    /// had when resolution began.
    pub fn apply_status(
        &mut self,
        sides: &WarSides,
        status: TerritoryStatus,
        controller: Option<GuildId>,
    ) -> Result<()> {
        let valid = match status {
            TerritoryStatus::Neutral => controller.is_none(),
            TerritoryStatus::ControlledByChallenger => controller == Some(sides.challenger),
            TerritoryStatus::ControlledByDefender => controller == Some(sides.defender),
            TerritoryStatus::Contested => controller == self.controller,
        };
        if !valid {
            return Err(WarError::InvalidStateTransition(format!(
                "territory {} cannot be {:?} with controller {:?}",
                self.id, status, controller
            )));
        }
        self.status = status;
        self.controller = controller;
        Ok(())
    }

    /// Status/controller invariant for settled territories
    pub fn is_consistent(&self, sides: &WarSides) -> bool {
        match self.status {
            TerritoryStatus::Neutral => self.controller.is_none(),
            TerritoryStatus::ControlledByChallenger => self.controller == Some(sides.challenger),
            TerritoryStatus::ControlledByDefender => self.controller == Some(sides.defender),
            TerritoryStatus::Contested => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sides() -> WarSides {
        WarSides::new(GuildId(1), GuildId(2))
    }

    fn gate() -> Territory {
        Territory::neutral(TerritoryId(0), "Gate 1", TerritoryKind::Gate, Position::new(0.5, 0.5))
    }

    #[test]
    fn test_neutral_territory_defaults() {
        let t = gate();
        assert_eq!(t.status, TerritoryStatus::Neutral);
        assert_eq!(t.controller, None);
        assert_eq!(t.defense.reinforcements, 0);
        assert_eq!(t.defense.base_multiplier, 1.2);
        assert!(t.is_consistent(&sides()));
    }

    #[test]
    fn test_status_requires_matching_controller() {
        let mut t = gate();
        let s = sides();
        assert!(t
            .apply_status(&s, TerritoryStatus::ControlledByChallenger, Some(GuildId(2)))
            .is_err());
        assert!(t.apply_status(&s, TerritoryStatus::Neutral, Some(GuildId(1))).is_err());
        assert!(t
            .apply_status(&s, TerritoryStatus::ControlledByChallenger, Some(GuildId(1)))
            .is_ok());
        assert_eq!(t.controller, Some(GuildId(1)));
    }

    #[test]
    fn test_contested_keeps_controller() {
        let mut t = gate();
        let s = sides();
        t.apply_status(&s, TerritoryStatus::ControlledByDefender, Some(GuildId(2)))
            .unwrap();
        assert!(t.apply_status(&s, TerritoryStatus::Contested, None).is_err());
        assert!(t
            .apply_status(&s, TerritoryStatus::Contested, Some(GuildId(2)))
            .is_ok());
    }

    #[test]
    fn test_reinforce_saturates_at_cap() {
        let mut d = Defense::new(90, 1.0);
        assert_eq!(d.reinforce(20, Some(100)), 100);
        let mut d = Defense::new(u32::MAX - 1, 1.0);
        assert_eq!(d.reinforce(10, None), u32::MAX);
    }

    #[test]
    fn test_decay_rounds_down_per_pass() {
        let mut d = Defense::new(100, 1.5);
        assert_eq!(d.decay(0.05, 1), 95);
        assert_eq!(d.decay(0.05, 1), 90);
        let mut small = Defense::new(10, 1.0);
        assert_eq!(small.decay(0.05, 1), 9);
        assert_eq!(small.decay(0.5, 10), 0);
        assert_eq!(Defense::new(7, 1.0).decay(0.0, 100), 7);
    }

    #[test]
    fn test_holding_points_by_kind() {
        let points: Vec<u64> = TerritoryKind::ALL.iter().map(|k| k.holding_points()).collect();
        assert_eq!(points, vec![5, 3, 10, 2]);
    }

    #[test]
    fn test_base_multiplier_floor() {
        assert_eq!(Defense::new(0, 0.4).base_multiplier, 1.0);
    }

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_string(&TerritoryStatus::ControlledByChallenger).unwrap();
        assert_eq!(json, "\"controlled-by-challenger\"");
    }
}
