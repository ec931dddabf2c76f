//! Attack and reinforcement resolution
//!
//! Pure functions: they read a territory and return the territory as it
//! should look afterwards. Nothing here touches shared state, so the caller
//! decides when (and whether) an outcome is committed.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::config::WarConfig;
use crate::core::error::{Result, WarError};
use crate::core::types::{GuildId, WarSides};
use crate::territory::{Territory, TerritoryKind, TerritoryStatus};

/// Numeric rules the resolver needs, lifted out of `WarConfig`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombatRules {
    pub min_attack_force: u32,
    pub chance_floor: f64,
    pub chance_ceiling: f64,
    pub reward_factor: f64,
    pub max_reinforcements: Option<u32>,
    pub capture_divisor: f64,
}

impl Default for CombatRules {
    fn default() -> Self {
        Self::from(&WarConfig::default())
    }
}

impl From<&WarConfig> for CombatRules {
    fn from(config: &WarConfig) -> Self {
        Self {
            min_attack_force: config.combat.min_attack_force,
            chance_floor: config.combat.chance_floor,
            chance_ceiling: config.combat.chance_ceiling,
            reward_factor: config.combat.reward_factor,
            max_reinforcements: config.combat.max_reinforcements,
            capture_divisor: config.points.capture_divisor,
        }
    }
}

/// What an attacker can expect before committing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttackPreview {
    pub success_chance: f64,
    pub effective_defense: f64,
    pub estimated_reward: u64,
}

/// Result of a resolved attack
#[derive(Debug, Clone, PartialEq)]
pub struct AttackOutcome {
    pub captured: bool,
    /// The uniform draw compared against the success chance
    pub roll: f64,
    pub preview: AttackPreview,
    pub previous_controller: Option<GuildId>,
    /// The territory after resolution
    pub territory: Territory,
}

/// Result of a reinforcement
#[derive(Debug, Clone, PartialEq)]
pub struct ReinforceOutcome {
    pub previous: u32,
    pub reinforcements: u32,
    pub territory: Territory,
}

impl ReinforceOutcome {
    /// Amount actually added (less than requested only when a cap applies)
    pub fn added(&self) -> u32 {
        self.reinforcements.saturating_sub(self.previous)
    }
}

/// `clamp(force / (force + effective_defense), floor, ceiling)`
pub fn success_chance(force: u32, effective_defense: f64, floor: f64, ceiling: f64) -> f64 {
    let force = force as f64;
    let total = force + effective_defense.max(0.0);
    let raw = if total > 0.0 { force / total } else { ceiling };
    raw.clamp(floor, ceiling)
}

pub fn preview_attack(territory: &Territory, force: u32, rules: &CombatRules) -> Result<AttackPreview> {
    if force < rules.min_attack_force {
        return Err(WarError::ForceBelowMinimum {
            force,
            minimum: rules.min_attack_force,
        });
    }
    let effective_defense = territory.defense.effective();
    Ok(AttackPreview {
        success_chance: success_chance(
            force,
            effective_defense,
            rules.chance_floor,
            rules.chance_ceiling,
        ),
        effective_defense,
        estimated_reward: (force as f64 * rules.reward_factor).floor() as u64,
    })
}

/// Resolve an attack with one uniform draw
///
/// On success the attacker's guild takes control and reinforcements reset to
/// zero. On failure the returned territory equals the input.
pub fn resolve_attack<R: Rng + ?Sized>(
    territory: &Territory,
    sides: &WarSides,
    attacker: GuildId,
    force: u32,
    rules: &CombatRules,
    rng: &mut R,
) -> Result<AttackOutcome> {
    let side = sides.side_of(attacker).ok_or_else(|| {
        WarError::NotEligible(format!("guild {} is not a party to this war", attacker))
    })?;
    if territory.controller == Some(attacker) {
        return Err(WarError::AlreadyController {
            territory: territory.id,
            guild: attacker,
        });
    }

    let preview = preview_attack(territory, force, rules)?;
    let roll: f64 = rng.gen();
    let captured = roll < preview.success_chance;

    let mut after = territory.clone();
    if captured {
        after.apply_status(sides, TerritoryStatus::controlled_by(side), Some(attacker))?;
        after.defense.reinforcements = 0;
    }

    Ok(AttackOutcome {
        captured,
        roll,
        preview,
        previous_controller: territory.controller,
        territory: after,
    })
}

/// Add reinforcements to a territory the caller's guild controls
pub fn resolve_reinforce(
    territory: &Territory,
    guild: GuildId,
    amount: u32,
    rules: &CombatRules,
) -> Result<ReinforceOutcome> {
    if territory.controller != Some(guild) {
        return Err(WarError::NotController {
            territory: territory.id,
            guild,
        });
    }
    if amount == 0 {
        return Err(WarError::InvalidRequest("reinforcement amount must be positive".into()));
    }

    let mut after = territory.clone();
    let previous = after.defense.reinforcements;
    let reinforcements = after.defense.reinforce(amount, rules.max_reinforcements);

    Ok(ReinforceOutcome {
        previous,
        reinforcements,
        territory: after,
    })
}

/// Points for a capture, or for the defender-of-record holding off an attack
pub fn award_points(reward: u64, kind: TerritoryKind, rules: &CombatRules) -> u64 {
    (reward as f64 * kind.reward_multiplier() / rules.capture_divisor).floor() as u64
}

/// The territory as subscribers see it while an attack is in flight
pub fn contested_view(territory: &Territory) -> Territory {
    let mut view = territory.clone();
    view.status = TerritoryStatus::Contested;
    view
}
