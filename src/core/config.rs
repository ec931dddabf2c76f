//! War configuration with documented constants
//!
//! All tunables are collected here with explanations of their purpose
//! and how they interact with each other. Every field has a default, so a
//! TOML file only needs to name the values it changes.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{Result, WarError};
use crate::core::types::Millis;

const SECOND_MS: Millis = 1_000;

/// Largest accepted `min_attack_force`
pub const MAX_MIN_ATTACK_FORCE: u32 = 1_000_000;

/// Combat resolution tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    /// Smallest force an attack may commit
    pub min_attack_force: u32,

    /// Lower clamp for success chance
    ///
    /// Keeps a hopeless attack from being a certain loss.
    pub chance_floor: f64,

    /// Upper clamp for success chance
    ///
    /// Keeps an undefended territory from being a certain capture.
    pub chance_ceiling: f64,

    /// Resource units earned per unit of committed force
    pub reward_factor: f64,

    /// Optional upper bound on reinforcements held by one territory
    ///
    /// `None` means reinforcements only saturate at `u32::MAX`.
    pub max_reinforcements: Option<u32>,

    /// Fraction of reinforcements lost on every holding pass
    ///
    /// Applied with rounding down, so small garrisons erode to zero.
    pub reinforcement_decay: f64,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            min_attack_force: 50,
            chance_floor: 0.10,
            chance_ceiling: 0.90,
            reward_factor: 1.5,
            max_reinforcements: None,
            reinforcement_decay: 0.05,
        }
    }
}

/// Whether a cooldown blocks everybody or only the guild that acted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CooldownScope {
    #[default]
    Territory,
    PerGuild,
}

/// Phase durations and clock-driven behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Length of the registration window after declaration
    pub prep_duration_secs: u64,

    /// Length of the active phase
    pub war_duration_secs: u64,

    /// Lock applied to a territory after any resolved action
    pub cooldown_secs: u64,

    pub cooldown_scope: CooldownScope,

    /// How often the sweep checks in-flight wars
    ///
    /// Phase end times are sparse, so second granularity is plenty.
    pub sweep_interval_ms: u64,

    /// Delay between conclusion and automatic archiving
    ///
    /// `None` disables automatic archiving; wars then wait for an
    /// explicit archive call.
    pub auto_archive_after_secs: Option<u64>,

    /// Spacing of holding passes, counted from the start of the war
    ///
    /// Each pass pays every controller its territory's holding points and
    /// decays reinforcements. Zero disables holding income.
    pub holding_interval_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            prep_duration_secs: 24 * 3600,
            war_duration_secs: 48 * 3600,
            cooldown_secs: 5 * 60,
            cooldown_scope: CooldownScope::Territory,
            sweep_interval_ms: 1_000,
            auto_archive_after_secs: Some(0),
            holding_interval_secs: 300,
        }
    }
}

impl TimingConfig {
    pub fn prep_duration_ms(&self) -> Millis {
        self.prep_duration_secs * SECOND_MS
    }

    pub fn war_duration_ms(&self) -> Millis {
        self.war_duration_secs * SECOND_MS
    }

    pub fn cooldown_ms(&self) -> Millis {
        self.cooldown_secs * SECOND_MS
    }

    pub fn auto_archive_after_ms(&self) -> Option<Millis> {
        self.auto_archive_after_secs.map(|s| s * SECOND_MS)
    }

    pub fn holding_interval_ms(&self) -> Option<Millis> {
        (self.holding_interval_secs > 0).then(|| self.holding_interval_secs * SECOND_MS)
    }
}

/// Declaration and registration gates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Minimum character level to be registered as a participant
    pub min_member_level: u32,

    /// Participant cap per guild per war
    pub max_participants: usize,

    /// Minimum guild level for either side of a war
    pub min_guild_level: u32,

    /// Minimum active roster size of the challenging guild
    pub min_active_members: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            min_member_level: 30,
            max_participants: 50,
            min_guild_level: 10,
            min_active_members: 10,
        }
    }
}

/// Score awarded per event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PointsConfig {
    pub kill: u64,
    pub boss_defeat: u64,

    /// Reward units per point for captures and successful defenses
    ///
    /// points = floor(reward * kind reward multiplier / capture_divisor)
    pub capture_divisor: f64,
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self {
            kill: 10,
            boss_defeat: 100,
            capture_divisor: 10.0,
        }
    }
}

/// Starting layout and adjacency
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Territories closer than this (normalized units) are neighbors
    pub adjacency_radius: f32,

    pub gates: u32,
    pub resources: u32,
    pub strongholds: u32,
    pub outposts: u32,

    /// Distance kept from the map edge when placing territories
    pub margin: f32,

    /// Preferred minimum distance between two territories
    ///
    /// Relaxed progressively when a crowded layout cannot satisfy it.
    pub min_spacing: f32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            adjacency_radius: 0.2,
            gates: 5,
            resources: 8,
            strongholds: 3,
            outposts: 6,
            margin: 0.05,
            min_spacing: 0.1,
        }
    }
}

impl MapConfig {
    pub fn territory_count(&self) -> u32 {
        self.gates + self.resources + self.strongholds + self.outposts
    }
}

/// Event journal and archive persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub directory: String,

    /// Archives older than this are removed by cleanup
    pub retention_days: u64,

    /// Attempts per write before a persistence failure is surfaced
    pub persistence_retries: u32,

    /// Pause between persistence attempts, multiplied by the attempt number
    pub retry_backoff_ms: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            directory: "data/war_archives".to_string(),
            retention_days: 90,
            persistence_retries: 3,
            retry_backoff_ms: 10,
        }
    }
}

/// Complete war engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WarConfig {
    pub combat: CombatConfig,
    pub timing: TimingConfig,
    pub registry: RegistryConfig,
    pub points: PointsConfig,
    pub map: MapConfig,
    pub archive: ArchiveConfig,

    /// Mixed into every per-war RNG seed; `None` draws from entropy
    pub seed: Option<u64>,
}

impl WarConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: WarConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            WarError::Config(format!("failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        let c = &self.combat;
        if !(0.0..=1.0).contains(&c.chance_floor)
            || !(0.0..=1.0).contains(&c.chance_ceiling)
            || c.chance_floor > c.chance_ceiling
        {
            return Err(WarError::Config(format!(
                "chance bounds must satisfy 0 <= floor ({}) <= ceiling ({}) <= 1",
                c.chance_floor, c.chance_ceiling
            )));
        }
        if c.min_attack_force == 0 {
            return Err(WarError::Config("min_attack_force must be positive".into()));
        }
        if c.min_attack_force > MAX_MIN_ATTACK_FORCE {
            return Err(WarError::Config(format!(
                "min_attack_force ({}) must not exceed {}",
                c.min_attack_force, MAX_MIN_ATTACK_FORCE
            )));
        }
        if !(0.0..=1.0).contains(&c.reinforcement_decay) {
            return Err(WarError::Config(format!(
                "reinforcement_decay ({}) must be in [0, 1]",
                c.reinforcement_decay
            )));
        }
        if c.reward_factor < 0.0 {
            return Err(WarError::Config("reward_factor must not be negative".into()));
        }

        if self.timing.war_duration_secs == 0 {
            return Err(WarError::Config("war_duration_secs must be positive".into()));
        }
        if self.timing.sweep_interval_ms == 0 {
            return Err(WarError::Config("sweep_interval_ms must be positive".into()));
        }

        if self.registry.max_participants == 0 {
            return Err(WarError::Config("max_participants must be positive".into()));
        }

        if self.points.capture_divisor <= 0.0 {
            return Err(WarError::Config("capture_divisor must be positive".into()));
        }

        let m = &self.map;
        if m.adjacency_radius <= 0.0 {
            return Err(WarError::Config("adjacency_radius must be positive".into()));
        }
        if !(0.0..0.5).contains(&m.margin) {
            return Err(WarError::Config(format!(
                "margin ({}) must be in [0, 0.5)",
                m.margin
            )));
        }
        if m.territory_count() == 0 {
            return Err(WarError::Config("layout must contain at least one territory".into()));
        }

        if self.archive.persistence_retries == 0 {
            return Err(WarError::Config("persistence_retries must be at least 1".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = WarConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.combat.min_attack_force, 50);
        assert_eq!(config.timing.cooldown_ms(), 300_000);
        assert_eq!(config.registry.min_member_level, 30);
        assert_eq!(config.map.territory_count(), 22);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = WarConfig::from_toml_str(
            r#"
            seed = 42

            [combat]
            min_attack_force = 75

            [timing]
            cooldown_scope = "per-guild"
            "#,
        )
        .unwrap();
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.combat.min_attack_force, 75);
        assert_eq!(config.combat.chance_ceiling, 0.90);
        assert_eq!(config.timing.cooldown_scope, CooldownScope::PerGuild);
        assert_eq!(config.registry.max_participants, 50);
    }

    #[test]
    fn test_inverted_chance_bounds_rejected() {
        let mut config = WarConfig::default();
        config.combat.chance_floor = 0.95;
        assert!(matches!(config.validate(), Err(WarError::Config(_))));
    }

    #[test]
    fn test_out_of_range_tunables_rejected() {
        let mut config = WarConfig::default();
        config.combat.reinforcement_decay = 1.5;
        assert!(matches!(config.validate(), Err(WarError::Config(_))));

        let mut config = WarConfig::default();
        config.combat.min_attack_force = u32::MAX;
        assert!(matches!(config.validate(), Err(WarError::Config(_))));
    }

    #[test]
    fn test_holding_can_be_disabled() {
        let config = WarConfig::from_toml_str(
            r#"
            [timing]
            holding_interval_secs = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.timing.holding_interval_ms(), None);
        assert_eq!(WarConfig::default().timing.holding_interval_ms(), Some(300_000));
        assert_eq!(WarConfig::default().combat.reinforcement_decay, 0.05);
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = WarConfig::from_toml_str("[combat\nmin_attack_force = 1").unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_shipped_config_loads() {
        let config = WarConfig::load("data/war.toml").expect("Should load data/war.toml");
        assert!(config.validate().is_ok());
    }
}
