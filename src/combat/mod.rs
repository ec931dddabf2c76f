//! Combat resolution: turning attacks and reinforcements into outcomes

pub mod resolver;

pub use resolver::{
    award_points, contested_view, preview_attack, resolve_attack, resolve_reinforce,
    success_chance, AttackOutcome, AttackPreview, CombatRules, ReinforceOutcome,
};
