//! Starting layout for a freshly activated war

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::config::MapConfig;
use crate::core::types::Position;
use crate::territory::TerritoryKind;

/// Placement attempts before the spacing requirement is relaxed
const ATTEMPTS_PER_SPACING: u32 = 200;

/// A territory before it joins a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerritorySeed {
    pub name: String,
    pub kind: TerritoryKind,
    pub position: Position,
}

/// Place every territory the map config asks for
///
/// Positions stay `margin` away from the edges and try to keep `min_spacing`
/// between territories. When a crowded map cannot satisfy the spacing, it is
/// halved until placement succeeds, so generation always terminates.
pub fn generate_layout<R: Rng + ?Sized>(config: &MapConfig, rng: &mut R) -> Vec<TerritorySeed> {
    let counts = [
        (TerritoryKind::Gate, config.gates),
        (TerritoryKind::Resource, config.resources),
        (TerritoryKind::Stronghold, config.strongholds),
        (TerritoryKind::Outpost, config.outposts),
    ];

    let lo = config.margin.clamp(0.0, 0.49);
    let hi = 1.0 - lo;
    let mut placed: Vec<TerritorySeed> = Vec::with_capacity(config.territory_count() as usize);

    for (kind, count) in counts {
        for n in 1..=count {
            let position = place(&placed, lo, hi, config.min_spacing, rng);
            placed.push(TerritorySeed {
                name: format!("{} {}", kind.label(), n),
                kind,
                position,
            });
        }
    }

    placed
}

fn place<R: Rng + ?Sized>(
    placed: &[TerritorySeed],
    lo: f32,
    hi: f32,
    min_spacing: f32,
    rng: &mut R,
) -> Position {
    let mut spacing = min_spacing.max(0.0);
    loop {
        for _ in 0..ATTEMPTS_PER_SPACING {
            let candidate = Position::new(rng.gen_range(lo..=hi), rng.gen_range(lo..=hi));
            if placed
                .iter()
                .all(|other| other.position.distance(&candidate) >= spacing)
            {
                return candidate;
            }
        }
        if spacing <= f32::EPSILON {
            return Position::new(rng.gen_range(lo..=hi), rng.gen_range(lo..=hi));
        }
        spacing /= 2.0;
        tracing::debug!(spacing, "relaxing territory spacing");
    }
}
