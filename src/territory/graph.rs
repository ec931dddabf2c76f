//! Territory graph with derived adjacency
//!
//! Territories live in an id-indexed arena, each behind its own mutex so that
//! actions against different territories never contend. Adjacency is never
//! stored as edges: two territories are neighbors iff their distance is below
//! `adjacency_radius`. The derived table is cached and dropped whenever the
//! territory set or a position changes.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use ahash::AHashMap;

use crate::core::error::{Result, WarError};
use crate::core::sync;
use crate::core::types::{GuildId, Position, Side, TerritoryId, WarSides};
use crate::territory::layout::TerritorySeed;
use crate::territory::{Territory, TerritoryStatus};

type Adjacency = AHashMap<TerritoryId, Vec<TerritoryId>>;

pub struct TerritoryGraph {
    sides: WarSides,
    adjacency_radius: f32,
    reinforcement_cap: Option<u32>,
    slots: BTreeMap<TerritoryId, Mutex<Territory>>,
    /// Positions mirrored outside the slot mutexes; they only change through
    /// `&mut self`, so neighbor queries never wait on an in-flight action
    positions: BTreeMap<TerritoryId, Position>,
    adjacency: RwLock<Option<Arc<Adjacency>>>,
    next_id: u32,
}

impl TerritoryGraph {
    pub fn new(sides: WarSides, adjacency_radius: f32, reinforcement_cap: Option<u32>) -> Self {
        Self {
            sides,
            adjacency_radius,
            reinforcement_cap,
            slots: BTreeMap::new(),
            positions: BTreeMap::new(),
            adjacency: RwLock::new(None),
            next_id: 0,
        }
    }

    /// Build a graph from a starting layout; ids follow layout order
    pub fn seeded(
        sides: WarSides,
        adjacency_radius: f32,
        reinforcement_cap: Option<u32>,
        seeds: Vec<TerritorySeed>,
    ) -> Self {
        let mut graph = Self::new(sides, adjacency_radius, reinforcement_cap);
        for seed in seeds {
            graph.insert(seed);
        }
        graph
    }

    pub fn sides(&self) -> &WarSides {
        &self.sides
    }

    pub fn adjacency_radius(&self) -> f32 {
        self.adjacency_radius
    }

    pub fn reinforcement_cap(&self) -> Option<u32> {
        self.reinforcement_cap
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = TerritoryId> + '_ {
        self.slots.keys().copied()
    }

    pub fn contains(&self, id: TerritoryId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Add a neutral territory
    pub fn insert(&mut self, seed: TerritorySeed) -> TerritoryId {
        let id = TerritoryId(self.next_id);
        self.next_id += 1;
        let territory = Territory::neutral(id, seed.name, seed.kind, seed.position);
        self.positions.insert(id, territory.position);
        self.slots.insert(id, Mutex::new(territory));
        self.invalidate_adjacency();
        id
    }

    pub fn remove(&mut self, id: TerritoryId) -> Result<Territory> {
        let slot = self.slots.remove(&id).ok_or(WarError::TerritoryNotFound(id))?;
        self.positions.remove(&id);
        self.invalidate_adjacency();
        Ok(slot.into_inner().unwrap_or_else(std::sync::PoisonError::into_inner))
    }

    pub fn relocate(&mut self, id: TerritoryId, position: Position) -> Result<()> {
        if !position.is_normalized() {
            return Err(WarError::InvalidRequest(format!(
                "position ({}, {}) is outside the normalized map",
                position.x, position.y
            )));
        }
        let slot = self.slots.get_mut(&id).ok_or(WarError::TerritoryNotFound(id))?;
        slot.get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .position = position;
        self.positions.insert(id, position);
        self.invalidate_adjacency();
        Ok(())
    }

    /// Exclusive access to one territory for the duration of an action
    pub fn lock(&self, id: TerritoryId) -> Result<MutexGuard<'_, Territory>> {
        let slot = self.slots.get(&id).ok_or(WarError::TerritoryNotFound(id))?;
        Ok(sync::lock(slot))
    }

    pub fn get(&self, id: TerritoryId) -> Result<Territory> {
        Ok(self.lock(id)?.clone())
    }

    /// Every territory, ordered by id
    pub fn all(&self) -> Vec<Territory> {
        self.slots.values().map(|slot| sync::lock(slot).clone()).collect()
    }

    pub fn set_status(
        &self,
        id: TerritoryId,
        status: TerritoryStatus,
        controller: Option<GuildId>,
    ) -> Result<()> {
        let sides = self.sides;
        self.lock(id)?.apply_status(&sides, status, controller)
    }

    /// Returns the new reinforcement total
    pub fn add_reinforcement(&self, id: TerritoryId, amount: u32) -> Result<u32> {
        let cap = self.reinforcement_cap;
        Ok(self.lock(id)?.defense.reinforce(amount, cap))
    }

    pub fn neighbors(&self, id: TerritoryId) -> Result<Vec<TerritoryId>> {
        if !self.slots.contains_key(&id) {
            return Err(WarError::TerritoryNotFound(id));
        }
        let adjacency = self.adjacency();
        Ok(adjacency.get(&id).cloned().unwrap_or_default())
    }

    /// Territories held per side plus neutral ones: (challenger, defender, neutral)
    pub fn control_counts(&self) -> (u32, u32, u32) {
        let mut counts = (0, 0, 0);
        for slot in self.slots.values() {
            let territory = sync::lock(slot);
            match territory.controller.and_then(|g| self.sides.side_of(g)) {
                Some(Side::Challenger) => counts.0 += 1,
                Some(Side::Defender) => counts.1 += 1,
                None => counts.2 += 1,
            }
        }
        counts
    }

    fn adjacency(&self) -> Arc<Adjacency> {
        if let Some(cached) = sync::read(&self.adjacency).as_ref() {
            return Arc::clone(cached);
        }
        let computed = Arc::new(self.compute_adjacency());
        *sync::write(&self.adjacency) = Some(Arc::clone(&computed));
        computed
    }

    fn compute_adjacency(&self) -> Adjacency {
        let entries: Vec<(TerritoryId, Position)> =
            self.positions.iter().map(|(id, pos)| (*id, *pos)).collect();
        let mut adjacency: Adjacency = entries.iter().map(|(id, _)| (*id, Vec::new())).collect();

        for (i, (a, pa)) in entries.iter().enumerate() {
            for (b, pb) in entries.iter().skip(i + 1) {
                if pa.distance(pb) < self.adjacency_radius {
                    adjacency.entry(*a).or_default().push(*b);
                    adjacency.entry(*b).or_default().push(*a);
                }
            }
        }
        for list in adjacency.values_mut() {
            list.sort();
        }
        adjacency
    }

    fn invalidate_adjacency(&mut self) {
        *self
            .adjacency
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::territory::TerritoryKind;

    fn seed(name: &str, x: f32, y: f32) -> TerritorySeed {
        TerritorySeed {
            name: name.to_string(),
            kind: TerritoryKind::Outpost,
            position: Position::new(x, y),
        }
    }

    fn graph() -> TerritoryGraph {
        TerritoryGraph::seeded(
            WarSides::new(GuildId(1), GuildId(2)),
            0.2,
            None,
            vec![
                seed("A", 0.10, 0.10),
                seed("B", 0.25, 0.10),
                seed("C", 0.80, 0.80),
                seed("D", 0.90, 0.85),
            ],
        )
    }

    #[test]
    fn test_neighbors_by_distance() {
        let g = graph();
        assert_eq!(g.neighbors(TerritoryId(0)).unwrap(), vec![TerritoryId(1)]);
        assert_eq!(g.neighbors(TerritoryId(2)).unwrap(), vec![TerritoryId(3)]);
        assert!(matches!(
            g.neighbors(TerritoryId(9)),
            Err(WarError::TerritoryNotFound(_))
        ));
    }

    #[test]
    fn test_relocate_invalidates_adjacency() {
        let mut g = graph();
        assert_eq!(g.neighbors(TerritoryId(0)).unwrap(), vec![TerritoryId(1)]);
        g.relocate(TerritoryId(2), Position::new(0.15, 0.2)).unwrap();
        assert_eq!(
            g.neighbors(TerritoryId(0)).unwrap(),
            vec![TerritoryId(1), TerritoryId(2)]
        );
        assert_eq!(g.get(TerritoryId(2)).unwrap().position, Position::new(0.15, 0.2));
    }

    #[test]
    fn test_insert_and_remove_invalidate_adjacency() {
        let mut g = graph();
        assert_eq!(g.neighbors(TerritoryId(0)).unwrap().len(), 1);
        let e = g.insert(seed("E", 0.12, 0.2));
        assert_eq!(
            g.neighbors(TerritoryId(0)).unwrap(),
            vec![TerritoryId(1), e]
        );
        g.remove(TerritoryId(1)).unwrap();
        assert_eq!(g.neighbors(TerritoryId(0)).unwrap(), vec![e]);
        assert_eq!(g.len(), 4);
    }

    #[test]
    fn test_relocate_outside_map_rejected() {
        let mut g = graph();
        assert!(g.relocate(TerritoryId(0), Position::new(1.5, 0.0)).is_err());
    }

    #[test]
    fn test_set_status_enforces_invariant() {
        let g = graph();
        let err = g
            .set_status(TerritoryId(0), TerritoryStatus::Neutral, Some(GuildId(1)))
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE_TRANSITION");
        g.set_status(
            TerritoryId(0),
            TerritoryStatus::ControlledByDefender,
            Some(GuildId(2)),
        )
        .unwrap();
        assert_eq!(g.get(TerritoryId(0)).unwrap().controller, Some(GuildId(2)));
        assert_eq!(g.control_counts(), (0, 1, 3));
    }

    #[test]
    fn test_add_reinforcement_respects_cap() {
        let g = TerritoryGraph::seeded(
            WarSides::new(GuildId(1), GuildId(2)),
            0.2,
            Some(150),
            vec![seed("A", 0.5, 0.5)],
        );
        assert_eq!(g.add_reinforcement(TerritoryId(0), 100).unwrap(), 100);
        assert_eq!(g.add_reinforcement(TerritoryId(0), 100).unwrap(), 150);
    }
}
