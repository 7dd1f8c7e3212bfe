//! Taken-sector ledger
//!
//! Accumulates priority-ordered level-of-detail commitments under a running
//! cost total. A ledger is built fresh for every culling pass; there is no
//! `clear()` to forget. Committing a sector to detailed transitively commits
//! its ancestors, so the tree-consistency invariant (no detailed sector under
//! a discarded ancestor) holds after every commit:
//!
//! - replacement scheme (v8): every sector on the root-to-target path becomes
//!   detailed, and off-path children of path sectors drop to simple so the
//!   replaced geometry still has coarse coverage;
//! - flat scheme (v9): only the path itself is committed, sectors accumulate
//!   additively and there is no simple level.
//!
//! A sector with no payload at a level is never assigned that level.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::{EngineError, EngineResult};
use crate::scene::{LevelOfDetail, ModelId, SceneVersion, SectorId, SectorModel};

use super::budget::{sector_cost, SectorBudget, SectorCost, SectorLoadingSpent};
use super::types::WantedSector;

#[derive(Debug, Clone, Copy)]
struct TakenEntry {
    level: LevelOfDetail,
    priority: f32,
}

/// Per-model commitment tree.
#[derive(Debug)]
pub struct TakenSectorTree {
    model: SectorModel,
    version: SceneVersion,
    taken: FxHashMap<SectorId, TakenEntry>,
    total_cost: SectorCost,
}

impl TakenSectorTree {
    pub fn new(model: SectorModel) -> EngineResult<Self> {
        let version = model.version()?;
        Ok(Self {
            model,
            version,
            taken: FxHashMap::default(),
            total_cost: SectorCost::default(),
        })
    }

    pub fn total_cost(&self) -> &SectorCost {
        &self.total_cost
    }

    pub fn level_of(&self, sector: SectorId) -> LevelOfDetail {
        self.taken
            .get(&sector)
            .map(|e| e.level)
            .unwrap_or(LevelOfDetail::Discarded)
    }

    pub fn taken_sector_count(&self) -> usize {
        self.taken
            .values()
            .filter(|e| e.level != LevelOfDetail::Discarded)
            .count()
    }

    /// Commits `sector` (and transitively its ancestors) to detailed with the
    /// given priority. Re-committing merges priorities with `max`.
    pub fn mark_sector_detailed(&mut self, sector: SectorId, priority: f32) -> EngineResult<()> {
        let scene = Arc::clone(&self.model.scene);
        let path = scene.path_from_root(sector).ok_or(EngineError::MissingSector {
            model: self.model.id,
            sector,
        })?;

        for &id in &path {
            self.commit(id, LevelOfDetail::Detailed, priority);
            if self.version.has_simple_level() {
                // Children of a replaced (detailed) sector must show coarse
                // geometry, unless they are on the path themselves.
                let children = match scene.sector(id) {
                    Some(metadata) => &metadata.children,
                    None => continue,
                };
                for &child in children {
                    if path.contains(&child) {
                        continue;
                    }
                    if self.level_of(child) == LevelOfDetail::Discarded {
                        self.commit(child, LevelOfDetail::Simple, 0.0);
                    }
                }
            }
        }
        Ok(())
    }

    /// Raises the tracked level of one sector, skipping levels the sector has
    /// no payload for and keeping the running cost total in sync.
    fn commit(&mut self, id: SectorId, level: LevelOfDetail, priority: f32) {
        let scene = Arc::clone(&self.model.scene);
        let metadata = match scene.sector(id) {
            Some(metadata) => metadata,
            None => return,
        };
        let target = if metadata.has_payload(level) {
            level
        } else {
            LevelOfDetail::Discarded
        };

        let entry = self.taken.entry(id).or_insert(TakenEntry {
            level: LevelOfDetail::Discarded,
            priority: f32::NEG_INFINITY,
        });
        entry.priority = entry.priority.max(priority);
        if target <= entry.level {
            return;
        }
        let old_cost = sector_cost(metadata, entry.level);
        let new_cost = sector_cost(metadata, target);
        self.total_cost.subtract(&old_cost);
        self.total_cost.add(&new_cost);
        entry.level = target;
    }

    /// Materializes one wanted sector per scene sector, discarded included, so
    /// the loader can also unload sectors that fell out of the commitment set.
    fn collect_into(&self, out: &mut Vec<WantedSector>) {
        for metadata in self.model.scene.iter() {
            let (level, priority) = match self.taken.get(&metadata.id) {
                Some(entry) => (entry.level, entry.priority.max(0.0)),
                None => (LevelOfDetail::Discarded, 0.0),
            };
            out.push(WantedSector {
                model: self.model.id,
                sector: metadata.id,
                level,
                clip_box: self.model.geometry_clip_box,
                priority: if level == LevelOfDetail::Discarded {
                    0.0
                } else {
                    priority
                },
            });
        }
    }

    fn accumulate_spent(&self, spent: &mut SectorLoadingSpent) {
        spent.total_sector_count += self.model.scene.sector_count();
        for entry in self.taken.values() {
            if entry.level == LevelOfDetail::Discarded {
                continue;
            }
            spent.loaded_sector_count += 1;
            match entry.level {
                LevelOfDetail::Simple => spent.simple_sector_count += 1,
                LevelOfDetail::Detailed => spent.detailed_sector_count += 1,
                LevelOfDetail::Discarded => unreachable!(),
            }
            if entry.priority.is_infinite() {
                spent.forced_detailed_sector_count += 1;
            } else if entry.priority > 0.0 {
                spent.accumulated_priority += entry.priority;
            }
        }
        spent.download_size += self.total_cost.download_size;
        spent.draw_calls += self.total_cost.draw_calls;
        spent.render_cost += self.total_cost.render_cost;
    }
}

/// Commitments across all models of one culling pass.
#[derive(Debug, Default)]
pub struct TakenSectorMap {
    trees: Vec<TakenSectorTree>,
    by_model: FxHashMap<ModelId, usize>,
}

impl TakenSectorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model for this pass. Required before any commit against it.
    pub fn initialize_scene(&mut self, model: &SectorModel) -> EngineResult<()> {
        assert!(
            !self.by_model.contains_key(&model.id),
            "scene for {} initialized twice in one pass",
            model.id
        );
        let tree = TakenSectorTree::new(model.clone())?;
        self.by_model.insert(model.id, self.trees.len());
        self.trees.push(tree);
        Ok(())
    }

    pub fn mark_sector_detailed(
        &mut self,
        model: ModelId,
        sector: SectorId,
        priority: f32,
    ) -> EngineResult<()> {
        let index = *self
            .by_model
            .get(&model)
            .unwrap_or_else(|| panic!("commit against uninitialized scene {model}"));
        self.trees[index].mark_sector_detailed(sector, priority)
    }

    pub fn total_cost(&self) -> SectorCost {
        let mut total = SectorCost::default();
        for tree in &self.trees {
            total.add(tree.total_cost());
        }
        total
    }

    pub fn is_within_budget(&self, budget: &SectorBudget) -> bool {
        self.total_cost().within(budget)
    }

    pub fn taken_sector_count(&self) -> usize {
        self.trees.iter().map(|t| t.taken_sector_count()).sum()
    }

    /// All tracked sectors of all models, sorted by descending priority.
    /// Discarded sectors carry priority 0 and interleave accordingly; the
    /// sort is stable so sectors of equal priority keep scene order.
    pub fn collect_wanted_sectors(&self) -> Vec<WantedSector> {
        let mut wanted = Vec::new();
        for tree in &self.trees {
            tree.collect_into(&mut wanted);
        }
        wanted.sort_by(|l, r| r.priority.total_cmp(&l.priority));
        wanted
    }

    /// Spend report over all non-discarded commitments.
    pub fn compute_spent_budget(&self) -> SectorLoadingSpent {
        let mut spent = SectorLoadingSpent::default();
        for tree in &self.trees {
            tree.accumulate_spent(&mut spent);
        }
        spent
    }
}
