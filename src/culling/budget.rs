//! Loading budget and cost accounting

use serde::{Deserialize, Serialize};

use crate::scene::{LevelOfDetail, SectorMetadata};

/// Caller-supplied ceiling on how much geometry one cycle may commit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SectorBudget {
    /// Ceiling on the aggregate estimated render cost.
    pub maximum_render_cost: f32,
    /// Optional ceiling on bytes to download.
    pub download_size_bytes: Option<u64>,
    /// Optional ceiling on draw calls.
    pub maximum_draw_calls: Option<usize>,
    /// Sectors closer to the camera than this are forced to high detail
    /// regardless of the budget.
    pub high_detail_proximity_threshold: f32,
}

impl Default for SectorBudget {
    fn default() -> Self {
        Self {
            maximum_render_cost: 15_000_000.0,
            download_size_bytes: Some(35 * 1024 * 1024),
            maximum_draw_calls: Some(2_000),
            high_detail_proximity_threshold: 10.0,
        }
    }
}

impl SectorBudget {
    /// Repository cache capacity derived from the budget. A generous multiple
    /// of what one cycle can commit, so recently discarded sectors stay warm
    /// across a few camera moves.
    pub fn derived_cache_size(&self, model_count: usize) -> usize {
        let from_cost = (self.maximum_render_cost / 100_000.0) as usize;
        (from_cost + 50 * model_count.max(1)).max(50)
    }
}

/// Aggregate cost of a set of committed sectors, one field per budget
/// dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SectorCost {
    pub download_size: u64,
    pub draw_calls: usize,
    pub render_cost: f32,
}

impl SectorCost {
    pub fn add(&mut self, other: &SectorCost) {
        self.download_size += other.download_size;
        self.draw_calls += other.draw_calls;
        self.render_cost += other.render_cost;
    }

    /// Removes a previously added contribution.
    pub fn subtract(&mut self, other: &SectorCost) {
        self.download_size = self.download_size.saturating_sub(other.download_size);
        self.draw_calls = self.draw_calls.saturating_sub(other.draw_calls);
        self.render_cost -= other.render_cost;
    }

    pub fn within(&self, budget: &SectorBudget) -> bool {
        if self.render_cost >= budget.maximum_render_cost {
            return false;
        }
        if let Some(max_bytes) = budget.download_size_bytes {
            if self.download_size >= max_bytes {
                return false;
            }
        }
        if let Some(max_draw_calls) = budget.maximum_draw_calls {
            if self.draw_calls >= max_draw_calls {
                return false;
            }
        }
        true
    }
}

/// Cost of holding `sector` at `level`. Levels without a payload cost nothing,
/// matching the ledger rule that such levels are never assigned.
pub fn sector_cost(sector: &SectorMetadata, level: LevelOfDetail) -> SectorCost {
    match level {
        LevelOfDetail::Discarded => SectorCost::default(),
        LevelOfDetail::Simple => match &sector.simple_payload {
            None => SectorCost::default(),
            Some(payload) => SectorCost {
                download_size: payload.download_size,
                draw_calls: 1,
                // Rough stand-in: simple geometry has no per-node estimate
                render_cost: (payload.download_size as f32 / 100.0).ceil(),
            },
        },
        LevelOfDetail::Detailed => match &sector.detailed_payload {
            None => SectorCost::default(),
            Some(payload) => SectorCost {
                download_size: payload.download_size,
                draw_calls: sector.estimated_draw_calls,
                render_cost: sector.estimated_render_cost,
            },
        },
    }
}

/// Point-in-time report of what one culling pass committed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SectorLoadingSpent {
    pub download_size: u64,
    pub draw_calls: usize,
    pub render_cost: f32,
    /// Non-discarded sectors committed this cycle.
    pub loaded_sector_count: usize,
    pub simple_sector_count: usize,
    pub detailed_sector_count: usize,
    /// Sectors forced to detailed by the proximity threshold.
    pub forced_detailed_sector_count: usize,
    /// Sectors across all loaded scenes.
    pub total_sector_count: usize,
    /// Sum of finite, positive commit priorities.
    pub accumulated_priority: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::test_support::sector;
    use glam::Vec3;

    #[test]
    fn cost_is_zero_without_payload() {
        let mut s = sector(1, None, Vec3::ZERO, Vec3::ONE);
        s.simple_payload = None;
        assert_eq!(sector_cost(&s, LevelOfDetail::Simple), SectorCost::default());
        assert_eq!(sector_cost(&s, LevelOfDetail::Discarded), SectorCost::default());
        assert!(sector_cost(&s, LevelOfDetail::Detailed).render_cost > 0.0);
    }

    #[test]
    fn unset_budget_dimensions_never_bind() {
        let budget = SectorBudget {
            maximum_render_cost: 100.0,
            download_size_bytes: None,
            maximum_draw_calls: None,
            high_detail_proximity_threshold: 0.0,
        };
        let cost = SectorCost {
            download_size: u64::MAX / 2,
            draw_calls: usize::MAX / 2,
            render_cost: 99.0,
        };
        assert!(cost.within(&budget));
        let over = SectorCost {
            render_cost: 100.0,
            ..cost
        };
        assert!(!over.within(&budget));
    }

    #[test]
    fn add_and_subtract_restore_totals() {
        let a = SectorCost {
            download_size: 10,
            draw_calls: 2,
            render_cost: 5.0,
        };
        let mut total = SectorCost::default();
        total.add(&a);
        total.add(&a);
        total.subtract(&a);
        assert_eq!(total, a);
    }
}
