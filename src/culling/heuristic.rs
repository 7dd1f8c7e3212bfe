//! Weight-based heuristic culler

use futures::future::BoxFuture;

use crate::error::EngineResult;
use crate::scene::ModelId;
use crate::scene::SectorId;

use super::taken::TakenSectorMap;
use super::types::{DeterminedSectors, DetermineSectorsInput, WantedSector};
use super::weights::{
    frustum_depth_weight, node_screen_size_weight, prioritized_area_weight, screen_area_weight,
    tree_placement_weight, DistanceRange,
};
use super::{add_high_detail_for_near_sectors, SectorCuller};

/// Relative importance of each weight in the combined score. The result is
/// only used for ordering.
#[derive(Debug, Clone, Copy)]
pub struct WeightCoefficients {
    pub distance: f32,
    pub screen_area: f32,
    pub frustum_depth: f32,
    pub tree_placement: f32,
    pub node_screen_size: f32,
}

impl Default for WeightCoefficients {
    fn default() -> Self {
        Self {
            distance: 0.2,
            screen_area: 0.3,
            frustum_depth: 0.2,
            tree_placement: 0.1,
            node_screen_size: 0.2,
        }
    }
}

struct ScoredSector {
    model: ModelId,
    sector: SectorId,
    priority: f32,
}

/// Culler that scores frustum candidates with the pure weight functions and
/// greedily commits them front-to-priority until the budget is exhausted.
/// The per-batch filter is a pass-through.
#[derive(Debug, Default)]
pub struct ByWeightSectorCuller {
    coefficients: WeightCoefficients,
}

impl ByWeightSectorCuller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_coefficients(coefficients: WeightCoefficients) -> Self {
        Self { coefficients }
    }

    fn score_candidates(&self, input: &DetermineSectorsInput) -> Vec<ScoredSector> {
        let camera = &input.camera;
        let view_projection = camera.view_projection();

        // First pass: gather candidates and their camera distances so the
        // distance weight can be normalized against this cycle's range.
        let mut candidates = Vec::new();
        let mut distances = DistanceRange::new();
        for model in &input.models {
            let model_view_projection = view_projection * model.model_matrix;
            for sector in model.scene.sectors_intersecting_frustum(model_view_projection) {
                let world_bounds = sector.bounds.transformed(model.model_matrix);
                if !crate::camera::accepted_by_clip_planes(&world_bounds, &input.clip_planes) {
                    continue;
                }
                let distance = world_bounds.distance_to_point(camera.position);
                distances.observe(distance);
                candidates.push((model.id, sector.id, sector.depth, world_bounds, distance));
            }
        }

        let c = &self.coefficients;
        let mut scored: Vec<ScoredSector> = candidates
            .into_iter()
            .map(|(model, sector, depth, bounds, distance)| {
                let priority = c.distance * distances.weight(distance)
                    + c.screen_area * screen_area_weight(&bounds, camera)
                    + c.frustum_depth * frustum_depth_weight(&bounds, camera)
                    + c.tree_placement * tree_placement_weight(depth)
                    + c.node_screen_size * node_screen_size_weight(&bounds, camera)
                    + prioritized_area_weight(&bounds, &input.prioritized_areas);
                ScoredSector {
                    model,
                    sector,
                    priority,
                }
            })
            .collect();
        scored.sort_by(|l, r| r.priority.total_cmp(&l.priority));
        scored
    }
}

impl SectorCuller for ByWeightSectorCuller {
    fn determine_sectors(&mut self, input: &DetermineSectorsInput) -> EngineResult<DeterminedSectors> {
        let mut taken = TakenSectorMap::new();
        for model in &input.models {
            taken.initialize_scene(model)?;
        }

        add_high_detail_for_near_sectors(&mut taken, input)?;

        let scored = self.score_candidates(input);
        let candidate_count = scored.len();
        let mut committed = 0usize;
        for candidate in scored {
            if !taken.is_within_budget(&input.budget) {
                break;
            }
            taken.mark_sector_detailed(candidate.model, candidate.sector, candidate.priority)?;
            committed += 1;
        }

        let spent = taken.compute_spent_budget();
        log::debug!(
            "[culling::by_weight] committed {committed} of {candidate_count} candidates \
             ({} sectors taken, render cost {:.0}/{:.0})",
            taken.taken_sector_count(),
            spent.render_cost,
            input.budget.maximum_render_cost
        );

        Ok(DeterminedSectors {
            wanted: taken.collect_wanted_sectors(),
            spent,
        })
    }

    fn filter_sectors_to_load<'a>(
        &'a mut self,
        _input: &'a DetermineSectorsInput,
        batch: Vec<WantedSector>,
    ) -> BoxFuture<'a, EngineResult<Vec<WantedSector>>> {
        Box::pin(async move { Ok(batch) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraPose;
    use crate::culling::{SectorBudget, SectorCost};
    use crate::scene::test_support::binary_scene;
    use crate::scene::{LevelOfDetail, SectorModel};
    use glam::Vec3;
    use std::sync::Arc;

    fn culling_input(models: Vec<SectorModel>, budget: SectorBudget) -> DetermineSectorsInput {
        // Test scenes span x in [0, 80] at most; a wide frustum from z=100
        // keeps every sector of every fixture inside view.
        let camera = CameraPose::look_at(
            Vec3::new(40.0, 5.0, 100.0),
            Vec3::new(40.0, 5.0, 0.0),
            Vec3::Y,
            std::f32::consts::FRAC_PI_2,
            1.0,
            0.1,
            500.0,
        );
        DetermineSectorsInput {
            camera,
            camera_in_motion: false,
            models,
            budget,
            clip_planes: Vec::new(),
            prioritized_areas: Vec::new(),
            hints: Default::default(),
        }
    }

    #[test]
    fn half_budget_commits_roughly_half_the_tree() {
        // 4-level binary tree: 8 leaves, 15 sectors.
        let model = SectorModel::new(crate::scene::ModelId(1), Arc::new(binary_scene(4, 8)));
        let mut total = SectorCost::default();
        for sector in model.scene.iter() {
            total.add(&sector_cost_detailed(sector));
        }
        let budget = SectorBudget {
            maximum_render_cost: total.render_cost / 2.0,
            download_size_bytes: None,
            maximum_draw_calls: None,
            high_detail_proximity_threshold: 0.5,
        };

        let mut culler = ByWeightSectorCuller::new();
        let determined = culler.determine_sectors(&culling_input(vec![model.clone()], budget)).unwrap();

        assert!(determined.spent.render_cost >= budget.maximum_render_cost);
        assert!(determined.spent.render_cost < total.render_cost);
        let non_discarded = determined
            .wanted
            .iter()
            .filter(|w| w.level != LevelOfDetail::Discarded)
            .count();
        assert!(non_discarded < model.scene.sector_count());
        assert!(non_discarded > 0);
    }

    fn sector_cost_detailed(sector: &crate::scene::SectorMetadata) -> SectorCost {
        crate::culling::sector_cost(sector, LevelOfDetail::Detailed)
    }

    #[test]
    fn proximity_forces_nearby_sectors_past_budget() {
        let model = SectorModel::new(crate::scene::ModelId(1), Arc::new(binary_scene(3, 8)));
        // Zero budget, but the camera sits inside the scene with a generous
        // proximity threshold.
        let budget = SectorBudget {
            maximum_render_cost: 0.0,
            download_size_bytes: None,
            maximum_draw_calls: None,
            high_detail_proximity_threshold: 15.0,
        };
        let mut input = culling_input(vec![model], budget);
        input.camera = CameraPose::look_at(
            Vec3::new(5.0, 5.0, 5.0),
            Vec3::new(20.0, 5.0, 5.0),
            Vec3::Y,
            std::f32::consts::FRAC_PI_3,
            1.0,
            0.1,
            500.0,
        );

        let mut culler = ByWeightSectorCuller::new();
        let determined = culler.determine_sectors(&input).unwrap();
        assert!(determined.spent.forced_detailed_sector_count > 0);
        assert!(determined.spent.render_cost > 0.0);
    }

    #[test]
    fn wanted_list_covers_every_sector_once() {
        let model = SectorModel::new(crate::scene::ModelId(1), Arc::new(binary_scene(3, 8)));
        let sector_count = model.scene.sector_count();
        let mut culler = ByWeightSectorCuller::new();
        let determined = culler
            .determine_sectors(&culling_input(vec![model], SectorBudget::default()))
            .unwrap();
        assert_eq!(determined.wanted.len(), sector_count);
    }

    #[test]
    fn prioritized_area_boosts_intersecting_sectors() {
        let model = SectorModel::new(crate::scene::ModelId(1), Arc::new(binary_scene(4, 8)));
        let mut input = culling_input(
            vec![model],
            SectorBudget {
                maximum_render_cost: 1.0,
                download_size_bytes: None,
                maximum_draw_calls: None,
                high_detail_proximity_threshold: 0.1,
            },
        );
        // Boost the right half of the scene massively
        input.prioritized_areas.push(crate::culling::PrioritizedArea {
            area: crate::scene::Aabb::new(Vec3::new(75.0, 0.0, 0.0), Vec3::new(80.0, 10.0, 10.0)),
            extra_priority: 1_000.0,
        });

        let mut culler = ByWeightSectorCuller::new();
        let determined = culler.determine_sectors(&input).unwrap();
        let top = &determined.wanted[0];
        let bounds = input.models[0].scene.sector(top.sector).unwrap().bounds;
        assert!(bounds.max.x > 70.0, "top sector {:?} is not in the boosted area", top.sector);
    }

    #[tokio::test]
    async fn filter_is_a_pass_through() {
        let model = SectorModel::new(crate::scene::ModelId(1), Arc::new(binary_scene(2, 8)));
        let input = culling_input(vec![model], SectorBudget::default());
        let mut culler = ByWeightSectorCuller::new();
        let batch = vec![WantedSector {
            model: crate::scene::ModelId(1),
            sector: crate::scene::SectorId(0),
            level: LevelOfDetail::Detailed,
            clip_box: None,
            priority: 1.0,
        }];
        let filtered = culler.filter_sectors_to_load(&input, batch.clone()).await.unwrap();
        assert_eq!(filtered, batch);
    }
}
