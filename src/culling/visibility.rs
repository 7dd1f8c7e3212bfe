//! Visibility-feedback culler
//!
//! Ranks sectors by how much of the screen they would cover according to a
//! rendering-feedback collaborator, instead of the pure weight heuristics.
//! The collaborator renders sector bound proxies and reads coverage back; how
//! it does that is outside this crate, which only consumes the ranking.

use futures::future::BoxFuture;
use rustc_hash::FxHashSet;

use crate::camera::CameraPose;
use crate::error::EngineResult;
use crate::scene::{LevelOfDetail, ModelId, SectorId, SectorModel};

use super::taken::TakenSectorMap;
use super::types::{DeterminedSectors, DetermineSectorsInput, WantedSector};
use super::{add_high_detail_for_near_sectors, SectorCuller};

/// One entry of the collaborator's ranked visibility list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrioritizedSectorIdentifier {
    pub model: ModelId,
    pub sector: SectorId,
    /// Estimated screen coverage in [0, 1]; 0 means currently not visible.
    pub priority: f32,
}

/// Rendering-feedback collaborator: estimates per-sector screen coverage and
/// answers occlusion queries.
pub trait CoverageProvider: Send {
    fn set_models(&mut self, models: &[SectorModel]);

    fn set_clip_planes(&mut self, planes: &[crate::camera::Plane]);

    /// Ranked (model, sector, coverage) list, most visible first.
    fn order_sectors_by_visibility(&mut self, camera: &CameraPose) -> Vec<PrioritizedSectorIdentifier>;

    fn dispose(&mut self) {}
}

/// Culler driven by rendering feedback. Applies the same proximity-first and
/// greedy-budget commit loop as the weight-based culler, and additionally
/// drops occluded sectors from each batch right before the fetch.
pub struct ByVisibilityCoverageSectorCuller<C: CoverageProvider> {
    coverage: C,
}

impl<C: CoverageProvider> ByVisibilityCoverageSectorCuller<C> {
    pub fn new(coverage: C) -> Self {
        Self { coverage }
    }

    /// Keys of sectors the provider currently reports as visible.
    fn visible_set(&mut self, camera: &CameraPose) -> FxHashSet<(ModelId, SectorId)> {
        self.coverage
            .order_sectors_by_visibility(camera)
            .into_iter()
            .filter(|s| s.priority > 0.0)
            .map(|s| (s.model, s.sector))
            .collect()
    }
}

impl<C: CoverageProvider> SectorCuller for ByVisibilityCoverageSectorCuller<C> {
    fn determine_sectors(&mut self, input: &DetermineSectorsInput) -> EngineResult<DeterminedSectors> {
        let mut taken = TakenSectorMap::new();
        for model in &input.models {
            taken.initialize_scene(model)?;
        }

        self.coverage.set_models(&input.models);
        self.coverage.set_clip_planes(&input.clip_planes);
        let ranked = self.coverage.order_sectors_by_visibility(&input.camera);

        add_high_detail_for_near_sectors(&mut taken, input)?;

        let ranked_count = ranked.len();
        let mut committed = 0usize;
        for candidate in ranked {
            if !taken.is_within_budget(&input.budget) {
                break;
            }
            taken.mark_sector_detailed(candidate.model, candidate.sector, candidate.priority)?;
            committed += 1;
        }
        log::debug!(
            "[culling::by_visibility] committed {committed} of {ranked_count} ranked sectors \
             ({} taken)",
            taken.taken_sector_count()
        );

        Ok(DeterminedSectors {
            wanted: taken.collect_wanted_sectors(),
            spent: taken.compute_spent_budget(),
        })
    }

    /// Occlusion culling before fetch: re-queries the collaborator and keeps
    /// only sectors that are currently visible or contain the camera.
    /// Discard instructions always pass through.
    fn filter_sectors_to_load<'a>(
        &'a mut self,
        input: &'a DetermineSectorsInput,
        batch: Vec<WantedSector>,
    ) -> BoxFuture<'a, EngineResult<Vec<WantedSector>>> {
        Box::pin(async move {
            let visible = self.visible_set(&input.camera);
            let filtered = batch
                .into_iter()
                .filter(|wanted| {
                    if wanted.level == LevelOfDetail::Discarded {
                        return true;
                    }
                    if visible.contains(&(wanted.model, wanted.sector)) {
                        return true;
                    }
                    contains_camera(input, wanted)
                })
                .collect();
            Ok(filtered)
        })
    }

    fn dispose(&mut self) {
        self.coverage.dispose();
    }
}

fn contains_camera(input: &DetermineSectorsInput, wanted: &WantedSector) -> bool {
    let Some(model) = input.models.iter().find(|m| m.id == wanted.model) else {
        return false;
    };
    let Some(sector) = model.scene.sector(wanted.sector) else {
        return false;
    };
    sector
        .bounds
        .transformed(model.model_matrix)
        .contains_point(input.camera.position)
}
