//! Sector culling
//!
//! Decides which sectors to request at which level of detail under a budget.
//! Two pluggable strategies share the same machinery: a fresh taken-sector
//! ledger per pass, proximity-forced commits, and a greedy priority walk that
//! stops once the budget is exhausted.
//!
//! - [`ByWeightSectorCuller`] scores candidates with pure weight functions.
//! - [`ByVisibilityCoverageSectorCuller`] ranks candidates with rendering
//!   feedback from a [`CoverageProvider`] and can drop occluded sectors right
//!   before they are fetched.

mod budget;
mod heuristic;
mod taken;
mod types;
mod visibility;
pub mod weights;

pub use budget::{sector_cost, SectorBudget, SectorCost, SectorLoadingSpent};
pub use heuristic::ByWeightSectorCuller;
pub use taken::{TakenSectorMap, TakenSectorTree};
pub use types::{DeterminedSectors, DetermineSectorsInput, LoadingHints, PrioritizedArea, WantedSector};
pub use visibility::{ByVisibilityCoverageSectorCuller, CoverageProvider, PrioritizedSectorIdentifier};

use futures::future::BoxFuture;

use crate::camera::accepted_by_clip_planes;
use crate::error::EngineResult;

/// Strategy interface for deciding wanted sectors.
pub trait SectorCuller: Send {
    /// Determines the full wanted-sector set for this cycle together with the
    /// spend report. Resets any per-pass state. Fails synchronously on
    /// unsupported scene versions.
    fn determine_sectors(&mut self, input: &DetermineSectorsInput) -> EngineResult<DeterminedSectors>;

    /// Second-chance filter applied per batch right before fetching; may
    /// shrink the batch (dropped sectors count as culled, not failed). Reads
    /// but does not mutate the committed state of the last
    /// `determine_sectors` call.
    fn filter_sectors_to_load<'a>(
        &'a mut self,
        input: &'a DetermineSectorsInput,
        batch: Vec<WantedSector>,
    ) -> BoxFuture<'a, EngineResult<Vec<WantedSector>>>;

    /// Releases collaborator resources.
    fn dispose(&mut self) {}
}

/// Commits every sector within the budget's proximity threshold at infinite
/// priority, so geometry right next to the camera is never traded away.
/// Clip planes still apply: a fully clipped sector is not forced.
fn add_high_detail_for_near_sectors(
    taken: &mut TakenSectorMap,
    input: &DetermineSectorsInput,
) -> EngineResult<()> {
    let near_camera = input
        .camera
        .with_far(input.budget.high_detail_proximity_threshold);

    for model in &input.models {
        let view_projection = near_camera.view_projection() * model.model_matrix;
        for sector in model.scene.sectors_intersecting_frustum(view_projection) {
            let world_bounds = sector.bounds.transformed(model.model_matrix);
            if !accepted_by_clip_planes(&world_bounds, &input.clip_planes) {
                continue;
            }
            taken.mark_sector_detailed(model.id, sector.id, f32::INFINITY)?;
        }
    }
    Ok(())
}
