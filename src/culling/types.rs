//! Shared culling data types

use serde::{Deserialize, Serialize};

use crate::camera::{CameraPose, Plane};
use crate::scene::{Aabb, LevelOfDetail, ModelId, SectorId, SectorModel};

use super::budget::{SectorBudget, SectorLoadingSpent};

/// A sector the culler wants at a specific level of detail. Recomputed from
/// scratch every cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct WantedSector {
    pub model: ModelId,
    pub sector: SectorId,
    pub level: LevelOfDetail,
    /// Model-space box the geometry should be clipped to, if any.
    pub clip_box: Option<Aabb>,
    /// Priority that caused the commit; `f32::INFINITY` for proximity-forced
    /// sectors, 0 for discarded sectors.
    pub priority: f32,
}

/// A caller-supplied region that boosts the priority of intersecting sectors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrioritizedArea {
    pub area: Aabb,
    pub extra_priority: f32,
}

/// Caller hints steering the load loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadingHints {
    /// When set, update cycles are fully suppressed.
    pub suspend_loading: bool,
}

/// Everything one culling pass consumes.
#[derive(Debug, Clone)]
pub struct DetermineSectorsInput {
    pub camera: CameraPose,
    pub camera_in_motion: bool,
    pub models: Vec<SectorModel>,
    pub budget: SectorBudget,
    pub clip_planes: Vec<Plane>,
    pub prioritized_areas: Vec<PrioritizedArea>,
    pub hints: LoadingHints,
}

/// Output of `SectorCuller::determine_sectors`.
#[derive(Debug, Clone)]
pub struct DeterminedSectors {
    /// All tracked sectors (including discards), descending priority.
    pub wanted: Vec<WantedSector>,
    pub spent: SectorLoadingSpent,
}
