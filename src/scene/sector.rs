//! Sector metadata - the immutable nodes of a model's spatial tree

use serde::{Deserialize, Serialize};

use super::bounds::Aabb;

/// Identifier of a sector within one model's scene tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SectorId(pub u32);

impl std::fmt::Display for SectorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a loaded model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModelId(pub u64);

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "model-{}", self.0)
    }
}

/// Level of detail a sector can be requested at.
///
/// The ordering matters: `Discarded < Simple < Detailed` is relied on by the
/// taken-sector ledger when upgrading levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LevelOfDetail {
    Discarded,
    Simple,
    Detailed,
}

/// Describes the downloadable payload backing one level of detail of a sector.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadDescriptor {
    pub file_name: String,
    pub download_size: u64,
}

/// Immutable sector tree node. Created once when model metadata is parsed
/// (out of scope here) and read-only afterwards.
#[derive(Debug, Clone)]
pub struct SectorMetadata {
    pub id: SectorId,
    pub parent: Option<SectorId>,
    pub children: Vec<SectorId>,
    /// Path depth from the root (root is 0).
    pub depth: u32,
    /// Bounds in model space.
    pub bounds: Aabb,
    pub estimated_draw_calls: usize,
    pub estimated_render_cost: f32,
    /// Coarse-geometry payload ("faces file"). Absent for sectors that have no
    /// simple representation; such sectors can never be assigned `Simple`.
    pub simple_payload: Option<PayloadDescriptor>,
    /// Full-geometry payload ("index file").
    pub detailed_payload: Option<PayloadDescriptor>,
}

impl SectorMetadata {
    pub fn has_payload(&self, level: LevelOfDetail) -> bool {
        self.payload(level).is_some()
    }

    pub fn payload(&self, level: LevelOfDetail) -> Option<&PayloadDescriptor> {
        match level {
            LevelOfDetail::Discarded => None,
            LevelOfDetail::Simple => self.simple_payload.as_ref(),
            LevelOfDetail::Detailed => self.detailed_payload.as_ref(),
        }
    }
}
