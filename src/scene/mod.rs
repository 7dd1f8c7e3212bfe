//! Sector scene model
//!
//! Static, per-model spatial index: immutable sector metadata organized as a
//! bounding-volume tree, plus the version-tagged schema variant that drives
//! how the culling ledger commits levels of detail.

mod bounds;
mod scene;
mod sector;

#[cfg(test)]
pub(crate) mod test_support;

pub use bounds::Aabb;
pub use scene::{SceneVersion, SectorModel, SectorScene, SectorSceneBuilder};
pub use sector::{LevelOfDetail, ModelId, PayloadDescriptor, SectorId, SectorMetadata};
