pub mod camera;
pub mod culling;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod repository;
pub mod scene;

pub use camera::{CameraPose, Frustum, Plane};
pub use culling::{
    ByVisibilityCoverageSectorCuller, ByWeightSectorCuller, CoverageProvider,
    DetermineSectorsInput, DeterminedSectors, LoadingHints, PrioritizedArea,
    PrioritizedSectorIdentifier, SectorBudget, SectorCuller, SectorLoadingSpent, WantedSector,
};
pub use error::{EngineError, EngineResult};
pub use loader::{ConsumedSector, LoadingState, SectorLoader};
pub use pipeline::UpdatePipeline;
pub use repository::{CachedSectorRepository, SectorPayload, SectorPayloadProvider, SectorRepository};
pub use scene::{
    Aabb, LevelOfDetail, ModelId, PayloadDescriptor, SceneVersion, SectorId, SectorMetadata,
    SectorModel, SectorScene, SectorSceneBuilder,
};
