//! Crate-wide error handling
//!
//! Transient per-sector failures (a fetch that fails) are recovered inside the
//! loader and never surface through this type to end users. Configuration
//! errors (unsupported scene version, incompatible or duplicate models) are
//! fatal for the affected model and propagate to the caller.

use crate::scene::{LevelOfDetail, ModelId, SectorId};

/// Result alias used throughout the engine
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine-wide errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unsupported scene version {version}")]
    UnsupportedSceneVersion { version: u32 },

    #[error("model {model} is incompatible: {reason}")]
    IncompatibleModel { model: ModelId, reason: String },

    #[error("sector {sector} not found in model {model}")]
    MissingSector { model: ModelId, sector: SectorId },

    #[error("sector {sector} of model {model} has no payload at level {level:?}")]
    MissingPayload {
        model: ModelId,
        sector: SectorId,
        level: LevelOfDetail,
    },

    #[error("fetching sector {sector} of model {model} failed: {source}")]
    SectorFetchFailed {
        model: ModelId,
        sector: SectorId,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("scene build failed: {reason}")]
    SceneBuild { reason: String },

    #[error("model {model} already added")]
    ModelAlreadyAdded { model: ModelId },

    #[error("model {model} was never added")]
    ModelNotFound { model: ModelId },

    #[error("update pipeline is shut down")]
    PipelineClosed,
}
