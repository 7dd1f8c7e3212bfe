//! Sector loader
//!
//! Drives one load cycle: ask the culler what the camera wants, diff that
//! against what each model already has, and fetch the difference through the
//! repository in fixed-size batches. Results surface in completion order so
//! fast sectors never wait on slow siblings.

mod model_state;
mod sector_loader;

pub use model_state::ModelStateLedger;
pub use sector_loader::{SectorLoader, SECTOR_BATCH_SIZE};

use std::sync::Arc;

use serde::Serialize;

use crate::repository::SectorPayload;
use crate::scene::{LevelOfDetail, ModelId, SectorId};

/// A sector delivered to consumers at a resolved level of detail.
#[derive(Debug, Clone)]
pub struct ConsumedSector {
    pub model: ModelId,
    pub sector: SectorId,
    pub level: LevelOfDetail,
    /// `None` exactly when `level` is [`LevelOfDetail::Discarded`].
    pub payload: Option<Arc<SectorPayload>>,
}

impl ConsumedSector {
    /// A discard instruction: the consumer should unload this sector.
    pub fn discarded(model: ModelId, sector: SectorId) -> Self {
        Self {
            model,
            sector,
            level: LevelOfDetail::Discarded,
            payload: None,
        }
    }
}

/// Progress snapshot of the current (or last finished) load cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadingState {
    pub is_loading: bool,
    pub items_loaded: usize,
    pub items_requested: usize,
    /// Sectors the culler rejected after the initial request was made.
    pub items_culled: usize,
}
