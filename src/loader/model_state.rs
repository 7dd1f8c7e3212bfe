//! Per-model delivery ledger
//!
//! Remembers the last level of detail delivered for every (model, sector) so
//! a cycle only loads what actually changed. Discarded is the absence of an
//! entry, which makes delivering the same state twice a no-op.

use rustc_hash::FxHashMap;

use crate::scene::{LevelOfDetail, ModelId, SectorId};

#[derive(Debug, Default)]
pub struct ModelStateLedger {
    states: FxHashMap<ModelId, FxHashMap<SectorId, LevelOfDetail>>,
}

impl ModelStateLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when delivering `level` for this sector would change what the
    /// consumer holds. A sector without a record holds nothing, so a
    /// Discarded request for it is not a change.
    pub fn has_state_changed(&self, model: ModelId, sector: SectorId, level: LevelOfDetail) -> bool {
        match self.states.get(&model).and_then(|sectors| sectors.get(&sector)) {
            Some(current) => *current != level,
            None => level != LevelOfDetail::Discarded,
        }
    }

    pub fn update_state(&mut self, model: ModelId, sector: SectorId, level: LevelOfDetail) {
        if level == LevelOfDetail::Discarded {
            if let Some(sectors) = self.states.get_mut(&model) {
                sectors.remove(&sector);
                if sectors.is_empty() {
                    self.states.remove(&model);
                }
            }
        } else {
            self.states.entry(model).or_default().insert(sector, level);
        }
    }

    pub fn remove_model(&mut self, model: ModelId) {
        self.states.remove(&model);
    }
}
