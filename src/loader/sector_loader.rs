//! Load cycle driver

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, watch};

use crate::culling::{DetermineSectorsInput, SectorCuller, SectorLoadingSpent, WantedSector};
use crate::error::EngineResult;
use crate::repository::SectorRepository;
use crate::scene::ModelId;

use super::{ConsumedSector, LoadingState, ModelStateLedger};

/// Changed sectors are re-filtered and fetched in fixed batches of this many.
pub const SECTOR_BATCH_SIZE: usize = 20;

/// Runs culling and fetching for one camera/model configuration at a time.
///
/// Owns the culler and the delivery ledger; the repository is shared with the
/// pipeline so cache capacity can be adjusted from outside a cycle.
pub struct SectorLoader<C> {
    culler: C,
    repository: Arc<dyn SectorRepository>,
    states: ModelStateLedger,
    progress: watch::Sender<LoadingState>,
    spent: watch::Sender<SectorLoadingSpent>,
}

impl<C: SectorCuller> SectorLoader<C> {
    pub fn new(culler: C, repository: Arc<dyn SectorRepository>) -> Self {
        Self {
            culler,
            repository,
            states: ModelStateLedger::new(),
            progress: watch::Sender::new(LoadingState::default()),
            spent: watch::Sender::new(SectorLoadingSpent::default()),
        }
    }

    pub fn progress(&self) -> watch::Receiver<LoadingState> {
        self.progress.subscribe()
    }

    pub fn spent_budget(&self) -> watch::Receiver<SectorLoadingSpent> {
        self.spent.subscribe()
    }

    /// Forgets everything delivered for `model`, so a re-added model is
    /// streamed from scratch.
    pub fn remove_model(&mut self, model: ModelId) {
        self.states.remove_model(model);
    }

    pub fn dispose(&mut self) {
        self.culler.dispose();
    }

    /// Runs one load cycle, pushing results into `output` as fetches settle.
    ///
    /// The channel is bounded, so a slow consumer backpressures the cycle
    /// instead of piling up payloads. Dropping the receiver ends the cycle
    /// early without touching the ledger for undelivered sectors.
    pub async fn load_sectors(
        &mut self,
        input: &DetermineSectorsInput,
        output: mpsc::Sender<ConsumedSector>,
    ) -> EngineResult<()> {
        if input.camera_in_motion {
            log::debug!("[loader::load_sectors] camera in motion, cycle skipped");
            return Ok(());
        }

        let determined = self.culler.determine_sectors(input)?;
        self.spent.send_replace(determined.spent);

        let changed: Vec<WantedSector> = determined
            .wanted
            .into_iter()
            .filter(|wanted| self.states.has_state_changed(wanted.model, wanted.sector, wanted.level))
            .collect();
        log::debug!(
            "[loader::load_sectors] {} of {} wanted sectors changed state",
            changed.len(),
            determined.spent.total_sector_count
        );

        let mut progress = LoadingState {
            is_loading: !changed.is_empty(),
            items_loaded: 0,
            items_requested: changed.len(),
            items_culled: 0,
        };
        self.progress.send_replace(progress);

        // Priority order is preserved: `wanted` arrives sorted descending,
        // so earlier batches hold the more important sectors.
        for chunk in changed.chunks(SECTOR_BATCH_SIZE) {
            let kept = self.culler.filter_sectors_to_load(input, chunk.to_vec()).await?;
            if kept.len() < chunk.len() {
                progress.items_culled += chunk.len() - kept.len();
                self.progress.send_replace(progress);
            }

            let mut in_flight: FuturesUnordered<_> = kept
                .into_iter()
                .map(|wanted| {
                    let repository = Arc::clone(&self.repository);
                    async move {
                        match repository.load_sector(&wanted).await {
                            Ok(consumed) => consumed,
                            Err(error) => {
                                log::error!(
                                    "[loader::load_sectors] loading sector {} of {} failed: {error}",
                                    wanted.sector,
                                    wanted.model
                                );
                                ConsumedSector::discarded(wanted.model, wanted.sector)
                            }
                        }
                    }
                })
                .collect();

            while let Some(consumed) = in_flight.next().await {
                let (model, sector, level) = (consumed.model, consumed.sector, consumed.level);
                if output.send(consumed).await.is_err() {
                    log::debug!("[loader::load_sectors] consumer gone, ending cycle");
                    return Ok(());
                }
                self.states.update_state(model, sector, level);
                progress.items_loaded += 1;
                self.progress.send_replace(progress);
            }
        }

        progress.is_loading = false;
        self.progress.send_replace(progress);
        Ok(())
    }
}
