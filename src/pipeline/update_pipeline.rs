//! Pipeline driver

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::camera::{CameraPose, Plane};
use crate::culling::{
    DetermineSectorsInput, LoadingHints, PrioritizedArea, SectorBudget, SectorCuller,
    SectorLoadingSpent,
};
use crate::error::{EngineError, EngineResult};
use crate::loader::{ConsumedSector, LoadingState, SectorLoader, SECTOR_BATCH_SIZE};
use crate::repository::SectorRepository;
use crate::scene::{ModelId, SectorModel};

use super::coalescer::{CameraInput, ChannelCoalescer};

/// Fan-out capacity for consumed sectors. A consumer further behind than
/// this loses the oldest deliveries (tokio broadcast lag semantics).
const CONSUMED_CHANNEL_CAPACITY: usize = 256;

enum PipelineEvent {
    Camera(CameraInput),
    Budget(SectorBudget),
    ClipPlanes(Vec<Plane>),
    PrioritizedAreas(Vec<PrioritizedArea>),
    Hints(LoadingHints),
    ModelAdded,
    ModelRemoved(ModelId),
    Dispose,
}

/// Model registry shared between the handle (synchronous add/remove
/// validation) and the task (cycle input, late-result filtering).
struct PipelineShared {
    models: Mutex<FxHashMap<ModelId, SectorModel>>,
}

/// Handle to a running streaming pipeline.
///
/// Input updates are coalesced and folded into load cycles by a background
/// task; cycles are serialized, so a new camera position never runs culling
/// concurrently with the previous cycle's fetches. Results fan out on a
/// broadcast channel; progress and the latest spend report are observable
/// through `watch` channels.
pub struct UpdatePipeline {
    events: mpsc::UnboundedSender<PipelineEvent>,
    shared: Arc<PipelineShared>,
    repository: Arc<dyn SectorRepository>,
    consumed: broadcast::Sender<ConsumedSector>,
    progress: watch::Receiver<LoadingState>,
    spent: watch::Receiver<SectorLoadingSpent>,
    task: Option<JoinHandle<()>>,
}

impl UpdatePipeline {
    /// Spawns the pipeline task on the current tokio runtime.
    pub fn new<C>(culler: C, repository: Arc<dyn SectorRepository>) -> Self
    where
        C: SectorCuller + Send + 'static,
    {
        let loader = SectorLoader::new(culler, Arc::clone(&repository));
        let progress = loader.progress();
        let spent = loader.spent_budget();
        let shared = Arc::new(PipelineShared {
            models: Mutex::new(FxHashMap::default()),
        });
        let (consumed, _) = broadcast::channel(CONSUMED_CHANNEL_CAPACITY);
        let (events, event_rx) = mpsc::unbounded_channel();

        let task = PipelineTask {
            loader,
            repository: Arc::clone(&repository),
            shared: Arc::clone(&shared),
            consumed: consumed.clone(),
            coalescer: ChannelCoalescer::new(),
            camera: None,
            budget: SectorBudget::default(),
            clip_planes: Vec::new(),
            prioritized_areas: Vec::new(),
            hints: LoadingHints::default(),
            dirty: false,
        };
        let task = tokio::spawn(task.run(event_rx));

        Self {
            events,
            shared,
            repository,
            consumed,
            progress,
            spent,
            task: Some(task),
        }
    }

    /// Registers a model for streaming. All loaded models must share one
    /// version scheme; duplicates and unsupported versions are rejected.
    pub fn add_model(&self, model: SectorModel) -> EngineResult<()> {
        let version = model.version()?;
        let mut models = self.shared.models.lock();
        if models.contains_key(&model.id) {
            return Err(EngineError::ModelAlreadyAdded { model: model.id });
        }
        if let Some(existing) = models.values().next() {
            let loaded = existing.version()?;
            if loaded != version {
                return Err(EngineError::IncompatibleModel {
                    model: model.id,
                    reason: format!("version scheme {version:?} does not match loaded {loaded:?}"),
                });
            }
        }
        log::debug!("[pipeline::add_model] adding {} ({version:?})", model.id);
        self.repository.register_model(model.id, Arc::clone(&model.scene));
        models.insert(model.id, model);
        drop(models);
        self.send(PipelineEvent::ModelAdded)
    }

    /// Unregisters a model. In-flight results for it are dropped instead of
    /// delivered.
    pub fn remove_model(&self, model: ModelId) -> EngineResult<()> {
        if self.shared.models.lock().remove(&model).is_none() {
            return Err(EngineError::ModelNotFound { model });
        }
        log::debug!("[pipeline::remove_model] removing {model}");
        self.repository.unregister_model(model);
        self.send(PipelineEvent::ModelRemoved(model))
    }

    pub fn update_camera(&self, pose: CameraPose, in_motion: bool) -> EngineResult<()> {
        self.send(PipelineEvent::Camera(CameraInput { pose, in_motion }))
    }

    pub fn update_budget(&self, budget: SectorBudget) -> EngineResult<()> {
        self.send(PipelineEvent::Budget(budget))
    }

    pub fn update_clip_planes(&self, planes: Vec<Plane>) -> EngineResult<()> {
        self.send(PipelineEvent::ClipPlanes(planes))
    }

    pub fn update_prioritized_areas(&self, areas: Vec<PrioritizedArea>) -> EngineResult<()> {
        self.send(PipelineEvent::PrioritizedAreas(areas))
    }

    pub fn update_loading_hints(&self, hints: LoadingHints) -> EngineResult<()> {
        self.send(PipelineEvent::Hints(hints))
    }

    /// Subscribes to delivered sectors. Every subscriber sees every delivery;
    /// the underlying culling and fetching happen once.
    pub fn subscribe(&self) -> broadcast::Receiver<ConsumedSector> {
        self.consumed.subscribe()
    }

    pub fn loading_state(&self) -> watch::Receiver<LoadingState> {
        self.progress.clone()
    }

    pub fn spent_budget(&self) -> watch::Receiver<SectorLoadingSpent> {
        self.spent.clone()
    }

    /// Shuts the pipeline down and waits for the task to finish its current
    /// cycle.
    pub async fn dispose(mut self) {
        let _ = self.events.send(PipelineEvent::Dispose);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    fn send(&self, event: PipelineEvent) -> EngineResult<()> {
        self.events.send(event).map_err(|_| EngineError::PipelineClosed)
    }
}

struct PipelineTask<C> {
    loader: SectorLoader<C>,
    repository: Arc<dyn SectorRepository>,
    shared: Arc<PipelineShared>,
    consumed: broadcast::Sender<ConsumedSector>,
    coalescer: ChannelCoalescer,
    camera: Option<CameraInput>,
    budget: SectorBudget,
    clip_planes: Vec<Plane>,
    prioritized_areas: Vec<PrioritizedArea>,
    hints: LoadingHints,
    dirty: bool,
}

impl<C: SectorCuller> PipelineTask<C> {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<PipelineEvent>) {
        loop {
            let deadline = self.coalescer.next_deadline();
            let event = tokio::select! {
                event = events.recv() => match event {
                    None | Some(PipelineEvent::Dispose) => break,
                    Some(event) => Some(event),
                },
                _ = sleep_until_deadline(deadline) => None,
            };

            let now = Instant::now();
            match event {
                Some(PipelineEvent::Camera(camera)) => self.coalescer.push_camera(camera, now),
                Some(PipelineEvent::Budget(budget)) => self.coalescer.push_budget(budget, now),
                Some(PipelineEvent::ClipPlanes(planes)) => {
                    self.coalescer.push_clip_planes(planes, now)
                }
                Some(PipelineEvent::PrioritizedAreas(areas)) => {
                    self.coalescer.push_prioritized_areas(areas, now)
                }
                Some(PipelineEvent::Hints(hints)) => self.coalescer.push_hints(hints, now),
                Some(PipelineEvent::ModelAdded) => {
                    self.resize_cache();
                    self.dirty = true;
                }
                Some(PipelineEvent::ModelRemoved(model)) => {
                    self.loader.remove_model(model);
                    self.resize_cache();
                    self.dirty = true;
                }
                Some(PipelineEvent::Dispose) | None => {}
            }

            self.apply_ready(now);
            if self.dirty {
                self.run_cycle().await;
            }
        }
        log::debug!("[pipeline::run] shutting down");
        self.loader.dispose();
    }

    fn apply_ready(&mut self, now: Instant) {
        let ready = self.coalescer.take_ready(now);
        if ready.is_empty() {
            return;
        }
        if let Some(settings) = ready.settings {
            if let Some(budget) = settings.budget {
                self.budget = budget;
                self.resize_cache();
            }
            if let Some(hints) = settings.hints {
                self.hints = hints;
            }
        }
        if let Some(filters) = ready.filters {
            if let Some(planes) = filters.clip_planes {
                self.clip_planes = planes;
            }
            if let Some(areas) = filters.prioritized_areas {
                self.prioritized_areas = areas;
            }
        }
        if let Some(camera) = ready.camera {
            self.camera = Some(camera);
        }
        self.dirty = true;
    }

    fn resize_cache(&self) {
        let model_count = self.shared.models.lock().len();
        self.repository.set_cache_size(self.budget.derived_cache_size(model_count));
    }

    /// Runs one load cycle inline, which serializes cycles: events arriving
    /// meanwhile queue up and coalesce afterwards.
    async fn run_cycle(&mut self) {
        let Some(camera) = self.camera.clone() else {
            return;
        };
        if self.hints.suspend_loading {
            return;
        }
        let models: Vec<SectorModel> = self.shared.models.lock().values().cloned().collect();
        if models.is_empty() {
            return;
        }
        self.dirty = false;

        let input = DetermineSectorsInput {
            camera: camera.pose,
            camera_in_motion: camera.in_motion,
            models,
            budget: self.budget,
            clip_planes: self.clip_planes.clone(),
            prioritized_areas: self.prioritized_areas.clone(),
            hints: self.hints,
        };
        let (tx, mut rx) = mpsc::channel::<ConsumedSector>(SECTOR_BATCH_SIZE);

        let loader = &mut self.loader;
        let shared = &self.shared;
        let consumed_tx = &self.consumed;
        let forward = async move {
            while let Some(consumed) = rx.recv().await {
                if !shared.models.lock().contains_key(&consumed.model) {
                    continue;
                }
                let _ = consumed_tx.send(consumed);
            }
        };
        let (result, ()) = tokio::join!(loader.load_sectors(&input, tx), forward);
        if let Err(error) = result {
            log::error!("[pipeline::run] load cycle failed: {error}");
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
