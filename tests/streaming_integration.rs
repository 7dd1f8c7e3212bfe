//! End-to-end streaming test: a weight-based culler, the caching repository
//! with a scripted payload provider, and the update pipeline driving them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use glam::Vec3;
use rustc_hash::FxHashMap;
use tokio::time::timeout;

use sector_engine::{
    Aabb, ByWeightSectorCuller, CachedSectorRepository, CameraPose, ConsumedSector, EngineResult,
    LevelOfDetail, LoadingHints, ModelId, PayloadDescriptor, SectorId, SectorMetadata,
    SectorModel, SectorPayload, SectorPayloadProvider, SectorRepository, SectorScene,
    SectorSceneBuilder, UpdatePipeline,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn sector(id: u32, parent: Option<u32>, min_x: f32, max_x: f32) -> SectorMetadata {
    SectorMetadata {
        id: SectorId(id),
        parent: parent.map(SectorId),
        children: Vec::new(),
        depth: 0,
        bounds: Aabb::new(Vec3::new(min_x, 0.0, 0.0), Vec3::new(max_x, 10.0, 10.0)),
        estimated_draw_calls: 10,
        estimated_render_cost: 100.0,
        simple_payload: Some(PayloadDescriptor {
            file_name: format!("sector_{id}.f3d"),
            download_size: 1_000,
        }),
        detailed_payload: Some(PayloadDescriptor {
            file_name: format!("sector_{id}.i3d"),
            download_size: 10_000,
        }),
    }
}

/// Three-level binary tree spanning x in [0, 40].
fn scene() -> SectorScene {
    SectorSceneBuilder::new(8)
        .with_sector(sector(0, None, 0.0, 40.0))
        .with_sector(sector(1, Some(0), 0.0, 20.0))
        .with_sector(sector(2, Some(0), 20.0, 40.0))
        .with_sector(sector(3, Some(1), 0.0, 10.0))
        .with_sector(sector(4, Some(1), 10.0, 20.0))
        .with_sector(sector(5, Some(2), 20.0, 30.0))
        .with_sector(sector(6, Some(2), 30.0, 40.0))
        .build()
        .unwrap()
}

fn camera() -> CameraPose {
    CameraPose::look_at(
        Vec3::new(20.0, 5.0, 60.0),
        Vec3::new(20.0, 5.0, 0.0),
        Vec3::Y,
        std::f32::consts::FRAC_PI_2,
        1.0,
        0.1,
        500.0,
    )
}

/// Provider that fabricates payload bytes and counts fetches per file.
#[derive(Default)]
struct CountingProvider {
    fetches: AtomicUsize,
}

impl SectorPayloadProvider for CountingProvider {
    fn fetch(
        &self,
        _model: ModelId,
        descriptor: &PayloadDescriptor,
    ) -> BoxFuture<'_, EngineResult<SectorPayload>> {
        let descriptor = descriptor.clone();
        Box::pin(async move {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(SectorPayload {
                file_name: descriptor.file_name.clone(),
                bytes: vec![0; descriptor.download_size as usize],
            })
        })
    }
}

async fn drain_cycle(
    consumed: &mut tokio::sync::broadcast::Receiver<ConsumedSector>,
) -> Vec<ConsumedSector> {
    let mut delivered = Vec::new();
    while let Ok(Ok(sector)) = timeout(Duration::from_secs(2), consumed.recv()).await {
        delivered.push(sector);
    }
    delivered
}

#[tokio::test(start_paused = true)]
async fn stopping_the_camera_streams_the_visible_tree() {
    init_logging();
    let repository: Arc<dyn SectorRepository> =
        Arc::new(CachedSectorRepository::new(CountingProvider::default(), 64));
    let pipeline = UpdatePipeline::new(ByWeightSectorCuller::new(), Arc::clone(&repository));
    let mut consumed = pipeline.subscribe();

    let model = SectorModel::new(ModelId(1), Arc::new(scene()));
    pipeline.add_model(model).unwrap();
    pipeline.update_camera(camera(), false).unwrap();

    let delivered = drain_cycle(&mut consumed).await;
    assert!(!delivered.is_empty());

    // Every delivered level carries a payload exactly when it should.
    for sector in &delivered {
        assert_eq!(sector.model, ModelId(1));
        assert_eq!(sector.payload.is_some(), sector.level != LevelOfDetail::Discarded);
    }

    // Ancestor consistency: any detailed sector's parent is also detailed.
    let scene = scene();
    let levels: FxHashMap<SectorId, LevelOfDetail> =
        delivered.iter().map(|s| (s.sector, s.level)).collect();
    for (id, level) in &levels {
        if *level == LevelOfDetail::Detailed {
            if let Some(parent) = scene.sector(*id).unwrap().parent {
                assert_eq!(levels.get(&parent), Some(&LevelOfDetail::Detailed));
            }
        }
    }

    let spent = *pipeline.spent_budget().borrow();
    assert!(spent.loaded_sector_count > 0);
    assert_eq!(spent.total_sector_count, 7);

    pipeline.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn unchanged_camera_does_not_refetch() {
    init_logging();
    let repository: Arc<dyn SectorRepository> =
        Arc::new(CachedSectorRepository::new(CountingProvider::default(), 64));
    let pipeline = UpdatePipeline::new(ByWeightSectorCuller::new(), Arc::clone(&repository));
    let mut consumed = pipeline.subscribe();

    pipeline
        .add_model(SectorModel::new(ModelId(1), Arc::new(scene())))
        .unwrap();
    pipeline.update_camera(camera(), false).unwrap();
    let first = drain_cycle(&mut consumed).await;
    assert!(!first.is_empty());

    // Same pose again: the ledger already matches, nothing is delivered.
    pipeline.update_camera(camera(), false).unwrap();
    let second = drain_cycle(&mut consumed).await;
    assert!(second.is_empty());

    pipeline.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn suspending_hints_pauses_streaming() {
    init_logging();
    let repository: Arc<dyn SectorRepository> =
        Arc::new(CachedSectorRepository::new(CountingProvider::default(), 64));
    let pipeline = UpdatePipeline::new(ByWeightSectorCuller::new(), Arc::clone(&repository));
    let mut consumed = pipeline.subscribe();

    pipeline
        .update_loading_hints(LoadingHints { suspend_loading: true })
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    pipeline
        .add_model(SectorModel::new(ModelId(1), Arc::new(scene())))
        .unwrap();
    pipeline.update_camera(camera(), false).unwrap();
    assert!(timeout(Duration::from_secs(2), consumed.recv()).await.is_err());

    pipeline
        .update_loading_hints(LoadingHints { suspend_loading: false })
        .unwrap();
    let delivered = drain_cycle(&mut consumed).await;
    assert!(!delivered.is_empty());

    pipeline.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn removed_models_get_no_deliveries() {
    init_logging();
    let repository: Arc<dyn SectorRepository> =
        Arc::new(CachedSectorRepository::new(CountingProvider::default(), 64));
    let pipeline = UpdatePipeline::new(ByWeightSectorCuller::new(), Arc::clone(&repository));
    let mut consumed = pipeline.subscribe();

    pipeline
        .add_model(SectorModel::new(ModelId(1), Arc::new(scene())))
        .unwrap();
    pipeline.remove_model(ModelId(1)).unwrap();
    pipeline.update_camera(camera(), false).unwrap();

    assert!(timeout(Duration::from_secs(2), consumed.recv()).await.is_err());
    pipeline.dispose().await;
}
