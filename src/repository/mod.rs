//! Sector repository
//!
//! The fetch boundary of the engine. The loader talks to a
//! [`SectorRepository`]; the provided implementation caches payloads by
//! (model, sector, level) in front of a [`SectorPayloadProvider`] that does
//! the actual download/parse (file formats and transport are out of scope).

mod cache;

pub use cache::MemoryRequestCache;

use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::culling::WantedSector;
use crate::error::{EngineError, EngineResult};
use crate::loader::ConsumedSector;
use crate::scene::{LevelOfDetail, ModelId, PayloadDescriptor, SectorId, SectorScene};

/// Opaque loaded sector payload. The engine never looks inside; it only moves
/// the bytes from the provider to the consumer.
#[derive(Debug)]
pub struct SectorPayload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Downloads and parses one payload. Implementations live at the application
/// boundary (network, disk, test fixtures).
pub trait SectorPayloadProvider: Send + Sync {
    fn fetch(&self, model: ModelId, descriptor: &PayloadDescriptor) -> BoxFuture<'_, EngineResult<SectorPayload>>;
}

/// Repository boundary consumed by the loader.
pub trait SectorRepository: Send + Sync {
    fn load_sector(&self, wanted: &WantedSector) -> BoxFuture<'_, EngineResult<ConsumedSector>>;

    /// Makes a model's scene known so wanted sectors can be resolved to
    /// payload descriptors. Unused by repositories that resolve payloads
    /// some other way.
    fn register_model(&self, model: ModelId, scene: Arc<SectorScene>) {
        let _ = (model, scene);
    }

    fn unregister_model(&self, model: ModelId) {
        let _ = model;
    }

    fn set_cache_size(&self, sector_count: usize);

    fn clear_cache(&self);
}

/// How often a failed fetch is attempted before the failure is reported.
const FETCH_ATTEMPTS: u32 = 3;

type CacheKey = (ModelId, SectorId, LevelOfDetail);

/// Content-addressed, reference-counted payload cache in front of a provider.
pub struct CachedSectorRepository<P> {
    provider: P,
    cache: Mutex<MemoryRequestCache<CacheKey, SectorPayload>>,
    scenes: RwLock<FxHashMap<ModelId, Arc<SectorScene>>>,
}

impl<P: SectorPayloadProvider> CachedSectorRepository<P> {
    pub fn new(provider: P, cache_size: usize) -> Self {
        Self {
            provider,
            cache: Mutex::new(MemoryRequestCache::new(cache_size)),
            scenes: RwLock::new(FxHashMap::default()),
        }
    }

    fn descriptor_for(&self, wanted: &WantedSector) -> EngineResult<PayloadDescriptor> {
        let scenes = self.scenes.read();
        let scene = scenes.get(&wanted.model).ok_or(EngineError::ModelNotFound {
            model: wanted.model,
        })?;
        let metadata = scene.sector(wanted.sector).ok_or(EngineError::MissingSector {
            model: wanted.model,
            sector: wanted.sector,
        })?;
        metadata
            .payload(wanted.level)
            .cloned()
            .ok_or(EngineError::MissingPayload {
                model: wanted.model,
                sector: wanted.sector,
                level: wanted.level,
            })
    }

    async fn fetch_with_retry(&self, wanted: &WantedSector, descriptor: &PayloadDescriptor) -> EngineResult<SectorPayload> {
        let mut last_error = None;
        for attempt in 1..=FETCH_ATTEMPTS {
            match self.provider.fetch(wanted.model, descriptor).await {
                Ok(payload) => return Ok(payload),
                Err(error) => {
                    if attempt < FETCH_ATTEMPTS {
                        log::warn!(
                            "[repository::load_sector] fetch attempt {attempt} for {} {} failed: {error}",
                            wanted.model,
                            wanted.sector
                        );
                    }
                    last_error = Some(error);
                }
            }
        }
        Err(match last_error {
            Some(error) => EngineError::SectorFetchFailed {
                model: wanted.model,
                sector: wanted.sector,
                source: Box::new(error),
            },
            None => EngineError::MissingPayload {
                model: wanted.model,
                sector: wanted.sector,
                level: wanted.level,
            },
        })
    }
}

impl<P: SectorPayloadProvider> SectorRepository for CachedSectorRepository<P> {
    fn register_model(&self, model: ModelId, scene: Arc<SectorScene>) {
        self.scenes.write().insert(model, scene);
    }

    fn unregister_model(&self, model: ModelId) {
        self.scenes.write().remove(&model);
    }

    fn load_sector(&self, wanted: &WantedSector) -> BoxFuture<'_, EngineResult<ConsumedSector>> {
        let wanted = wanted.clone();
        Box::pin(async move {
            // Discards carry no payload and bypass the cache entirely
            if wanted.level == LevelOfDetail::Discarded {
                return Ok(ConsumedSector::discarded(wanted.model, wanted.sector));
            }

            let key = (wanted.model, wanted.sector, wanted.level);
            if let Some(payload) = self.cache.lock().get(&key) {
                return Ok(ConsumedSector {
                    model: wanted.model,
                    sector: wanted.sector,
                    level: wanted.level,
                    payload: Some(payload),
                });
            }

            let descriptor = self.descriptor_for(&wanted)?;
            let payload = Arc::new(self.fetch_with_retry(&wanted, &descriptor).await?);
            self.cache.lock().insert(key, Arc::clone(&payload));
            Ok(ConsumedSector {
                model: wanted.model,
                sector: wanted.sector,
                level: wanted.level,
                payload: Some(payload),
            })
        })
    }

    fn set_cache_size(&self, sector_count: usize) {
        self.cache.lock().set_capacity(sector_count);
    }

    fn clear_cache(&self) {
        self.cache.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::test_support::binary_scene;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider that counts fetches and fails a configurable number of times.
    struct CountingProvider {
        fetches: AtomicUsize,
        failures_before_success: AtomicUsize,
    }

    impl CountingProvider {
        fn new(failures_before_success: usize) -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                failures_before_success: AtomicUsize::new(failures_before_success),
            }
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("injected fetch failure")]
    struct InjectedFailure;

    impl SectorPayloadProvider for CountingProvider {
        fn fetch(&self, _model: ModelId, descriptor: &PayloadDescriptor) -> BoxFuture<'_, EngineResult<SectorPayload>> {
            let file_name = descriptor.file_name.clone();
            Box::pin(async move {
                self.fetches.fetch_add(1, Ordering::SeqCst);
                if self
                    .failures_before_success
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
                {
                    return Err(EngineError::SectorFetchFailed {
                        model: ModelId(0),
                        sector: SectorId(0),
                        source: Box::new(InjectedFailure),
                    });
                }
                Ok(SectorPayload {
                    file_name,
                    bytes: vec![0xAB; 16],
                })
            })
        }
    }

    fn repository(failures: usize) -> CachedSectorRepository<CountingProvider> {
        let repository = CachedSectorRepository::new(CountingProvider::new(failures), 16);
        repository.register_model(ModelId(1), Arc::new(binary_scene(3, 8)));
        repository
    }

    fn wanted(sector: u32, level: LevelOfDetail) -> WantedSector {
        WantedSector {
            model: ModelId(1),
            sector: SectorId(sector),
            level,
            clip_box: None,
            priority: 1.0,
        }
    }

    #[tokio::test]
    async fn second_load_is_served_from_cache() {
        let repository = repository(0);
        let first = repository.load_sector(&wanted(3, LevelOfDetail::Detailed)).await.unwrap();
        let second = repository.load_sector(&wanted(3, LevelOfDetail::Detailed)).await.unwrap();
        assert_eq!(repository.provider.fetches.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(
            first.payload.as_ref().unwrap(),
            second.payload.as_ref().unwrap()
        ));
    }

    #[tokio::test]
    async fn simple_and_detailed_are_cached_separately() {
        let repository = repository(0);
        repository.load_sector(&wanted(3, LevelOfDetail::Detailed)).await.unwrap();
        repository.load_sector(&wanted(3, LevelOfDetail::Simple)).await.unwrap();
        assert_eq!(repository.provider.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let repository = repository(2);
        let consumed = repository.load_sector(&wanted(3, LevelOfDetail::Detailed)).await.unwrap();
        assert_eq!(repository.provider.fetches.load(Ordering::SeqCst), 3);
        assert!(consumed.payload.is_some());
    }

    #[tokio::test]
    async fn persistent_failure_is_reported_after_retries() {
        let repository = repository(usize::MAX);
        let result = repository.load_sector(&wanted(3, LevelOfDetail::Detailed)).await;
        assert!(matches!(result, Err(EngineError::SectorFetchFailed { .. })));
        assert_eq!(repository.provider.fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn discard_requests_bypass_provider() {
        let repository = repository(0);
        let consumed = repository.load_sector(&wanted(3, LevelOfDetail::Discarded)).await.unwrap();
        assert_eq!(consumed.level, LevelOfDetail::Discarded);
        assert!(consumed.payload.is_none());
        assert_eq!(repository.provider.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_model_is_an_error() {
        let repository = repository(0);
        let mut unknown = wanted(3, LevelOfDetail::Detailed);
        unknown.model = ModelId(42);
        assert!(matches!(
            repository.load_sector(&unknown).await,
            Err(EngineError::ModelNotFound { .. })
        ));
    }
}
