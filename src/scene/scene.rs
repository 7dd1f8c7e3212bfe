//! Per-model sector scene: the static hierarchical index of sectors

use std::sync::Arc;

use glam::Mat4;
use rustc_hash::FxHashMap;

use crate::camera::Frustum;
use crate::error::{EngineError, EngineResult};

use super::bounds::Aabb;
use super::sector::{ModelId, SectorId, SectorMetadata};

/// Supported scene-tree schema variants, selected once per model from the
/// version tag carried by the scene.
///
/// `V8` uses LOD-by-replacement: each sector carries both a simple and a
/// detailed payload and a detailed parent replaces its own simple geometry
/// while children show simple geometry. `V9` is additive: sectors carry
/// detailed payloads only and committed sectors accumulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneVersion {
    V8,
    V9,
}

impl SceneVersion {
    /// Maps a raw version tag to a schema variant. Anything else is a fatal,
    /// non-retried configuration error.
    pub fn from_tag(tag: u32) -> EngineResult<Self> {
        match tag {
            8 => Ok(SceneVersion::V8),
            9 => Ok(SceneVersion::V9),
            version => Err(EngineError::UnsupportedSceneVersion { version }),
        }
    }

    /// Whether this schema carries a simple level of detail at all.
    pub fn has_simple_level(self) -> bool {
        matches!(self, SceneVersion::V8)
    }
}

/// Static, immutable sector index for one model.
#[derive(Debug)]
pub struct SectorScene {
    version_tag: u32,
    root: SectorId,
    max_sector_id: SectorId,
    sectors: FxHashMap<SectorId, SectorMetadata>,
}

impl SectorScene {
    pub fn version_tag(&self) -> u32 {
        self.version_tag
    }

    pub fn root_id(&self) -> SectorId {
        self.root
    }

    pub fn root(&self) -> &SectorMetadata {
        &self.sectors[&self.root]
    }

    /// Highest sector id in the scene. Ids increase monotonically as scenes
    /// are (re)published, so this doubles as a compact revision marker.
    pub fn max_sector_id(&self) -> SectorId {
        self.max_sector_id
    }

    pub fn sector_count(&self) -> usize {
        self.sectors.len()
    }

    pub fn sector(&self, id: SectorId) -> Option<&SectorMetadata> {
        self.sectors.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SectorMetadata> {
        self.sectors.values()
    }

    /// Sector ids on the path from the root down to `id`, inclusive.
    pub fn path_from_root(&self, id: SectorId) -> Option<Vec<SectorId>> {
        let mut path = vec![id];
        let mut current = self.sectors.get(&id)?;
        while let Some(parent) = current.parent {
            path.push(parent);
            current = self.sectors.get(&parent)?;
        }
        path.reverse();
        Some(path)
    }

    /// Depth-first collection of sectors whose bounds intersect the frustum of
    /// `view_projection` (which must already include the model matrix for
    /// model-space bounds). Subtrees are pruned at the first miss since child
    /// bounds are contained in their parent's.
    pub fn sectors_intersecting_frustum(&self, view_projection: Mat4) -> Vec<&SectorMetadata> {
        let frustum = Frustum::from_matrix(view_projection);
        let mut hits = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let sector = &self.sectors[&id];
            if !frustum.intersects(&sector.bounds) {
                continue;
            }
            stack.extend(sector.children.iter().copied());
            hits.push(sector);
        }
        hits
    }

    /// All sectors whose bounds intersect `query`, pruned the same way.
    pub fn sectors_intersecting_box(&self, query: &Aabb) -> Vec<&SectorMetadata> {
        let mut hits = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let sector = &self.sectors[&id];
            if !sector.bounds.intersects(query) {
                continue;
            }
            stack.extend(sector.children.iter().copied());
            hits.push(sector);
        }
        hits
    }
}

/// Builds a `SectorScene` from flat sector metadata, deriving child lists and
/// depths from the parent links and validating tree consistency.
pub struct SectorSceneBuilder {
    version_tag: u32,
    sectors: Vec<SectorMetadata>,
}

impl SectorSceneBuilder {
    pub fn new(version_tag: u32) -> Self {
        Self {
            version_tag,
            sectors: Vec::new(),
        }
    }

    /// Adds a sector. `children` and `depth` are recomputed by `build()` and
    /// may be left empty/zero.
    pub fn with_sector(mut self, sector: SectorMetadata) -> Self {
        self.sectors.push(sector);
        self
    }

    pub fn build(self) -> EngineResult<SectorScene> {
        if self.sectors.is_empty() {
            return Err(EngineError::SceneBuild {
                reason: "scene has no sectors".to_string(),
            });
        }

        let mut sectors: FxHashMap<SectorId, SectorMetadata> = FxHashMap::default();
        for sector in self.sectors {
            if sectors.insert(sector.id, sector).is_some() {
                return Err(EngineError::SceneBuild {
                    reason: "duplicate sector id".to_string(),
                });
            }
        }

        // Rebuild child lists from parent links
        let ids: Vec<SectorId> = sectors.keys().copied().collect();
        for id in &ids {
            sectors.get_mut(id).map(|s| s.children.clear());
        }
        let mut roots = Vec::new();
        for id in &ids {
            match sectors[id].parent {
                None => roots.push(*id),
                Some(parent) => {
                    let child = *id;
                    match sectors.get_mut(&parent) {
                        Some(p) => p.children.push(child),
                        None => {
                            return Err(EngineError::SceneBuild {
                                reason: format!("sector {child} references missing parent {parent}"),
                            })
                        }
                    }
                }
            }
        }
        let root = match roots.as_slice() {
            [root] => *root,
            [] => {
                return Err(EngineError::SceneBuild {
                    reason: "scene has no root sector".to_string(),
                })
            }
            _ => {
                return Err(EngineError::SceneBuild {
                    reason: "scene has multiple root sectors".to_string(),
                })
            }
        };

        // Keep child iteration order deterministic
        for id in &ids {
            if let Some(s) = sectors.get_mut(id) {
                s.children.sort();
            }
        }

        // Assign depths; counting visits also catches parent cycles
        let mut visited = 0usize;
        let mut stack = vec![(root, 0u32)];
        while let Some((id, depth)) = stack.pop() {
            visited += 1;
            let children = {
                let sector = sectors.get_mut(&id).ok_or_else(|| EngineError::SceneBuild {
                    reason: format!("sector {id} vanished during build"),
                })?;
                sector.depth = depth;
                sector.children.clone()
            };
            for child in children {
                stack.push((child, depth + 1));
            }
        }
        if visited != sectors.len() {
            return Err(EngineError::SceneBuild {
                reason: "scene tree contains unreachable sectors or a cycle".to_string(),
            });
        }

        let max_sector_id = ids.iter().copied().max().unwrap_or(root);
        Ok(SectorScene {
            version_tag: self.version_tag,
            root,
            max_sector_id,
            sectors,
        })
    }
}

/// A loaded model: shared scene plus placement in the world.
#[derive(Debug, Clone)]
pub struct SectorModel {
    pub id: ModelId,
    pub scene: Arc<SectorScene>,
    /// Model-to-world transform.
    pub model_matrix: Mat4,
    /// Optional box (model space) the loaded geometry should be clipped to.
    pub geometry_clip_box: Option<Aabb>,
}

impl SectorModel {
    pub fn new(id: ModelId, scene: Arc<SectorScene>) -> Self {
        Self {
            id,
            scene,
            model_matrix: Mat4::IDENTITY,
            geometry_clip_box: None,
        }
    }

    pub fn version(&self) -> EngineResult<SceneVersion> {
        SceneVersion::from_tag(self.scene.version_tag())
    }
}
