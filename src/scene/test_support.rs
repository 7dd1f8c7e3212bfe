//! Shared fixtures for unit tests

use glam::Vec3;

use super::{Aabb, PayloadDescriptor, SectorId, SectorMetadata, SectorScene, SectorSceneBuilder};

pub fn sector(id: u32, parent: Option<u32>, min: Vec3, max: Vec3) -> SectorMetadata {
    SectorMetadata {
        id: SectorId(id),
        parent: parent.map(SectorId),
        children: Vec::new(),
        depth: 0,
        bounds: Aabb::new(min, max),
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

/// Complete binary tree with breadth-first ids (node `i` has children `2i+1`
/// and `2i+2`), every sector carrying both payloads. Bounds split the root
/// extent along x so that sibling subtrees are spatially disjoint.
pub fn binary_scene(levels: u32, version_tag: u32) -> SectorScene {
    let node_count = (1u32 << levels) - 1;
    let width = 2f32.powi(levels as i32 - 1) * 10.0;

    let mut builder = SectorSceneBuilder::new(version_tag);
    for id in 0..node_count {
        let depth = (id + 1).ilog2();
        let index_in_level = id + 1 - (1 << depth);
        let slots = 1u32 << depth;
        let slot_width = width / slots as f32;
        let min_x = index_in_level as f32 * slot_width;
        let parent = if id == 0 { None } else { Some((id - 1) / 2) };
        builder = builder.with_sector(sector(
            id,
            parent,
            Vec3::new(min_x, 0.0, 0.0),
            Vec3::new(min_x + slot_width, 10.0, 10.0),
        ));
    }
    builder.build().expect("test scene must build")
}
