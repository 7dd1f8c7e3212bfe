//! Priority weight functions
//!
//! Stateless scoring over camera pose and world-space sector bounds. Each
//! weight is normalized to [0, 1] except the prioritized-area weight, which
//! passes the caller's extra priority through unchanged. The heuristic culler
//! combines a subset into a single ordering-only scalar; absolute magnitudes
//! carry no meaning.

use glam::Vec4Swizzles;

use crate::camera::CameraPose;
use crate::scene::Aabb;

use super::types::PrioritizedArea;

/// Depth band split points as fractions of the near-far range.
const DEPTH_BANDS: [(f32, f32, f32); 3] = [
    (0.00, 0.05, 0.1),
    (0.05, 0.40, 0.7),
    (0.40, 1.00, 0.2),
];

/// Screen coverage at which the node-size weight saturates.
const NODE_COVERAGE_SATURATION: f32 = 0.05;

/// Fraction of a sector's diagonal used as the largest-object estimate when
/// per-node extents are not available.
const MAX_NODE_DIAGONAL_FRACTION: f32 = 0.25;

/// Accumulates the min/max candidate distance of one cycle, then scores
/// distances against that range.
#[derive(Debug, Clone, Copy)]
pub struct DistanceRange {
    min: f32,
    max: f32,
}

impl DistanceRange {
    pub fn new() -> Self {
        Self {
            min: f32::INFINITY,
            max: f32::NEG_INFINITY,
        }
    }

    pub fn observe(&mut self, distance: f32) {
        self.min = self.min.min(distance);
        self.max = self.max.max(distance);
    }

    /// 1.0 at (or inside) the nearest candidate, linear decay to 0.0 at the
    /// farthest.
    pub fn weight(&self, distance: f32) -> f32 {
        if distance <= 0.0 {
            return 1.0;
        }
        let span = self.max - self.min;
        if !span.is_finite() || span <= f32::EPSILON {
            return 1.0;
        }
        (1.0 - (distance - self.min) / span).clamp(0.0, 1.0)
    }
}

impl Default for DistanceRange {
    fn default() -> Self {
        Self::new()
    }
}

/// Projected NDC area of the bounds, normalized to [0, 1]. Full weight when
/// the camera is inside the bounds or a corner crosses the projection plane.
pub fn screen_area_weight(bounds: &Aabb, camera: &CameraPose) -> f32 {
    if bounds.contains_point(camera.position) {
        return 1.0;
    }
    let view_projection = camera.view_projection();
    let mut min = glam::Vec2::splat(f32::INFINITY);
    let mut max = glam::Vec2::splat(f32::NEG_INFINITY);
    for corner in bounds.corners() {
        let clip = view_projection * corner.extend(1.0);
        if clip.w <= f32::EPSILON {
            return 1.0;
        }
        let ndc = (clip.xy() / clip.w).clamp(glam::Vec2::splat(-1.0), glam::Vec2::splat(1.0));
        min = min.min(ndc);
        max = max.max(ndc);
    }
    let extent = (max - min).max(glam::Vec2::ZERO);
    // NDC spans [-1, 1] in both axes, so the full screen has area 4
    (extent.x * extent.y / 4.0).clamp(0.0, 1.0)
}

/// Weight of the depth bands the bounds intersect. Content at roughly
/// 5%-40% of the near-far range dominates, the nearest band matters a
/// little, the far band barely.
pub fn frustum_depth_weight(bounds: &Aabb, camera: &CameraPose) -> f32 {
    let range = camera.far - camera.near;
    if range <= f32::EPSILON {
        return 0.0;
    }
    let mut depth_min = f32::INFINITY;
    let mut depth_max = f32::NEG_INFINITY;
    for corner in bounds.corners() {
        let view = camera.view_matrix.transform_point3(corner);
        let depth = -view.z;
        depth_min = depth_min.min(depth);
        depth_max = depth_max.max(depth);
    }
    let t_min = ((depth_min - camera.near) / range).clamp(0.0, 1.0);
    let t_max = ((depth_max - camera.near) / range).clamp(0.0, 1.0);
    if depth_max < camera.near || depth_min > camera.far {
        return 0.0;
    }
    DEPTH_BANDS
        .iter()
        .filter(|(band_min, band_max, _)| t_max >= *band_min && t_min < *band_max)
        .map(|(_, _, importance)| importance)
        .sum()
}

/// Sectors directly under the root are assumed to carry the large, prominent
/// geometry and score full weight; deeper sectors score a third.
pub fn tree_placement_weight(depth: u32) -> f32 {
    if depth <= 1 {
        1.0
    } else {
        1.0 / 3.0
    }
}

/// Estimated screen coverage of the largest object in the sector, saturating
/// once that object would cover a few percent of the screen.
pub fn node_screen_size_weight(bounds: &Aabb, camera: &CameraPose) -> f32 {
    if bounds.contains_point(camera.position) {
        return 1.0;
    }
    let distance = bounds.distance_to_point(camera.position).max(camera.near);
    let screen_extent = 2.0 * distance * (camera.fov_y * 0.5).tan();
    if screen_extent <= f32::EPSILON {
        return 1.0;
    }
    let node_diagonal = bounds.diagonal() * MAX_NODE_DIAGONAL_FRACTION;
    let fraction = (node_diagonal / screen_extent).clamp(0.0, 1.0);
    let coverage = fraction * fraction;
    (coverage / NODE_COVERAGE_SATURATION).clamp(0.0, 1.0)
}

/// Largest extra priority among the prioritized areas intersecting the
/// bounds; 0 when none do. Not normalized.
pub fn prioritized_area_weight(bounds: &Aabb, areas: &[PrioritizedArea]) -> f32 {
    areas
        .iter()
        .filter(|area| area.area.intersects(bounds))
        .map(|area| area.extra_priority)
        .fold(0.0, f32::max)
}
