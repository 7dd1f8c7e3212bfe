//! Camera input types and frustum math
//!
//! The camera is an input signal to the culling pass, not a render camera.
//! Frustum planes are extracted from the combined view-projection matrix
//! (Gribb/Hartmann) and tested conservatively against sector bounds.

use glam::{Mat4, Vec3};

use crate::scene::Aabb;

/// A plane in world space, `normal . p + d = 0`. Also used for caller-supplied
/// clip planes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    pub fn new(normal: Vec3, d: f32) -> Self {
        Self { normal, d }
    }

    /// Signed distance from the plane to a point. Positive is the kept side.
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.d
    }

    fn normalized(self) -> Self {
        let len = self.normal.length();
        if len <= f32::EPSILON {
            return self;
        }
        Self {
            normal: self.normal / len,
            d: self.d / len,
        }
    }
}

/// Camera pose and projection parameters for one update cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub position: Vec3,
    /// World-to-camera transform
    pub view_matrix: Mat4,
    /// Vertical field of view in radians
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl CameraPose {
    pub fn look_at(position: Vec3, target: Vec3, up: Vec3, fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position,
            view_matrix: Mat4::look_at_rh(position, target, up),
            fov_y,
            aspect,
            near,
            far,
        }
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix
    }

    /// Same pose with the far plane clamped. Used to build the short-range
    /// frustum that forces nearby sectors to high detail.
    pub fn with_far(mut self, far: f32) -> Self {
        self.far = far.min(self.far).max(self.near * 1.001);
        self
    }
}

/// View frustum as six inward-facing planes.
#[derive(Debug, Clone, Copy)]
pub struct Frustum {
    planes: [Plane; 6],
}

impl Frustum {
    /// Extract frustum planes from a view-projection matrix (optionally
    /// pre-multiplied with a model matrix for model-space tests).
    pub fn from_matrix(view_projection: Mat4) -> Self {
        let r0 = view_projection.row(0);
        let r1 = view_projection.row(1);
        let r2 = view_projection.row(2);
        let r3 = view_projection.row(3);

        let plane = |v: glam::Vec4| Plane::new(Vec3::new(v.x, v.y, v.z), v.w).normalized();
        Self {
            planes: [
                plane(r3 + r0), // left
                plane(r3 - r0), // right
                plane(r3 + r1), // bottom
                plane(r3 - r1), // top
                plane(r3 + r2), // near
                plane(r3 - r2), // far
            ],
        }
    }

    /// Conservative box-frustum test: a box is rejected only if all corners
    /// are outside one plane. May report intersection for boxes slightly
    /// outside a frustum corner, which only costs a little extra scoring work.
    pub fn intersects(&self, bounds: &Aabb) -> bool {
        let corners = bounds.corners();
        for plane in &self.planes {
            if corners.iter().all(|&c| plane.signed_distance(c) < 0.0) {
                return false;
            }
        }
        true
    }
}

/// A clip-plane rejection test shared by the cullers: a box passes when every
/// plane accepts at least one of its corners.
pub fn accepted_by_clip_planes(bounds: &Aabb, planes: &[Plane]) -> bool {
    let corners = bounds.corners();
    planes
        .iter()
        .all(|plane| corners.iter().any(|&c| plane.signed_distance(c) >= 0.0))
}
