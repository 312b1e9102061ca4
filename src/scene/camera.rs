use glam::{Mat3, Mat4, Vec3, Vec4};

use super::bounds::BoundingBox;

/// Left-handed, y-up first-person camera.
///
/// Orientation is kept as an orthonormal right / up / look basis that is
/// re-orthogonalised whenever the view matrix is rebuilt.
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vec3,
    right: Vec3,
    up: Vec3,
    look: Vec3,

    fov_y: f32,
    aspect: f32,
    near: f32,
    far: f32,

    view: Mat4,
    proj: Mat4,
    frustum: Frustum,
    view_dirty: bool,
    moved: bool,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera {
    #[must_use]
    pub fn new() -> Self {
        let mut cam = Self {
            position: Vec3::ZERO,
            right: Vec3::X,
            up: Vec3::Y,
            look: Vec3::Z,
            fov_y: 0.25 * std::f32::consts::PI,
            aspect: 1.0,
            near: 1.0,
            far: 1000.0,
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
            frustum: Frustum::default(),
            view_dirty: true,
            moved: true,
        };
        cam.set_lens(cam.fov_y, cam.aspect, cam.near, cam.far);
        cam.update_view_matrix();
        cam
    }

    pub fn set_lens(&mut self, fov_y: f32, aspect: f32, near: f32, far: f32) {
        self.fov_y = fov_y;
        self.aspect = aspect;
        self.near = near;
        self.far = far;
        self.proj = Mat4::perspective_lh(fov_y, aspect, near, far);
        self.view_dirty = true;
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.view_dirty = true;
    }

    pub fn look_at(&mut self, position: Vec3, target: Vec3, world_up: Vec3) {
        self.look = (target - position).normalize_or(Vec3::Z);
        self.right = world_up.cross(self.look).normalize_or(Vec3::X);
        self.up = self.look.cross(self.right);
        self.position = position;
        self.view_dirty = true;
    }

    /// Moves along the look direction.
    pub fn walk(&mut self, distance: f32) {
        self.position += distance * self.look;
        self.view_dirty = true;
    }

    /// Moves along the right direction.
    pub fn strafe(&mut self, distance: f32) {
        self.position += distance * self.right;
        self.view_dirty = true;
    }

    /// Rotates up and look around the camera's right axis.
    pub fn pitch(&mut self, angle: f32) {
        let r = Mat3::from_axis_angle(self.right, angle);
        self.up = r * self.up;
        self.look = r * self.look;
        self.view_dirty = true;
    }

    /// Rotates the whole basis around the world y axis.
    pub fn rotate_y(&mut self, angle: f32) {
        let r = Mat3::from_rotation_y(angle);
        self.right = r * self.right;
        self.up = r * self.up;
        self.look = r * self.look;
        self.view_dirty = true;
    }

    /// Rebuilds the view matrix and world-space frustum if anything changed.
    pub fn update_view_matrix(&mut self) {
        if !self.view_dirty {
            return;
        }
        self.look = self.look.normalize();
        self.up = self.look.cross(self.right).normalize();
        self.right = self.up.cross(self.look);

        self.view = Mat4::look_to_lh(self.position, self.look, self.up);
        self.frustum = Frustum::from_matrix(self.proj * self.view);
        self.view_dirty = false;
        self.moved = true;
    }

    /// Returns whether the view changed since the last call.
    pub fn take_moved(&mut self) -> bool {
        std::mem::take(&mut self.moved)
    }

    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    #[must_use]
    pub fn look(&self) -> Vec3 {
        self.look
    }

    #[must_use]
    pub fn right(&self) -> Vec3 {
        self.right
    }

    #[must_use]
    pub fn view(&self) -> Mat4 {
        self.view
    }

    #[must_use]
    pub fn proj(&self) -> Mat4 {
        self.proj
    }

    #[must_use]
    pub fn view_proj(&self) -> Mat4 {
        self.proj * self.view
    }

    #[must_use]
    pub fn near(&self) -> f32 {
        self.near
    }

    #[must_use]
    pub fn far(&self) -> f32 {
        self.far
    }

    #[must_use]
    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    /// World-space view frustum as of the last `update_view_matrix`.
    #[must_use]
    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Frustum {
    planes: [Vec4; 6], // Left, Right, Bottom, Top, Near, Far
}

impl Frustum {
    /// Gribb-Hartmann extraction for a [0, 1] depth range.
    #[must_use]
    pub fn from_matrix(m: Mat4) -> Self {
        let rows = [m.row(0), m.row(1), m.row(2), m.row(3)];

        let mut planes = [
            rows[3] + rows[0],
            rows[3] - rows[0],
            rows[3] + rows[1],
            rows[3] - rows[1],
            rows[2],
            rows[3] - rows[2],
        ];

        for plane in &mut planes {
            let length = plane.truncate().length();
            if length > 0.0 {
                *plane /= length;
            }
        }

        Self { planes }
    }

    #[must_use]
    pub fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }

    #[must_use]
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes.iter().all(|plane| plane.truncate().dot(center) + plane.w >= -radius)
    }

    /// Conservative box test: rejects only boxes fully outside one plane.
    #[must_use]
    pub fn intersects_box(&self, bounds: &BoundingBox) -> bool {
        self.planes.iter().all(|plane| {
            let normal = plane.truncate();
            let reach = bounds.extents.dot(normal.abs());
            normal.dot(bounds.center) + plane.w >= -reach
        })
    }
}
