use glam::{Mat4, Vec3};

/// Axis-aligned bounding box stored as center + half extents.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub center: Vec3,
    pub extents: Vec3,
}

impl BoundingBox {
    #[must_use]
    pub const fn new(center: Vec3, extents: Vec3) -> Self {
        Self { center, extents }
    }

    #[must_use]
    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        Self {
            center: (min + max) * 0.5,
            extents: (max - min) * 0.5,
        }
    }

    /// Smallest box containing every point. Empty input yields a degenerate
    /// box at the origin.
    #[must_use]
    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Self {
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        let mut any = false;
        for p in points {
            min = min.min(p);
            max = max.max(p);
            any = true;
        }
        if any { Self::from_min_max(min, max) } else { Self::default() }
    }

    #[must_use]
    pub fn min(&self) -> Vec3 {
        self.center - self.extents
    }

    #[must_use]
    pub fn max(&self) -> Vec3 {
        self.center + self.extents
    }

    #[must_use]
    pub fn corners(&self) -> [Vec3; 8] {
        let (c, e) = (self.center, self.extents);
        [
            c + Vec3::new(-e.x, -e.y, -e.z),
            c + Vec3::new(e.x, -e.y, -e.z),
            c + Vec3::new(e.x, e.y, -e.z),
            c + Vec3::new(-e.x, e.y, -e.z),
            c + Vec3::new(-e.x, -e.y, e.z),
            c + Vec3::new(e.x, -e.y, e.z),
            c + Vec3::new(e.x, e.y, e.z),
            c + Vec3::new(-e.x, e.y, e.z),
        ]
    }

    /// Box enclosing this box after an affine transform.
    #[must_use]
    pub fn transformed(&self, m: &Mat4) -> Self {
        Self::from_points(self.corners().into_iter().map(|p| m.transform_point3(p)))
    }

    #[must_use]
    pub fn contains_point(&self, p: Vec3) -> bool {
        let d = (p - self.center).abs();
        d.x <= self.extents.x && d.y <= self.extents.y && d.z <= self.extents.z
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_and_scale_move_the_box() {
        let unit = BoundingBox::new(Vec3::ZERO, Vec3::ONE);
        let m = Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0)) * Mat4::from_scale(Vec3::splat(2.0));
        let b = unit.transformed(&m);
        assert!((b.center - Vec3::new(10.0, 0.0, 0.0)).length() < 1e-5);
        assert!((b.extents - Vec3::splat(2.0)).length() < 1e-5);
    }

    #[test]
    fn rotation_grows_the_box() {
        let unit = BoundingBox::new(Vec3::ZERO, Vec3::ONE);
        let b = unit.transformed(&Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4));
        assert!(b.extents.x > 1.4 && b.extents.x < 1.42);
        assert!((b.extents.y - 1.0).abs() < 1e-5);
    }
}
