//! Camera and Frustum Tests
//!
//! Tests for:
//! - Left-handed perspective with a [0, 1] depth range
//! - Fly-camera movement and basis orthonormality
//! - Frustum plane extraction (Gribb-Hartmann)
//! - Frustum-sphere and frustum-box intersection
//! - World-space bounds under transforms

use glam::{Mat4, Vec3};

use penumbra::scene::{BoundingBox, Camera, Frustum};

const EPSILON: f32 = 1e-4;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn camera_at_origin() -> Camera {
    let mut cam = Camera::new();
    cam.set_lens(0.25 * std::f32::consts::PI, 16.0 / 9.0, 1.0, 1000.0);
    cam.update_view_matrix();
    cam
}

// ============================================================================
// Projection
// ============================================================================

#[test]
fn near_plane_maps_to_zero_far_to_one() {
    let cam = camera_at_origin();
    let near = cam.view_proj().project_point3(Vec3::new(0.0, 0.0, 1.0));
    let far = cam.view_proj().project_point3(Vec3::new(0.0, 0.0, 1000.0));
    assert!(approx(near.z, 0.0), "near z = {}", near.z);
    assert!(approx(far.z, 1.0), "far z = {}", far.z);
}

#[test]
fn default_camera_looks_down_positive_z() {
    let cam = camera_at_origin();
    assert_eq!(cam.look(), Vec3::Z);
    let center = cam.view_proj().project_point3(Vec3::new(0.0, 0.0, 10.0));
    assert!(approx(center.x, 0.0) && approx(center.y, 0.0));
}

// ============================================================================
// Movement
// ============================================================================

#[test]
fn walk_and_strafe_follow_the_basis() {
    let mut cam = camera_at_origin();
    cam.walk(10.0);
    cam.strafe(-2.0);
    assert_eq!(cam.position(), Vec3::new(-2.0, 0.0, 10.0));
}

#[test]
fn rotation_keeps_the_basis_orthonormal() {
    let mut cam = camera_at_origin();
    for _ in 0..100 {
        cam.pitch(0.013);
        cam.rotate_y(0.021);
        cam.update_view_matrix();
    }
    let look = cam.look();
    let right = cam.right();
    assert!(approx(look.length(), 1.0));
    assert!(approx(right.length(), 1.0));
    assert!(approx(look.dot(right), 0.0));
}

#[test]
fn look_at_points_the_camera() {
    let mut cam = camera_at_origin();
    cam.look_at(Vec3::new(-30.0, 70.0, -20.0), Vec3::ZERO, Vec3::Y);
    cam.update_view_matrix();
    let target = cam.view().transform_point3(Vec3::ZERO);
    assert!(approx(target.x, 0.0) && approx(target.y, 0.0));
    assert!(target.z > 0.0);
}

#[test]
fn moved_flag_is_taken_once() {
    let mut cam = camera_at_origin();
    assert!(cam.take_moved());
    assert!(!cam.take_moved());

    cam.update_view_matrix();
    assert!(!cam.take_moved(), "no change, no rebuild");

    cam.walk(1.0);
    cam.update_view_matrix();
    assert!(cam.take_moved());
}

// ============================================================================
// Frustum
// ============================================================================

#[test]
fn frustum_planes_are_normalized() {
    let cam = camera_at_origin();
    for plane in cam.frustum().planes() {
        assert!(approx(plane.truncate().length(), 1.0));
    }
}

#[test]
fn frustum_sphere_tests() {
    let cam = camera_at_origin();
    let f = cam.frustum();
    assert!(f.intersects_sphere(Vec3::new(0.0, 0.0, 50.0), 1.0));
    assert!(!f.intersects_sphere(Vec3::new(0.0, 0.0, -50.0), 1.0));
    assert!(!f.intersects_sphere(Vec3::new(0.0, 0.0, 1100.0), 10.0));
    // Straddling the near plane.
    assert!(f.intersects_sphere(Vec3::new(0.0, 0.0, 0.5), 1.0));
}

#[test]
fn frustum_box_tests() {
    let cam = camera_at_origin();
    let f = cam.frustum();
    assert!(f.intersects_box(&BoundingBox::new(Vec3::new(0.0, 0.0, 50.0), Vec3::splat(5.0))));
    assert!(!f.intersects_box(&BoundingBox::new(Vec3::new(0.0, 0.0, -50.0), Vec3::splat(5.0))));
    assert!(!f.intersects_box(&BoundingBox::new(Vec3::new(500.0, 0.0, 50.0), Vec3::splat(5.0))));
    // Partially inside the left plane.
    assert!(f.intersects_box(&BoundingBox::new(Vec3::new(-40.0, 0.0, 50.0), Vec3::new(20.0, 1.0, 1.0))));
}

#[test]
fn frustum_follows_the_camera() {
    let mut cam = camera_at_origin();
    let behind = BoundingBox::new(Vec3::new(0.0, 0.0, -50.0), Vec3::splat(1.0));
    assert!(!cam.frustum().intersects_box(&behind));

    cam.rotate_y(std::f32::consts::PI);
    cam.update_view_matrix();
    assert!(cam.frustum().intersects_box(&behind));
}

#[test]
fn frustum_from_identity_is_the_unit_clip_box() {
    let f = Frustum::from_matrix(Mat4::IDENTITY);
    assert!(f.intersects_sphere(Vec3::new(0.0, 0.0, 0.5), 0.1));
    assert!(!f.intersects_sphere(Vec3::new(3.0, 0.0, 0.5), 0.1));
}

// ============================================================================
// Bounds
// ============================================================================

#[test]
fn bounds_from_points() {
    let b = BoundingBox::from_points([Vec3::new(-1.0, 0.0, 2.0), Vec3::new(3.0, 4.0, -2.0)]);
    assert_eq!(b.center, Vec3::new(1.0, 2.0, 0.0));
    assert_eq!(b.extents, Vec3::new(2.0, 2.0, 2.0));
    assert!(b.contains_point(Vec3::new(0.0, 1.0, 1.0)));
}

#[test]
fn transformed_bounds_enclose_rotated_corners() {
    let b = BoundingBox::new(Vec3::ZERO, Vec3::new(2.0, 1.0, 1.0));
    let m = Mat4::from_translation(Vec3::new(0.0, 0.0, 10.0)) * Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4);
    let t = b.transformed(&m);
    for corner in b.corners() {
        let p = m.transform_point3(corner);
        let inside = (p - t.center).abs().cmple(t.extents + Vec3::splat(EPSILON)).all();
        assert!(inside, "{p} outside {t:?}");
    }
    assert!(approx(t.center.z, 10.0));
}
