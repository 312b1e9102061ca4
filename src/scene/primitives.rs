//! Procedural meshes: boxes, grids, spheres, the light-volume cone and a
//! screen-space quad.
//!
//! All meshes are left-handed, y-up, with clockwise front faces.

use std::f32::consts::PI;

use glam::Vec3;

use super::geometry::{MeshData, Vertex};

fn mesh(name: &str, vertices: Vec<Vertex>, indices: Vec<u32>) -> MeshData {
    MeshData { name: name.to_string(), vertices, indices }
}

#[must_use]
pub fn create_box(name: &str, width: f32, height: f32, depth: f32) -> MeshData {
    let half = Vec3::new(width, height, depth) * 0.5;
    // (normal, tangent, bitangent) with tangent × bitangent = -normal
    let faces = [
        (Vec3::NEG_Z, Vec3::X, Vec3::Y),
        (Vec3::Z, Vec3::NEG_X, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::Z),
        (Vec3::NEG_Y, Vec3::NEG_X, Vec3::Z),
        (Vec3::NEG_X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::X, Vec3::Z, Vec3::Y),
    ];
    let along = |axis: Vec3| axis.abs().dot(half);

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (n, t, b) in faces {
        let center = n * along(n);
        let (tx, by) = (t * along(t), b * along(b));
        let base = vertices.len() as u32;
        vertices.push(Vertex::new(center - tx - by, n, [0.0, 1.0], t));
        vertices.push(Vertex::new(center - tx + by, n, [0.0, 0.0], t));
        vertices.push(Vertex::new(center + tx + by, n, [1.0, 0.0], t));
        vertices.push(Vertex::new(center + tx - by, n, [1.0, 1.0], t));
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    mesh(name, vertices, indices)
}

/// A flat `rows × cols` vertex grid in the XZ plane, centered at the origin.
#[must_use]
pub fn create_grid(name: &str, width: f32, depth: f32, rows: u32, cols: u32) -> MeshData {
    let (rows, cols) = (rows.max(2), cols.max(2));
    let dx = width / (cols - 1) as f32;
    let dz = depth / (rows - 1) as f32;
    let du = 1.0 / (cols - 1) as f32;
    let dv = 1.0 / (rows - 1) as f32;

    let mut vertices = Vec::with_capacity((rows * cols) as usize);
    for i in 0..rows {
        let z = 0.5 * depth - i as f32 * dz;
        for j in 0..cols {
            let x = -0.5 * width + j as f32 * dx;
            vertices.push(Vertex::new(Vec3::new(x, 0.0, z), Vec3::Y, [j as f32 * du, i as f32 * dv], Vec3::X));
        }
    }

    let mut indices = Vec::with_capacity(((rows - 1) * (cols - 1) * 6) as usize);
    for i in 0..rows - 1 {
        for j in 0..cols - 1 {
            let a = i * cols + j;
            let c = (i + 1) * cols + j;
            indices.extend_from_slice(&[a, a + 1, c, c, a + 1, c + 1]);
        }
    }
    mesh(name, vertices, indices)
}

pub struct SphereOptions {
    pub radius: f32,
    pub slices: u32,
    pub stacks: u32,
}

impl Default for SphereOptions {
    fn default() -> Self {
        Self { radius: 1.0, slices: 20, stacks: 20 }
    }
}

/// UV sphere with single pole vertices.
#[must_use]
pub fn create_sphere(name: &str, options: &SphereOptions) -> MeshData {
    let r = options.radius;
    let slices = options.slices.max(3);
    let stacks = options.stacks.max(2);
    let phi_step = PI / stacks as f32;
    let theta_step = 2.0 * PI / slices as f32;

    let mut vertices = Vec::new();
    vertices.push(Vertex::new(Vec3::new(0.0, r, 0.0), Vec3::Y, [0.0, 0.0], Vec3::X));
    for i in 1..stacks {
        let phi = i as f32 * phi_step;
        for j in 0..=slices {
            let theta = j as f32 * theta_step;
            let p = Vec3::new(r * phi.sin() * theta.cos(), r * phi.cos(), r * phi.sin() * theta.sin());
            let tangent = Vec3::new(-phi.sin() * theta.sin(), 0.0, phi.sin() * theta.cos()).normalize_or_zero();
            let uv = [theta / (2.0 * PI), phi / PI];
            vertices.push(Vertex::new(p, p.normalize_or_zero(), uv, tangent));
        }
    }
    vertices.push(Vertex::new(Vec3::new(0.0, -r, 0.0), Vec3::NEG_Y, [0.0, 1.0], Vec3::X));

    let mut indices = Vec::new();
    for i in 1..=slices {
        indices.extend_from_slice(&[0, i + 1, i]);
    }
    let ring = slices + 1;
    let base = 1;
    for i in 0..stacks - 2 {
        for j in 0..slices {
            let a = base + i * ring + j;
            let c = base + (i + 1) * ring + j;
            indices.extend_from_slice(&[a, a + 1, c, c, a + 1, c + 1]);
        }
    }
    let south = vertices.len() as u32 - 1;
    let base = south - ring;
    for i in 0..slices {
        indices.extend_from_slice(&[south, base + i, base + i + 1]);
    }
    mesh(name, vertices, indices)
}

/// Unit cone with its apex at the origin opening toward -Y: height 1,
/// base radius 1, closed at the base.
#[must_use]
pub fn create_cone(name: &str, slices: u32) -> MeshData {
    let slices = slices.max(3);
    let step = 2.0 * PI / slices as f32;
    let ring_point = |j: u32| {
        let theta = j as f32 * step;
        Vec3::new(theta.cos(), -1.0, theta.sin())
    };

    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    // Side
    vertices.push(Vertex::new(Vec3::ZERO, Vec3::Y, [0.5, 0.0], Vec3::X));
    for j in 0..=slices {
        let p = ring_point(j);
        let normal = Vec3::new(p.x, 1.0, p.z).normalize();
        let tangent = Vec3::new(-p.z, 0.0, p.x);
        vertices.push(Vertex::new(p, normal, [j as f32 / slices as f32, 1.0], tangent));
    }
    for j in 0..slices {
        indices.extend_from_slice(&[0, j + 2, j + 1]);
    }

    // Base cap
    let center = vertices.len() as u32;
    vertices.push(Vertex::new(Vec3::NEG_Y, Vec3::NEG_Y, [0.5, 0.5], Vec3::X));
    for j in 0..=slices {
        let p = ring_point(j);
        vertices.push(Vertex::new(p, Vec3::NEG_Y, [0.5 + 0.5 * p.x, 0.5 + 0.5 * p.z], Vec3::X));
    }
    for j in 0..slices {
        indices.extend_from_slice(&[center, center + 1 + j, center + 2 + j]);
    }
    mesh(name, vertices, indices)
}

/// Screen-space quad with its top-left corner at (`x`, `y`) in NDC.
#[must_use]
pub fn create_quad(name: &str, x: f32, y: f32, width: f32, height: f32, depth: f32) -> MeshData {
    let n = Vec3::NEG_Z;
    let vertices = vec![
        Vertex::new(Vec3::new(x, y - height, depth), n, [0.0, 1.0], Vec3::X),
        Vertex::new(Vec3::new(x, y, depth), n, [0.0, 0.0], Vec3::X),
        Vertex::new(Vec3::new(x + width, y, depth), n, [1.0, 0.0], Vec3::X),
        Vertex::new(Vec3::new(x + width, y - height, depth), n, [1.0, 1.0], Vec3::X),
    ];
    mesh(name, vertices, vec![0, 1, 2, 0, 2, 3])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_indices_in_range(m: &MeshData) {
        let n = m.vertices.len() as u32;
        assert!(m.indices.iter().all(|&i| i < n), "{} has out-of-range indices", m.name);
        assert_eq!(m.indices.len() % 3, 0);
    }

    #[test]
    fn box_bounds_match_extents() {
        let b = create_box("box", 2.0, 4.0, 6.0);
        assert_eq!(b.vertices.len(), 24);
        assert_eq!(b.indices.len(), 36);
        assert_indices_in_range(&b);
        let bounds = b.bounds();
        assert!((bounds.extents - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-5);
    }

    #[test]
    fn box_faces_wind_clockwise_from_outside() {
        let b = create_box("box", 1.0, 1.0, 1.0);
        for tri in b.indices.chunks(3) {
            let [p0, p1, p2] = [0, 1, 2].map(|k| b.vertices[tri[k] as usize].position());
            let n = b.vertices[tri[0] as usize].normal;
            // Clockwise seen from outside in a left-handed frame: the
            // edge cross product points along the outward normal.
            let face = (p1 - p0).cross(p2 - p0);
            assert!(face.dot(Vec3::from_array(n)) > 0.0);
        }
    }

    #[test]
    fn sphere_and_cone_are_well_formed() {
        let s = create_sphere("sphere", &SphereOptions::default());
        assert_indices_in_range(&s);
        assert!((s.bounds().extents - Vec3::ONE).length() < 1e-4);

        let c = create_cone("cone", 16);
        assert_indices_in_range(&c);
        let bounds = c.bounds();
        assert!((bounds.max().y - 0.0).abs() < 1e-6);
        assert!((bounds.min().y + 1.0).abs() < 1e-6);
    }

    #[test]
    fn grid_vertex_count() {
        let g = create_grid("grid", 20.0, 30.0, 60, 40);
        assert_eq!(g.vertices.len(), 2400);
        assert_eq!(g.indices.len(), 59 * 39 * 6);
        assert_indices_in_range(&g);
    }
}
