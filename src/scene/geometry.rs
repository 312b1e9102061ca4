//! Geometry Store
//!
//! Meshes are packed into shared vertex/index buffers, one pair per
//! [`MeshGeometry`]. Each source mesh becomes a named submesh addressed by
//! [`DrawArgs`] (index range, base vertex and local-space bounds). Render
//! items copy the draw args they need at build time and keep only the
//! [`GeometryKey`] of the buffers they draw from.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use super::GeometryKey;
use super::bounds::BoundingBox;
use crate::errors::{RenderError, Result};
use crate::gpu::{BufferDesc, BufferId, BufferUsage, GeometryBinding, GpuDevice, IndexFormat};

/// Vertex layout shared by every mesh: tangent, position, normal, uv.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub tangent: [f32; 3],
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    #[must_use]
    pub fn new(position: Vec3, normal: Vec3, uv: [f32; 2], tangent: Vec3) -> Self {
        Self {
            tangent: tangent.to_array(),
            position: position.to_array(),
            normal: normal.to_array(),
            uv,
        }
    }

    #[must_use]
    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }
}

/// Decoded mesh handed over by the asset layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<Vertex>,
    /// Indices local to this mesh's vertices.
    pub indices: Vec<u32>,
}

impl MeshData {
    #[must_use]
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_points(self.vertices.iter().map(Vertex::position))
    }
}

/// Arguments for one indexed draw of a submesh.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DrawArgs {
    pub index_count: u32,
    pub start_index: u32,
    pub base_vertex: i32,
    /// Local-space bounds of the submesh.
    pub bounds: BoundingBox,
}

/// A vertex/index buffer pair holding several submeshes.
#[derive(Debug)]
pub struct MeshGeometry {
    pub name: String,
    vertex_buffer: BufferId,
    index_buffer: BufferId,
    index_format: IndexFormat,
    submeshes: FxHashMap<String, DrawArgs>,
}

impl MeshGeometry {
    #[must_use]
    pub fn binding(&self) -> GeometryBinding {
        GeometryBinding {
            vertex_buffer: self.vertex_buffer,
            vertex_stride: std::mem::size_of::<Vertex>() as u32,
            index_buffer: self.index_buffer,
            index_format: self.index_format,
        }
    }

    pub fn submesh(&self, name: &str) -> Result<DrawArgs> {
        self.submeshes
            .get(name)
            .copied()
            .ok_or_else(|| RenderError::GeometryNotFound(format!("{}/{name}", self.name)))
    }

    pub fn submesh_names(&self) -> impl Iterator<Item = &str> {
        self.submeshes.keys().map(String::as_str)
    }

    #[must_use]
    pub fn index_format(&self) -> IndexFormat {
        self.index_format
    }
}

/// Owns every [`MeshGeometry`] and its GPU buffers.
#[derive(Default)]
pub struct GeometryStore {
    geometries: SlotMap<GeometryKey, MeshGeometry>,
    by_name: FxHashMap<String, GeometryKey>,
}

impl GeometryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Packs `meshes` into one vertex and one index buffer and uploads them.
    ///
    /// Indices are stored as 16-bit when every mesh fits, since each submesh
    /// is drawn with its own base vertex.
    pub fn upload(&mut self, device: &mut impl GpuDevice, name: &str, meshes: &[MeshData]) -> Result<GeometryKey> {
        let wide = meshes.iter().any(|m| m.vertices.len() > usize::from(u16::MAX) + 1);
        let index_format = if wide { IndexFormat::Uint32 } else { IndexFormat::Uint16 };

        let mut vertices: Vec<Vertex> = Vec::with_capacity(meshes.iter().map(|m| m.vertices.len()).sum());
        let mut indices: Vec<u32> = Vec::with_capacity(meshes.iter().map(|m| m.indices.len()).sum());
        let mut submeshes = FxHashMap::default();

        for mesh in meshes {
            let args = DrawArgs {
                index_count: mesh.indices.len() as u32,
                start_index: indices.len() as u32,
                base_vertex: vertices.len() as i32,
                bounds: mesh.bounds(),
            };
            if submeshes.insert(mesh.name.clone(), args).is_some() {
                log::warn!("Geometry '{name}': duplicate submesh '{}' replaced", mesh.name);
            }
            vertices.extend_from_slice(&mesh.vertices);
            indices.extend_from_slice(&mesh.indices);
        }

        let index_bytes: Vec<u8> = match index_format {
            IndexFormat::Uint16 => {
                let narrow: Vec<u16> = indices.iter().map(|&i| i as u16).collect();
                bytemuck::cast_slice(&narrow).to_vec()
            }
            IndexFormat::Uint32 => bytemuck::cast_slice(&indices).to_vec(),
        };
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&vertices);

        let vertex_buffer = device.create_buffer(&BufferDesc {
            label: format!("{name} Vertices"),
            size: vertex_bytes.len() as u64,
            usage: BufferUsage::Vertex,
        })?;
        let index_buffer = match device.create_buffer(&BufferDesc {
            label: format!("{name} Indices"),
            size: index_bytes.len() as u64,
            usage: BufferUsage::Index,
        }) {
            Ok(buffer) => buffer,
            Err(e) => {
                device.destroy_buffer(vertex_buffer);
                return Err(e);
            }
        };
        device.write_buffer(vertex_buffer, 0, vertex_bytes);
        device.write_buffer(index_buffer, 0, &index_bytes);

        log::debug!(
            "Uploaded geometry '{name}': {} submeshes, {} vertices, {} indices",
            submeshes.len(),
            vertices.len(),
            indices.len()
        );

        let key = self.geometries.insert(MeshGeometry {
            name: name.to_string(),
            vertex_buffer,
            index_buffer,
            index_format,
            submeshes,
        });
        if self.by_name.insert(name.to_string(), key).is_some() {
            log::warn!("Geometry '{name}' registered twice; the name now refers to the newer one");
        }
        Ok(key)
    }

    #[must_use]
    pub fn get(&self, key: GeometryKey) -> Option<&MeshGeometry> {
        self.geometries.get(key)
    }

    pub fn find(&self, name: &str) -> Result<GeometryKey> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| RenderError::GeometryNotFound(name.to_string()))
    }

    /// Releases every GPU buffer. The caller must have flushed the queue.
    pub fn destroy_all(&mut self, device: &mut impl GpuDevice) {
        for (_, geo) in self.geometries.drain() {
            device.destroy_buffer(geo.vertex_buffer);
            device.destroy_buffer(geo.index_buffer);
        }
        self.by_name.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }
}
