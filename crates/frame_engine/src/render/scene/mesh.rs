//! Mesh geometry as bound by the pass walker

use crate::render::backend::{IndexBufferView, PrimitiveTopology, VertexBufferView};

/// Index range drawn with one material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubMesh {
    /// Indices in the range
    pub index_count: u32,
    /// First index of the range
    pub index_offset: u32,
}

/// GPU-resident mesh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mesh {
    /// Vertex streams bound from slot 0
    pub vertex_buffer_views: Vec<VertexBufferView>,
    /// Index buffer, if the mesh is indexed
    pub index_buffer_view: Option<IndexBufferView>,
    /// Primitive assembly mode
    pub primitive_topology: PrimitiveTopology,
    /// Vertex layout id, used to pick the matching pipeline state
    pub layout_id: usize,
    /// Submeshes; material `i` of a renderer draws submesh `i`
    pub submeshes: Vec<SubMesh>,
}

impl Mesh {
    /// Triangle-list mesh with a single submesh covering `index_count` indices
    pub fn indexed_triangles(
        vertex_buffer: VertexBufferView,
        index_buffer: IndexBufferView,
        index_count: u32,
        layout_id: usize,
    ) -> Self {
        Self {
            vertex_buffer_views: vec![vertex_buffer],
            index_buffer_view: Some(index_buffer),
            primitive_topology: PrimitiveTopology::TriangleList,
            layout_id,
            submeshes: vec![SubMesh {
                index_count,
                index_offset: 0,
            }],
        }
    }
}
